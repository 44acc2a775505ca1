//! Redirects, page metadata and the sitemap.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use common::PageRequest;
use domain::catalog::Category;
use domain::seo::{
    RedirectStatus, RedirectTrail, ResolvedSeo, SeoInput, SiteContext, SlugRedirect,
    StructuredData, normalize_path,
};
use serde::{Deserialize, Serialize};
use store::{CourseQuery, PostQuery, RedirectRepository, Store};

use crate::auth::Actor;
use crate::error::{ApplicationError, Result};

/// Where a moved page now lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedirectTarget {
    pub location: String,
    pub status: RedirectStatus,
}

/// Result of a public lookup by slug.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    Redirect(RedirectTarget),
}

impl<T> Lookup<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::Redirect(target) => Lookup::Redirect(target),
        }
    }
}

/// Follows stored redirects from `path`. Returns `None` when nothing
/// redirects away from it.
pub(crate) async fn follow_redirects<R>(store: &R, path: &str) -> Result<Option<RedirectTarget>>
where
    R: RedirectRepository + ?Sized,
{
    let mut trail = RedirectTrail::new(normalize_path(path)?);
    while let Some(redirect) = store.find_redirect(trail.current()).await? {
        trail.follow(&redirect)?;
    }
    if trail.hops() == 0 {
        return Ok(None);
    }

    metrics::counter!("slug_redirects_resolved_total").increment(1);
    Ok(Some(RedirectTarget {
        location: trail.current().to_string(),
        status: trail.status(),
    }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRedirect {
    pub from_path: String,
    pub to_path: String,
    /// 301 or 302. Defaults to 301.
    #[serde(default)]
    pub status_code: Option<u16>,
}

/// One `<url>` of the sitemap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: DateTime<Utc>,
}

const SITEMAP_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct SeoService<S> {
    store: S,
    site: SiteContext,
}

impl<S: Store> SeoService<S> {
    pub fn new(store: S, site: SiteContext) -> Self {
        Self { store, site }
    }

    pub fn site(&self) -> &SiteContext {
        &self.site
    }

    #[tracing::instrument(skip(self, admin), fields(admin_id = %admin.user_id))]
    pub async fn add_redirect(&self, admin: &Actor, command: NewRedirect) -> Result<SlugRedirect> {
        admin.require_admin()?;
        let status = RedirectStatus::from_code(command.status_code.unwrap_or(301))?;
        let redirect =
            SlugRedirect::new(&command.from_path, &command.to_path, status, Utc::now())?;
        self.store.save_redirect(&redirect).await?;
        tracing::info!(from = %redirect.from_path, to = %redirect.to_path, "redirect saved");
        Ok(redirect)
    }

    pub async fn list_redirects(&self, admin: &Actor) -> Result<Vec<SlugRedirect>> {
        admin.require_admin()?;
        Ok(self.store.list_redirects().await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn resolve_redirect(&self, path: &str) -> Result<Option<RedirectTarget>> {
        follow_redirects(&self.store, path).await
    }

    /// Metadata for a course, category or blog post page.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_seo(&self, path: &str) -> Result<ResolvedSeo> {
        let path = normalize_path(path)?;
        let not_found = || ApplicationError::not_found("page", &path);

        if let Some(slug) = path.strip_prefix("/courses/") {
            let course = self
                .store
                .find_course_by_slug(slug)
                .await?
                .filter(|c| c.is_visible())
                .ok_or_else(not_found)?;
            let instructor = self.store.find_user(course.instructor_id).await?;
            let input = SeoInput {
                title: &course.title,
                summary: &course.summary,
                path: course.path(),
                seo: &course.seo,
                structured: StructuredData::Course {
                    price: course.price,
                    instructor_name: instructor.map(|u| u.display_name),
                },
            };
            return Ok(ResolvedSeo::resolve(&input, &self.site));
        }

        if let Some(slug) = path.strip_prefix("/categories/") {
            let category = self
                .store
                .find_category_by_slug(slug)
                .await?
                .ok_or_else(not_found)?;
            let all = self.store.list_categories().await?;
            let input = SeoInput {
                title: &category.name,
                summary: &category.description,
                path: category.path(),
                seo: &category.seo,
                structured: StructuredData::Breadcrumbs(breadcrumbs(&category, &all)),
            };
            return Ok(ResolvedSeo::resolve(&input, &self.site));
        }

        if let Some(slug) = path.strip_prefix("/blog/posts/") {
            let post = self
                .store
                .find_post_by_slug(slug)
                .await?
                .filter(|p| p.is_visible())
                .ok_or_else(not_found)?;
            let author = self.store.find_user(post.author_id).await?;
            let input = SeoInput {
                title: &post.title,
                summary: post.summary(),
                path: post.path(),
                seo: &post.seo,
                structured: StructuredData::BlogPosting {
                    author_name: author.map(|u| u.display_name),
                    published_at: post.published_at,
                    modified_at: post.updated_at,
                    keywords: post.tags.iter().map(|t| t.name.clone()).collect(),
                },
            };
            return Ok(ResolvedSeo::resolve(&input, &self.site));
        }

        Err(not_found())
    }

    /// Published courses, live categories and published posts.
    #[tracing::instrument(skip(self))]
    pub async fn sitemap(&self) -> Result<Vec<SitemapEntry>> {
        let mut entries = Vec::new();

        for category in self.store.list_categories().await? {
            entries.push(self.entry(&category.path(), category.updated_at));
        }

        let mut page = 1;
        loop {
            let courses = self
                .store
                .list_courses(&CourseQuery::new(), PageRequest::new(page, SITEMAP_PAGE_SIZE))
                .await?;
            let last = u64::from(page) >= courses.total_pages();
            entries.extend(
                courses
                    .items
                    .iter()
                    .map(|c| self.entry(&c.path(), c.updated_at)),
            );
            if last {
                break;
            }
            page += 1;
        }

        let mut page = 1;
        loop {
            let posts = self
                .store
                .list_posts(&PostQuery::new(), PageRequest::new(page, SITEMAP_PAGE_SIZE))
                .await?;
            let last = u64::from(page) >= posts.total_pages();
            entries.extend(posts.items.iter().map(|p| self.entry(&p.path(), p.updated_at)));
            if last {
                break;
            }
            page += 1;
        }

        Ok(entries)
    }

    fn entry(&self, path: &str, lastmod: DateTime<Utc>) -> SitemapEntry {
        SitemapEntry {
            loc: self.site.absolute_url(path),
            lastmod,
        }
    }
}

/// `(name, path)` pairs from the root category down to `category`.
fn breadcrumbs(category: &Category, all: &[Category]) -> Vec<(String, String)> {
    let mut chain = vec![(category.name.clone(), category.path())];
    let mut parent = category.parent_id;
    while let Some(id) = parent {
        let Some(ancestor) = all.iter().find(|c| c.id == id) else {
            break;
        };
        if chain.len() > all.len() {
            break;
        }
        chain.push((ancestor.name.clone(), ancestor.path()));
        parent = ancestor.parent_id;
    }
    chain.reverse();
    chain
}

/// Renders entries as a sitemaps.org `urlset` document.
pub fn render_sitemap(entries: &[SitemapEntry]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for entry in entries {
        let _ = writeln!(
            xml,
            "  <url><loc>{}</loc><lastmod>{}</lastmod></url>",
            escape_xml(&entry.loc),
            entry.lastmod.format("%Y-%m-%d")
        );
    }
    xml.push_str("</urlset>\n");
    xml
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use common::UserId;
    use domain::catalog::CategoryDetails;
    use store::{CatalogRepository, InMemoryStore};

    use super::*;

    fn admin() -> Actor {
        Actor::new(UserId::new(), [domain::identity::Role::Admin])
    }

    fn service() -> SeoService<InMemoryStore> {
        SeoService::new(
            InMemoryStore::new(),
            SiteContext::new("Academy", "https://academy.test", "USD"),
        )
    }

    fn redirect(from: &str, to: &str) -> NewRedirect {
        NewRedirect {
            from_path: from.to_string(),
            to_path: to.to_string(),
            status_code: None,
        }
    }

    #[tokio::test]
    async fn resolve_follows_collapsed_chains() {
        let service = service();
        let admin = admin();
        service.add_redirect(&admin, redirect("/a", "/b")).await.unwrap();
        service.add_redirect(&admin, redirect("/b", "/c")).await.unwrap();

        let target = service.resolve_redirect("/a/").await.unwrap().unwrap();
        assert_eq!(target.location, "/c");
        assert_eq!(target.status, RedirectStatus::Permanent);
        assert!(service.resolve_redirect("/c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn temporary_status_is_kept() {
        let service = service();
        let mut temporary = redirect("/sale", "/courses/rust");
        temporary.status_code = Some(302);
        service.add_redirect(&admin(), temporary).await.unwrap();

        let target = service.resolve_redirect("/sale").await.unwrap().unwrap();
        assert_eq!(target.status, RedirectStatus::Temporary);
    }

    #[tokio::test]
    async fn self_redirect_and_bad_status_are_rejected() {
        let service = service();
        assert!(service.add_redirect(&admin(), redirect("/a", "/a/")).await.is_err());

        let mut bad = redirect("/a", "/b");
        bad.status_code = Some(307);
        assert!(service.add_redirect(&admin(), bad).await.is_err());
    }

    #[tokio::test]
    async fn only_admins_add_redirects() {
        let service = service();
        let student = Actor::new(UserId::new(), [domain::identity::Role::Student]);
        let err = service
            .add_redirect(&student, redirect("/a", "/b"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn category_seo_has_breadcrumbs_and_fallback_title() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let root = Category::create(
            CategoryDetails {
                name: "Programming".to_string(),
                ..CategoryDetails::default()
            },
            now,
        )
        .unwrap();
        let child = Category::create(
            CategoryDetails {
                parent_id: Some(root.id),
                name: "Rust".to_string(),
                description: "Systems programming with Rust".to_string(),
                ..CategoryDetails::default()
            },
            now,
        )
        .unwrap();
        store.insert_category(&root).await.unwrap();
        store.insert_category(&child).await.unwrap();
        let service = SeoService::new(
            store,
            SiteContext::new("Academy", "https://academy.test", "USD"),
        );

        let seo = service.resolve_seo("/categories/rust").await.unwrap();
        assert_eq!(seo.title, "Rust | Academy");
        assert_eq!(seo.canonical_url, "https://academy.test/categories/rust");
        assert_eq!(seo.json_ld["@type"], "BreadcrumbList");
        assert_eq!(seo.json_ld["itemListElement"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_page_is_not_found() {
        let err = service().resolve_seo("/about").await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
    }

    #[test]
    fn sitemap_escapes_and_formats_dates() {
        let entries = vec![SitemapEntry {
            loc: "https://academy.test/courses/a&b".to_string(),
            lastmod: Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap(),
        }];
        let xml = render_sitemap(&entries);

        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<loc>https://academy.test/courses/a&amp;b</loc>"));
        assert!(xml.contains("<lastmod>2024-03-09</lastmod>"));
    }
}

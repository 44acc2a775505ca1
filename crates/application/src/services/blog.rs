//! Blog posts and their taxonomy.

use chrono::Utc;
use common::{PageRequest, Page, PostId};
use domain::blog::{
    BlogCategory, BlogCategoryDetails, Post, PostDetails, Tag, normalize_tag_names,
};
use domain::seo::RedirectStatus;
use serde::Serialize;
use store::{PostQuery, Store, StoreError, constraints};

use super::seo::{Lookup, RedirectTarget, follow_redirects};
use crate::auth::Actor;
use crate::error::{ApplicationError, Result};

/// A post as shown to readers.
#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub reading_time_minutes: u32,
}

impl From<Post> for PostView {
    fn from(post: Post) -> Self {
        Self {
            reading_time_minutes: post.reading_time_minutes(),
            post,
        }
    }
}

/// Filters for the public post listing. Slugs that match nothing give an
/// empty page.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub category: Option<String>,
    pub tag: Option<String>,
    pub search: Option<String>,
}

#[derive(Clone)]
pub struct BlogService<S> {
    store: S,
}

impl<S: Store> BlogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, admin, details), fields(admin_id = %admin.user_id))]
    pub async fn create_blog_category(
        &self,
        admin: &Actor,
        details: BlogCategoryDetails,
    ) -> Result<BlogCategory> {
        admin.require_admin()?;
        let category = BlogCategory::create(details, Utc::now())?;
        self.store
            .insert_blog_category(&category)
            .await
            .map_err(|e| slug_conflict(e, constraints::BLOG_CATEGORIES_SLUG_ACTIVE, "blog category"))?;
        tracing::info!(category_id = %category.id, slug = %category.slug, "blog category created");
        Ok(category)
    }

    pub async fn list_blog_categories(&self) -> Result<Vec<BlogCategory>> {
        Ok(self.store.list_blog_categories().await?)
    }

    pub async fn list_tags(&self) -> Result<Vec<Tag>> {
        Ok(self.store.list_tags().await?)
    }

    #[tracing::instrument(skip(self, admin, details), fields(admin_id = %admin.user_id))]
    pub async fn create_post(&self, admin: &Actor, details: PostDetails) -> Result<Post> {
        admin.require_admin()?;
        let tags = self.prepare(&details).await?;
        let post = Post::create(admin.user_id, details, tags, Utc::now())?;
        self.store
            .insert_post(&post)
            .await
            .map_err(|e| slug_conflict(e, constraints::POSTS_SLUG_ACTIVE, "post"))?;
        tracing::info!(post_id = %post.id, slug = %post.slug, "post created");
        Ok(post)
    }

    /// Updates a post. A slug change keeps the old slug resolvable.
    #[tracing::instrument(skip(self, admin, details), fields(admin_id = %admin.user_id))]
    pub async fn update_post(&self, admin: &Actor, id: PostId, details: PostDetails) -> Result<Post> {
        admin.require_admin()?;
        let mut post = self.load(id).await?;
        let tags = self.prepare(&details).await?;
        let history = post.update(details, tags, Utc::now())?;
        self.store
            .update_post(&post, history.as_ref())
            .await
            .map_err(|e| slug_conflict(e, constraints::POSTS_SLUG_ACTIVE, "post"))?;
        if let Some(history) = history {
            tracing::info!(post_id = %id, from = %history.old_slug, to = %post.slug, "post slug changed");
        }
        Ok(post)
    }

    #[tracing::instrument(skip(self, admin), fields(admin_id = %admin.user_id))]
    pub async fn publish_post(&self, admin: &Actor, id: PostId) -> Result<Post> {
        self.change(admin, id, |post, now| post.publish(now)).await
    }

    #[tracing::instrument(skip(self, admin), fields(admin_id = %admin.user_id))]
    pub async fn unpublish_post(&self, admin: &Actor, id: PostId) -> Result<Post> {
        self.change(admin, id, |post, now| post.unpublish(now)).await
    }

    #[tracing::instrument(skip(self, admin), fields(admin_id = %admin.user_id))]
    pub async fn delete_post(&self, admin: &Actor, id: PostId) -> Result<()> {
        self.change(admin, id, |post, now| post.soft_delete(now))
            .await
            .map(drop)
    }

    /// Any non-deleted post, for editing.
    pub async fn get_post(&self, admin: &Actor, id: PostId) -> Result<Post> {
        admin.require_admin()?;
        self.load(id).await
    }

    /// A published post by slug. Old slugs redirect to the current one.
    pub async fn get_post_by_slug(&self, slug: &str) -> Result<Lookup<PostView>> {
        if let Some(post) = self.store.find_post_by_slug(slug).await?
            && post.is_visible()
        {
            return Ok(Lookup::Found(PostView::from(post)));
        }
        if let Some(post) = self.store.find_post_by_old_slug(slug).await?
            && post.is_visible()
        {
            return Ok(Lookup::Redirect(RedirectTarget {
                location: post.path(),
                status: RedirectStatus::Permanent,
            }));
        }
        match follow_redirects(&self.store, &format!("/blog/posts/{slug}")).await? {
            Some(target) => Ok(Lookup::Redirect(target)),
            None => Err(ApplicationError::not_found("post", slug)),
        }
    }

    #[tracing::instrument(skip(self, page))]
    pub async fn list_posts(&self, filter: PostFilter, page: PageRequest) -> Result<Page<PostView>> {
        let mut query = PostQuery::new();
        if let Some(slug) = &filter.category {
            match self.store.find_blog_category_by_slug(slug).await? {
                Some(category) => query = query.category(category.id),
                None => return Ok(page.paginate(Vec::new())),
            }
        }
        if let Some(slug) = &filter.tag {
            match self.store.find_tag_by_slug(slug).await? {
                Some(tag) => query = query.tag(tag.id),
                None => return Ok(page.paginate(Vec::new())),
            }
        }
        if let Some(text) = filter.search {
            query = query.search(text);
        }
        Ok(self.store.list_posts(&query, page).await?.map(PostView::from))
    }

    /// Checks the category and resolves tag names, creating missing tags.
    async fn prepare(&self, details: &PostDetails) -> Result<Vec<Tag>> {
        if let Some(category_id) = details.category_id {
            let exists = self
                .store
                .list_blog_categories()
                .await?
                .iter()
                .any(|c| c.id == category_id);
            if !exists {
                return Err(ApplicationError::Validation(format!(
                    "blog category {category_id} does not exist"
                )));
            }
        }
        let names = normalize_tag_names(&details.tags)?;
        if names.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.store.find_or_create_tags(&names).await?)
    }

    async fn change<F>(&self, admin: &Actor, id: PostId, apply: F) -> Result<Post>
    where
        F: FnOnce(&mut Post, chrono::DateTime<Utc>) -> std::result::Result<(), domain::blog::BlogError>,
    {
        admin.require_admin()?;
        let mut post = self.load(id).await?;
        apply(&mut post, Utc::now())?;
        self.store.update_post(&post, None).await?;
        tracing::info!(post_id = %id, status = %post.status, deleted = post.is_deleted, "post changed");
        Ok(post)
    }

    async fn load(&self, id: PostId) -> Result<Post> {
        self.store
            .find_post(id)
            .await?
            .filter(|p| !p.is_deleted)
            .ok_or_else(|| ApplicationError::not_found("post", id))
    }
}

fn slug_conflict(error: StoreError, constraint: &str, entity: &str) -> ApplicationError {
    if error.is_unique_violation(constraint) {
        ApplicationError::Conflict(format!("{entity} slug is already in use"))
    } else {
        error.into()
    }
}

use async_trait::async_trait;
use common::{Page, PageRequest, PostId};
use domain::blog::{BlogCategory, Post, PostSlugHistory, Tag};
use domain::slug::Slug;

use super::{InMemoryStore, Tables};
use crate::query::contains_ci;
use crate::{BlogRepository, PostQuery, Result, StoreError, constraints};

impl Tables {
    fn check_post_slug(&self, post: &Post) -> Result<()> {
        let taken = !post.is_deleted
            && self
                .posts
                .values()
                .any(|p| p.id != post.id && !p.is_deleted && p.slug == post.slug);
        if taken {
            return Err(StoreError::unique(constraints::POSTS_SLUG_ACTIVE));
        }
        Ok(())
    }
}

fn matches(post: &Post, query: &PostQuery) -> bool {
    if !post.is_visible() {
        return false;
    }
    if let Some(category) = query.category_id
        && post.category_id != Some(category)
    {
        return false;
    }
    if let Some(tag) = query.tag_id
        && !post.tags.iter().any(|t| t.id == tag)
    {
        return false;
    }
    if let Some(text) = &query.search
        && !contains_ci(&post.title, text)
        && !contains_ci(&post.excerpt, text)
        && !contains_ci(&post.body, text)
    {
        return false;
    }
    true
}

#[async_trait]
impl BlogRepository for InMemoryStore {
    async fn insert_blog_category(&self, category: &BlogCategory) -> Result<()> {
        let mut tables = self.tables.write().await;
        let taken = tables
            .blog_categories
            .values()
            .any(|c| !c.is_deleted && c.slug == category.slug);
        if taken {
            return Err(StoreError::unique(constraints::BLOG_CATEGORIES_SLUG_ACTIVE));
        }
        tables.blog_categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn find_blog_category_by_slug(&self, slug: &str) -> Result<Option<BlogCategory>> {
        let tables = self.tables.read().await;
        Ok(tables
            .blog_categories
            .values()
            .find(|c| !c.is_deleted && c.slug.as_str() == slug)
            .cloned())
    }

    async fn list_blog_categories(&self) -> Result<Vec<BlogCategory>> {
        let tables = self.tables.read().await;
        let mut categories: Vec<_> = tables
            .blog_categories
            .values()
            .filter(|c| !c.is_deleted)
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn find_or_create_tags(&self, tags: &[(Slug, String)]) -> Result<Vec<Tag>> {
        let mut tables = self.tables.write().await;
        let mut found = Vec::with_capacity(tags.len());
        for (slug, name) in tags {
            let existing = tables.tags.values().find(|t| &t.slug == slug).cloned();
            let tag = match existing {
                Some(tag) => tag,
                None => {
                    let tag = Tag {
                        id: common::TagId::new(),
                        name: name.clone(),
                        slug: slug.clone(),
                    };
                    tables.tags.insert(tag.id, tag.clone());
                    tag
                }
            };
            found.push(tag);
        }
        Ok(found)
    }

    async fn find_tag_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tags
            .values()
            .find(|t| t.slug.as_str() == slug)
            .cloned())
    }

    async fn list_tags(&self) -> Result<Vec<Tag>> {
        let tables = self.tables.read().await;
        let mut tags: Vec<_> = tables.tags.values().cloned().collect();
        tags.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(tags)
    }

    async fn insert_post(&self, post: &Post) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check_post_slug(post)?;
        tables.posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn update_post(&self, post: &Post, history: Option<&PostSlugHistory>) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.posts.contains_key(&post.id) {
            return Err(StoreError::not_found("post", post.id));
        }
        tables.check_post_slug(post)?;

        tables.post_slug_history.retain(|h| h.old_slug != post.slug);
        if let Some(history) = history {
            tables
                .post_slug_history
                .retain(|h| h.old_slug != history.old_slug);
            tables.post_slug_history.push(history.clone());
        }
        tables.posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn find_post(&self, id: PostId) -> Result<Option<Post>> {
        Ok(self.tables.read().await.posts.get(&id).cloned())
    }

    async fn find_post_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        let tables = self.tables.read().await;
        Ok(tables
            .posts
            .values()
            .find(|p| !p.is_deleted && p.slug.as_str() == slug)
            .cloned())
    }

    async fn find_post_by_old_slug(&self, slug: &str) -> Result<Option<Post>> {
        let tables = self.tables.read().await;
        let Some(history) = tables
            .post_slug_history
            .iter()
            .find(|h| h.old_slug.as_str() == slug)
        else {
            return Ok(None);
        };
        Ok(tables
            .posts
            .get(&history.post_id)
            .filter(|p| !p.is_deleted)
            .cloned())
    }

    async fn list_posts(&self, query: &PostQuery, page: PageRequest) -> Result<Page<Post>> {
        let tables = self.tables.read().await;
        let mut posts: Vec<_> = tables
            .posts
            .values()
            .filter(|p| matches(p, query))
            .cloned()
            .collect();
        posts.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(page.paginate(posts))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::UserId;
    use domain::blog::PostDetails;

    use super::*;

    fn post(title: &str) -> Post {
        let details = PostDetails {
            title: title.to_string(),
            body: "Some words about Rust".to_string(),
            ..PostDetails::default()
        };
        Post::create(UserId::new(), details, vec![], Utc::now()).unwrap()
    }

    fn retitle(post: &mut Post, title: &str) -> Option<PostSlugHistory> {
        let details = PostDetails {
            title: title.to_string(),
            body: post.body.clone(),
            ..PostDetails::default()
        };
        post.update(details, vec![], Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn slug_is_unique_among_live_posts() {
        let store = InMemoryStore::new();
        let mut first = post("Hello Rust");
        store.insert_post(&first).await.unwrap();

        let err = store.insert_post(&post("Hello Rust")).await.unwrap_err();
        assert!(err.is_unique_violation(constraints::POSTS_SLUG_ACTIVE));

        first.soft_delete(Utc::now()).unwrap();
        store.update_post(&first, None).await.unwrap();
        store.insert_post(&post("Hello Rust")).await.unwrap();
    }

    #[tokio::test]
    async fn old_slug_finds_renamed_post() {
        let store = InMemoryStore::new();
        let mut p = post("Hello Rust");
        store.insert_post(&p).await.unwrap();

        let history = retitle(&mut p, "Goodbye Rust");
        store.update_post(&p, history.as_ref()).await.unwrap();

        let found = store.find_post_by_old_slug("hello-rust").await.unwrap();
        assert_eq!(found.map(|f| f.id), Some(p.id));
    }

    #[tokio::test]
    async fn renaming_back_drops_history() {
        let store = InMemoryStore::new();
        let mut p = post("Hello Rust");
        store.insert_post(&p).await.unwrap();

        let history = retitle(&mut p, "Goodbye Rust");
        store.update_post(&p, history.as_ref()).await.unwrap();
        let history = retitle(&mut p, "Hello Rust");
        store.update_post(&p, history.as_ref()).await.unwrap();

        assert!(store.find_post_by_old_slug("hello-rust").await.unwrap().is_none());
        assert!(store.find_post_by_old_slug("goodbye-rust").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn tags_are_reused_by_slug() {
        let store = InMemoryStore::new();
        let slug = Slug::parse("rust").unwrap();
        let first = store
            .find_or_create_tags(&[(slug.clone(), "Rust".to_string())])
            .await
            .unwrap();
        let second = store
            .find_or_create_tags(&[(slug, "rust".to_string())])
            .await
            .unwrap();

        assert_eq!(first[0].id, second[0].id);
        assert_eq!(store.list_tags().await.unwrap().len(), 1);
    }
}

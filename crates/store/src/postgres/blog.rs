use std::collections::HashMap;

use async_trait::async_trait;
use common::{BlogCategoryId, Page, PageRequest, PostId, TagId, UserId};
use domain::blog::{BlogCategory, Post, PostSlugHistory, Tag};
use domain::slug::Slug;
use sqlx::{Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

use super::{PostgresStore, db_error, id_column, json, limit_offset, opt_id_column, page_of, slug, text};
use crate::query::like_pattern;
use crate::{BlogRepository, PostQuery, Result, StoreError};

const POST_COLUMNS: &str = "id, author_id, category_id, title, slug, excerpt, body, status, seo, \
     is_deleted, published_at, created_at, updated_at";

fn blog_category_from_row(row: &PgRow) -> Result<BlogCategory> {
    Ok(BlogCategory {
        id: BlogCategoryId::from_uuid(id_column(row, "id")?),
        name: row.try_get("name")?,
        slug: slug(row, "slug")?,
        description: row.try_get("description")?,
        is_deleted: row.try_get("is_deleted")?,
        created_at: row.try_get("created_at")?,
    })
}

fn tag_from_row(row: &PgRow) -> Result<Tag> {
    Ok(Tag {
        id: TagId::from_uuid(id_column(row, "id")?),
        name: row.try_get("name")?,
        slug: slug(row, "slug")?,
    })
}

/// Decodes a post without its tags.
fn post_from_row(row: &PgRow) -> Result<Post> {
    Ok(Post {
        id: PostId::from_uuid(id_column(row, "id")?),
        author_id: UserId::from_uuid(id_column(row, "author_id")?),
        category_id: opt_id_column(row, "category_id")?.map(BlogCategoryId::from_uuid),
        title: row.try_get("title")?,
        slug: slug(row, "slug")?,
        excerpt: row.try_get("excerpt")?,
        body: row.try_get("body")?,
        status: text(row, "status")?,
        tags: Vec::new(),
        seo: json(row, "seo")?,
        is_deleted: row.try_get("is_deleted")?,
        published_at: row.try_get("published_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn push_post_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &PostQuery) {
    builder.push(" WHERE NOT is_deleted AND status = 'Published'");
    if let Some(category) = query.category_id {
        builder
            .push(" AND category_id = ")
            .push_bind(category.as_uuid());
    }
    if let Some(tag) = query.tag_id {
        builder
            .push(" AND id IN (SELECT post_id FROM post_tags WHERE tag_id = ")
            .push_bind(tag.as_uuid())
            .push(")");
    }
    if let Some(search) = &query.search {
        let pattern = like_pattern(search);
        builder
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR excerpt ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR body ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

impl PostgresStore {
    /// Decodes post rows and loads their tags in one query.
    async fn posts_with_tags(&self, rows: &[PgRow]) -> Result<Vec<Post>> {
        let mut posts = rows.iter().map(post_from_row).collect::<Result<Vec<_>>>()?;
        if posts.is_empty() {
            return Ok(posts);
        }

        let ids: Vec<Uuid> = posts.iter().map(|p| p.id.as_uuid()).collect();
        let tag_rows = sqlx::query(
            r#"
            SELECT pt.post_id, t.id, t.name, t.slug
            FROM post_tags pt
            JOIN tags t ON t.id = pt.tag_id
            WHERE pt.post_id = ANY($1)
            ORDER BY t.slug
            "#,
        )
        .bind(ids)
        .fetch_all(self.pool())
        .await?;

        let mut tags: HashMap<Uuid, Vec<Tag>> = HashMap::new();
        for row in &tag_rows {
            tags.entry(id_column(row, "post_id")?)
                .or_default()
                .push(tag_from_row(row)?);
        }
        for post in &mut posts {
            post.tags = tags.remove(&post.id.as_uuid()).unwrap_or_default();
        }
        Ok(posts)
    }

    async fn one_post(&self, row: Option<PgRow>) -> Result<Option<Post>> {
        match row {
            Some(row) => Ok(self.posts_with_tags(&[row]).await?.pop()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl BlogRepository for PostgresStore {
    async fn insert_blog_category(&self, category: &BlogCategory) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO blog_categories (id, name, slug, description, is_deleted, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(category.id.as_uuid())
        .bind(&category.name)
        .bind(category.slug.as_str())
        .bind(&category.description)
        .bind(category.is_deleted)
        .bind(category.created_at)
        .execute(self.pool())
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn find_blog_category_by_slug(&self, slug: &str) -> Result<Option<BlogCategory>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, slug, description, is_deleted, created_at
            FROM blog_categories WHERE slug = $1 AND NOT is_deleted
            "#,
        )
        .bind(slug)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(blog_category_from_row).transpose()
    }

    async fn list_blog_categories(&self) -> Result<Vec<BlogCategory>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, slug, description, is_deleted, created_at
            FROM blog_categories WHERE NOT is_deleted ORDER BY name
            "#,
        )
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(blog_category_from_row).collect()
    }

    async fn find_or_create_tags(&self, tags: &[(Slug, String)]) -> Result<Vec<Tag>> {
        let mut tx = self.pool().begin().await?;
        let mut found = Vec::with_capacity(tags.len());
        for (slug, name) in tags {
            sqlx::query(
                r#"
                INSERT INTO tags (id, name, slug) VALUES ($1, $2, $3)
                ON CONFLICT ON CONSTRAINT tags_slug_key DO NOTHING
                "#,
            )
            .bind(TagId::new().as_uuid())
            .bind(name)
            .bind(slug.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

            let row = sqlx::query("SELECT id, name, slug FROM tags WHERE slug = $1")
                .bind(slug.as_str())
                .fetch_one(&mut *tx)
                .await?;
            found.push(tag_from_row(&row)?);
        }
        tx.commit().await?;
        Ok(found)
    }

    async fn find_tag_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        let row = sqlx::query("SELECT id, name, slug FROM tags WHERE slug = $1")
            .bind(slug)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(tag_from_row).transpose()
    }

    async fn list_tags(&self) -> Result<Vec<Tag>> {
        let rows = sqlx::query("SELECT id, name, slug FROM tags ORDER BY slug")
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(tag_from_row).collect()
    }

    async fn insert_post(&self, post: &Post) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(&format!(
            "INSERT INTO posts ({POST_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(post.id.as_uuid())
        .bind(post.author_id.as_uuid())
        .bind(post.category_id.map(|id| id.as_uuid()))
        .bind(&post.title)
        .bind(post.slug.as_str())
        .bind(&post.excerpt)
        .bind(&post.body)
        .bind(post.status.as_str())
        .bind(serde_json::to_value(&post.seo)?)
        .bind(post.is_deleted)
        .bind(post.published_at)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        for tag in &post.tags {
            sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES ($1, $2)")
                .bind(post.id.as_uuid())
                .bind(tag.id.as_uuid())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_post(&self, post: &Post, history: Option<&PostSlugHistory>) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET category_id = $2, title = $3, slug = $4, excerpt = $5, body = $6, status = $7,
                seo = $8, is_deleted = $9, published_at = $10, updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(post.id.as_uuid())
        .bind(post.category_id.map(|id| id.as_uuid()))
        .bind(&post.title)
        .bind(post.slug.as_str())
        .bind(&post.excerpt)
        .bind(&post.body)
        .bind(post.status.as_str())
        .bind(serde_json::to_value(&post.seo)?)
        .bind(post.is_deleted)
        .bind(post.published_at)
        .bind(post.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("post", post.id));
        }

        sqlx::query("DELETE FROM post_tags WHERE post_id = $1")
            .bind(post.id.as_uuid())
            .execute(&mut *tx)
            .await?;
        for tag in &post.tags {
            sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES ($1, $2)")
                .bind(post.id.as_uuid())
                .bind(tag.id.as_uuid())
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM post_slug_history WHERE old_slug = $1")
            .bind(post.slug.as_str())
            .execute(&mut *tx)
            .await?;
        if let Some(history) = history {
            sqlx::query(
                r#"
                INSERT INTO post_slug_history (post_id, old_slug, changed_at)
                VALUES ($1, $2, $3)
                ON CONFLICT ON CONSTRAINT post_slug_history_old_slug_key DO UPDATE
                SET post_id = EXCLUDED.post_id, changed_at = EXCLUDED.changed_at
                "#,
            )
            .bind(history.post_id.as_uuid())
            .bind(history.old_slug.as_str())
            .bind(history.changed_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_post(&self, id: PostId) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await?;
        self.one_post(row).await
    }

    async fn find_post_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        let row = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE slug = $1 AND NOT is_deleted"
        ))
        .bind(slug)
        .fetch_optional(self.pool())
        .await?;
        self.one_post(row).await
    }

    async fn find_post_by_old_slug(&self, slug: &str) -> Result<Option<Post>> {
        let row = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts \
             WHERE NOT is_deleted AND id = (SELECT post_id FROM post_slug_history WHERE old_slug = $1)"
        ))
        .bind(slug)
        .fetch_optional(self.pool())
        .await?;
        self.one_post(row).await
    }

    async fn list_posts(&self, query: &PostQuery, page: PageRequest) -> Result<Page<Post>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM posts");
        push_post_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool()).await?;

        let (limit, offset) = limit_offset(page);
        let mut select = QueryBuilder::new(format!("SELECT {POST_COLUMNS} FROM posts"));
        push_post_filters(&mut select, query);
        select
            .push(" ORDER BY published_at DESC NULLS LAST, created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = select.build().fetch_all(self.pool()).await?;
        let posts = self.posts_with_tags(&rows).await?;
        Ok(page_of(page, posts, total))
    }
}

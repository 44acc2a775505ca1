//! Blog posts.

use chrono::{DateTime, Utc};
use common::{BlogCategoryId, PostId, UserId};
use serde::{Deserialize, Serialize};

use super::{BlogError, Tag, validated_text};
use crate::seo::SeoMetadata;
use crate::slug::Slug;

/// Average reading speed used for the reading-time estimate.
pub const WORDS_PER_MINUTE: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "Draft",
            PostStatus::Published => "Published",
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Draft" => Ok(PostStatus::Draft),
            "Published" => Ok(PostStatus::Published),
            other => Err(format!("unknown post status '{other}'")),
        }
    }
}

/// Editable fields of a post.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostDetails {
    #[serde(default)]
    pub category_id: Option<BlogCategoryId>,
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub excerpt: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub seo: SeoMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub category_id: Option<BlogCategoryId>,
    pub title: String,
    pub slug: Slug,
    pub excerpt: String,
    pub body: String,
    pub status: PostStatus,
    pub tags: Vec<Tag>,
    pub seo: SeoMetadata,
    pub is_deleted: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A slug a post used to have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSlugHistory {
    pub post_id: PostId,
    pub old_slug: Slug,
    pub changed_at: DateTime<Utc>,
}

/// Reading time in whole minutes, never less than one.
pub fn reading_time_minutes(body: &str) -> u32 {
    let words = body.split_whitespace().count();
    words.div_ceil(WORDS_PER_MINUTE).max(1) as u32
}

impl Post {
    /// Creates a draft post. `tags` are already resolved from `details.tags`.
    pub fn create(
        author_id: UserId,
        details: PostDetails,
        tags: Vec<Tag>,
        now: DateTime<Utc>,
    ) -> Result<Self, BlogError> {
        let title = validated_text("title", &details.title, 3, 200)?;
        let slug = Slug::explicit_or_derived(details.slug.as_deref(), &title)?;
        let body = validated_body(&details.body)?;

        Ok(Self {
            id: PostId::new(),
            author_id,
            category_id: details.category_id,
            title,
            slug,
            excerpt: validated_text("excerpt", &details.excerpt, 0, 500)?,
            body,
            status: PostStatus::Draft,
            tags,
            seo: details.seo.normalized()?,
            is_deleted: false,
            published_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies new details. Returns a history row when the slug changed.
    pub fn update(
        &mut self,
        details: PostDetails,
        tags: Vec<Tag>,
        now: DateTime<Utc>,
    ) -> Result<Option<PostSlugHistory>, BlogError> {
        self.ensure_not_deleted()?;
        let title = validated_text("title", &details.title, 3, 200)?;
        let slug = Slug::explicit_or_derived(details.slug.as_deref(), &title)?;
        let body = validated_body(&details.body)?;
        let excerpt = validated_text("excerpt", &details.excerpt, 0, 500)?;
        let seo = details.seo.normalized()?;

        let history = (slug != self.slug).then(|| PostSlugHistory {
            post_id: self.id,
            old_slug: self.slug.clone(),
            changed_at: now,
        });

        self.category_id = details.category_id;
        self.title = title;
        self.slug = slug;
        self.excerpt = excerpt;
        self.body = body;
        self.tags = tags;
        self.seo = seo;
        self.updated_at = now;

        Ok(history)
    }

    pub fn publish(&mut self, now: DateTime<Utc>) -> Result<(), BlogError> {
        self.ensure_not_deleted()?;
        if self.status != PostStatus::Draft {
            return Err(BlogError::InvalidStatusTransition {
                current: self.status,
                action: "publish",
            });
        }
        self.status = PostStatus::Published;
        self.published_at.get_or_insert(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn unpublish(&mut self, now: DateTime<Utc>) -> Result<(), BlogError> {
        self.ensure_not_deleted()?;
        if self.status != PostStatus::Published {
            return Err(BlogError::InvalidStatusTransition {
                current: self.status,
                action: "unpublish",
            });
        }
        self.status = PostStatus::Draft;
        self.updated_at = now;
        Ok(())
    }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) -> Result<(), BlogError> {
        self.ensure_not_deleted()?;
        self.is_deleted = true;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_visible(&self) -> bool {
        self.status == PostStatus::Published && !self.is_deleted
    }

    pub fn reading_time_minutes(&self) -> u32 {
        reading_time_minutes(&self.body)
    }

    /// The excerpt, or the body when no excerpt was written.
    pub fn summary(&self) -> &str {
        if self.excerpt.is_empty() {
            &self.body
        } else {
            &self.excerpt
        }
    }

    pub fn path(&self) -> String {
        format!("/blog/posts/{}", self.slug)
    }

    fn ensure_not_deleted(&self) -> Result<(), BlogError> {
        if self.is_deleted {
            Err(BlogError::PostDeleted(self.id))
        } else {
            Ok(())
        }
    }
}

fn validated_body(body: &str) -> Result<String, BlogError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(BlogError::EmptyBody);
    }
    Ok(body.to_string())
}

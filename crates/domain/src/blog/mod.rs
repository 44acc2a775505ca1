//! Blog posts, categories, tags and slug history.

mod post;
mod taxonomy;

pub use post::{Post, PostDetails, PostSlugHistory, PostStatus, WORDS_PER_MINUTE, reading_time_minutes};
pub use taxonomy::{BlogCategory, BlogCategoryDetails, Tag, normalize_tag_names};

use common::PostId;
use thiserror::Error;

use crate::seo::SeoError;

/// Errors that can occur during blog operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlogError {
    #[error("{field} must be between {min} and {max} characters")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
    },

    #[error("Post body cannot be empty")]
    EmptyBody,

    #[error("Invalid state transition: cannot {action} a post in {current} state")]
    InvalidStatusTransition {
        current: PostStatus,
        action: &'static str,
    },

    #[error("Post {0} is deleted")]
    PostDeleted(PostId),

    #[error("Invalid tag name: '{0}'")]
    InvalidTagName(String),

    #[error(transparent)]
    Seo(#[from] SeoError),
}

fn validated_text(field: &'static str, value: &str, min: usize, max: usize) -> Result<String, BlogError> {
    let value = value.trim();
    let len = value.chars().count();
    if len < min || len > max {
        return Err(BlogError::InvalidLength { field, min, max });
    }
    Ok(value.to_string())
}

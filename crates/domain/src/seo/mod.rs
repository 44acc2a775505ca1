//! SEO metadata and slug redirects.

mod metadata;
mod redirect;

pub use metadata::{
    MAX_META_DESCRIPTION_LEN, MAX_META_TITLE_LEN, ResolvedSeo, SeoInput, SeoMetadata,
    SiteContext, StructuredData, truncate_at_word,
};
pub use redirect::{MAX_REDIRECT_HOPS, RedirectStatus, RedirectTrail, SlugRedirect, normalize_path};

use thiserror::Error;

/// Errors raised by SEO value objects and redirect handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeoError {
    #[error("Invalid slug: '{0}'")]
    InvalidSlug(String),

    #[error("Meta title is {len} characters (max 70)")]
    MetaTitleTooLong { len: usize },

    #[error("Meta description is {len} characters (max 320)")]
    MetaDescriptionTooLong { len: usize },

    #[error("Invalid URL: '{0}' (must be absolute http or https)")]
    InvalidUrl(String),

    #[error("Invalid path: '{0}'")]
    InvalidPath(String),

    #[error("A redirect cannot point to itself: '{0}'")]
    SelfRedirect(String),

    #[error("Redirect loop detected at '{0}'")]
    RedirectLoop(String),

    #[error("Redirect chain starting at '{0}' exceeds the hop limit")]
    TooManyHops(String),

    #[error("Unsupported redirect status code: {0}")]
    InvalidRedirectStatus(u16),
}

//! Path redirects left behind when slugs change.

use chrono::{DateTime, Utc};
use common::RedirectId;
use serde::{Deserialize, Serialize};

use super::SeoError;

/// Maximum number of hops followed when resolving a redirect chain.
pub const MAX_REDIRECT_HOPS: usize = 5;

const MAX_PATH_LEN: usize = 2048;

/// HTTP status used when serving a redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RedirectStatus {
    /// 301 Moved Permanently.
    #[default]
    Permanent,
    /// 302 Found.
    Temporary,
}

impl RedirectStatus {
    pub fn code(&self) -> u16 {
        match self {
            RedirectStatus::Permanent => 301,
            RedirectStatus::Temporary => 302,
        }
    }

    pub fn from_code(code: u16) -> Result<Self, SeoError> {
        match code {
            301 => Ok(RedirectStatus::Permanent),
            302 => Ok(RedirectStatus::Temporary),
            other => Err(SeoError::InvalidRedirectStatus(other)),
        }
    }

    /// Combines two statuses along a chain: any temporary hop makes the
    /// whole chain temporary.
    pub fn combine(self, other: RedirectStatus) -> RedirectStatus {
        if self == RedirectStatus::Temporary || other == RedirectStatus::Temporary {
            RedirectStatus::Temporary
        } else {
            RedirectStatus::Permanent
        }
    }
}

/// A redirect from an old site-relative path to its replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlugRedirect {
    pub id: RedirectId,
    pub from_path: String,
    pub to_path: String,
    pub status: RedirectStatus,
    pub created_at: DateTime<Utc>,
}

impl SlugRedirect {
    /// Creates a redirect after normalizing both paths.
    pub fn new(
        from_path: &str,
        to_path: &str,
        status: RedirectStatus,
        now: DateTime<Utc>,
    ) -> Result<Self, SeoError> {
        let from_path = normalize_path(from_path)?;
        let to_path = normalize_path(to_path)?;
        if from_path == to_path {
            return Err(SeoError::SelfRedirect(from_path));
        }

        Ok(Self {
            id: RedirectId::new(),
            from_path,
            to_path,
            status,
            created_at: now,
        })
    }

    /// Convenience for the common case of a renamed entity under `prefix`.
    pub fn for_slug_change(
        prefix: &str,
        old_slug: &str,
        new_slug: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, SeoError> {
        Self::new(
            &format!("{prefix}/{old_slug}"),
            &format!("{prefix}/{new_slug}"),
            RedirectStatus::Permanent,
            now,
        )
    }
}

/// Normalizes a site-relative path: leading `/`, no trailing `/` (except the
/// root), no query string, fragment, whitespace or scheme.
pub fn normalize_path(path: &str) -> Result<String, SeoError> {
    let trimmed = path.trim();
    let invalid = || SeoError::InvalidPath(path.to_string());

    if trimmed.is_empty()
        || trimmed.len() > MAX_PATH_LEN
        || !trimmed.starts_with('/')
        || trimmed.starts_with("//")
        || trimmed.contains("://")
        || trimmed.contains(['?', '#'])
        || trimmed.contains(char::is_whitespace)
    {
        return Err(invalid());
    }

    let without_trailing = trimmed.trim_end_matches('/');
    if without_trailing.is_empty() {
        return Ok("/".to_string());
    }
    if without_trailing.contains("//") {
        return Err(invalid());
    }

    Ok(without_trailing.to_string())
}

/// Tracks the paths visited while following a redirect chain.
#[derive(Debug, Clone)]
pub struct RedirectTrail {
    start: String,
    visited: Vec<String>,
    status: RedirectStatus,
}

impl RedirectTrail {
    pub fn new(start: impl Into<String>) -> Self {
        let start = start.into();
        Self {
            visited: vec![start.clone()],
            start,
            status: RedirectStatus::Permanent,
        }
    }

    /// Records one hop. Fails on a loop or when the hop limit is exceeded.
    pub fn follow(&mut self, redirect: &SlugRedirect) -> Result<(), SeoError> {
        if self.visited.iter().any(|p| p == &redirect.to_path) {
            return Err(SeoError::RedirectLoop(redirect.to_path.clone()));
        }
        if self.hops() >= MAX_REDIRECT_HOPS {
            return Err(SeoError::TooManyHops(self.start.clone()));
        }
        self.status = self.status.combine(redirect.status);
        self.visited.push(redirect.to_path.clone());
        Ok(())
    }

    pub fn hops(&self) -> usize {
        self.visited.len() - 1
    }

    /// The path reached so far.
    pub fn current(&self) -> &str {
        self.visited.last().map(String::as_str).unwrap_or(&self.start)
    }

    pub fn status(&self) -> RedirectStatus {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redirect(from: &str, to: &str) -> SlugRedirect {
        SlugRedirect::new(from, to, RedirectStatus::Permanent, Utc::now()).unwrap()
    }

    #[test]
    fn normalize_strips_trailing_slash() {
        assert_eq!(normalize_path("/courses/rust/").unwrap(), "/courses/rust");
        assert_eq!(normalize_path("/").unwrap(), "/");
        assert_eq!(normalize_path(" /blog ").unwrap(), "/blog");
    }

    #[test]
    fn normalize_rejects_bad_paths() {
        for bad in [
            "",
            "courses/rust",
            "//evil.test/x",
            "https://evil.test",
            "/a b",
            "/a?x=1",
            "/a//b",
        ] {
            assert!(normalize_path(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn self_redirect_is_rejected() {
        let result = SlugRedirect::new("/a/", "/a", RedirectStatus::Permanent, Utc::now());
        assert_eq!(result, Err(SeoError::SelfRedirect("/a".to_string())));
    }

    #[test]
    fn slug_change_builds_prefixed_paths() {
        let r = SlugRedirect::for_slug_change("/courses", "old", "new", Utc::now()).unwrap();
        assert_eq!(r.from_path, "/courses/old");
        assert_eq!(r.to_path, "/courses/new");
        assert_eq!(r.status.code(), 301);
    }

    #[test]
    fn status_codes_round_trip() {
        assert_eq!(RedirectStatus::from_code(302).unwrap(), RedirectStatus::Temporary);
        assert!(RedirectStatus::from_code(307).is_err());
    }

    #[test]
    fn trail_follows_chain() {
        let mut trail = RedirectTrail::new("/a");
        trail.follow(&redirect("/a", "/b")).unwrap();
        trail.follow(&redirect("/b", "/c")).unwrap();
        assert_eq!(trail.current(), "/c");
        assert_eq!(trail.hops(), 2);
        assert_eq!(trail.status(), RedirectStatus::Permanent);
    }

    #[test]
    fn trail_detects_loop() {
        let mut trail = RedirectTrail::new("/a");
        trail.follow(&redirect("/a", "/b")).unwrap();
        let err = trail.follow(&redirect("/b", "/a")).unwrap_err();
        assert_eq!(err, SeoError::RedirectLoop("/a".to_string()));
    }

    #[test]
    fn trail_enforces_hop_limit() {
        let mut trail = RedirectTrail::new("/p0");
        for i in 0..MAX_REDIRECT_HOPS {
            trail
                .follow(&redirect(&format!("/p{i}"), &format!("/p{}", i + 1)))
                .unwrap();
        }
        let err = trail.follow(&redirect("/p5", "/p6")).unwrap_err();
        assert_eq!(err, SeoError::TooManyHops("/p0".to_string()));
    }

    #[test]
    fn temporary_hop_makes_chain_temporary() {
        let mut trail = RedirectTrail::new("/a");
        trail
            .follow(&SlugRedirect::new("/a", "/b", RedirectStatus::Temporary, Utc::now()).unwrap())
            .unwrap();
        trail.follow(&redirect("/b", "/c")).unwrap();
        assert_eq!(trail.status(), RedirectStatus::Temporary);
    }
}

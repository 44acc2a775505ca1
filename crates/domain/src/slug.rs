//! URL slugs.

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;

use crate::seo::SeoError;

/// Longest slug accepted.
pub const MAX_SLUG_LEN: usize = 200;

/// A validated, URL-safe slug.
///
/// Slugs are lower-case alphanumerics (any script, with their combining
/// marks) separated by single hyphens, with no leading or trailing hyphen.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    /// Validates an explicit slug.
    pub fn parse(value: impl AsRef<str>) -> Result<Self, SeoError> {
        let value = value.as_ref().trim();
        let invalid = || SeoError::InvalidSlug(value.to_string());

        if value.is_empty() || value.chars().count() > MAX_SLUG_LEN {
            return Err(invalid());
        }
        if value.starts_with('-') || value.ends_with('-') || value.contains("--") {
            return Err(invalid());
        }
        let valid_chars = value.chars().all(|c| {
            c == '-' || is_combining_mark(c) || (c.is_alphanumeric() && !c.is_uppercase())
        });
        if !valid_chars || value.chars().next().is_some_and(is_combining_mark) {
            return Err(invalid());
        }

        Ok(Self(value.to_string()))
    }

    /// Derives a slug from free text such as a title.
    pub fn from_title(title: &str) -> Result<Self, SeoError> {
        Self::parse(slugify(title))
    }

    /// Uses the explicit slug when given, otherwise derives one from `title`.
    pub fn explicit_or_derived(explicit: Option<&str>, title: &str) -> Result<Self, SeoError> {
        match explicit.map(str::trim).filter(|s| !s.is_empty()) {
            Some(slug) => Self::parse(slug),
            None => Self::from_title(title),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Slug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Slug {
    type Error = SeoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self {
        slug.0
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Zero-width joiners shape letters inside a word (Persian half-spaces).
const ZERO_WIDTH_JOINERS: [char; 2] = ['\u{200C}', '\u{200D}'];

/// Lower-cases `text` and replaces every run of non-alphanumeric characters
/// with a single hyphen. Combining marks stay attached to their letter and
/// zero-width joiners are dropped without splitting the word.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.chars() {
        if ZERO_WIDTH_JOINERS.contains(&c) {
            continue;
        }
        if is_combining_mark(c) {
            if !pending_hyphen && !slug.is_empty() {
                slug.push(c);
            }
            continue;
        }
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    if slug.chars().count() > MAX_SLUG_LEN {
        slug = slug.chars().take(MAX_SLUG_LEN).collect();
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Rust for   Beginners! "), "rust-for-beginners");
        assert_eq!(slugify("C++ & Systems -- Part 2"), "c-systems-part-2");
    }

    #[test]
    fn slugify_keeps_non_latin_letters() {
        assert_eq!(slugify("Über Café"), "über-café");
        assert_eq!(slugify("آموزش راست"), "آموزش-راست");
    }

    #[test]
    fn slugify_keeps_combining_marks_in_words() {
        // Arabic with harakat, Hindi with a virama, decomposed Latin.
        assert_eq!(slugify("دَرْس أول"), "دَرْس-أول");
        assert_eq!(slugify("हिन्दी पाठ"), "हिन्दी-पाठ");
        assert_eq!(slugify("Cafe\u{301} Noir"), "cafe\u{301}-noir");
        assert!(Slug::from_title("हिन्दी पाठ").is_ok());
    }

    #[test]
    fn slugify_drops_zero_width_non_joiner() {
        assert_eq!(slugify("می\u{200C}خواهم یاد بگیرم"), "میخواهم-یاد-بگیرم");
    }

    #[test]
    fn parse_rejects_leading_combining_mark() {
        assert!(Slug::parse("\u{301}cafe").is_err());
    }

    #[test]
    fn slugify_truncates_long_text() {
        let title = "word ".repeat(100);
        let slug = slugify(&title);
        assert!(slug.chars().count() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn parse_accepts_valid_slugs() {
        assert!(Slug::parse("intro-to-rust").is_ok());
        assert!(Slug::parse("rust2024").is_ok());
    }

    #[test]
    fn parse_rejects_invalid_slugs() {
        for bad in ["", "-rust", "rust-", "rust--lang", "Rust", "rust lang", "rust/lang"] {
            assert!(Slug::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn explicit_slug_wins_over_title() {
        let slug = Slug::explicit_or_derived(Some("custom"), "Some Title").unwrap();
        assert_eq!(slug.as_str(), "custom");

        let slug = Slug::explicit_or_derived(Some("  "), "Some Title").unwrap();
        assert_eq!(slug.as_str(), "some-title");
    }

    #[test]
    fn title_without_letters_has_no_slug() {
        assert!(Slug::from_title("!!!").is_err());
    }
}

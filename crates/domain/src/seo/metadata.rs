//! SEO metadata value object and resolution with fallbacks.

use chrono::{DateTime, Utc};
use common::Money;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::SeoError;

pub const MAX_META_TITLE_LEN: usize = 70;
pub const MAX_META_DESCRIPTION_LEN: usize = 320;

/// Length generated descriptions are cut to when no explicit one is set.
const GENERATED_DESCRIPTION_LEN: usize = 160;

/// Editor-supplied SEO overrides embedded in categories, courses and posts.
///
/// Every field is optional; [`ResolvedSeo`] fills the gaps from the entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeoMetadata {
    #[serde(default)]
    pub meta_title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub canonical_url: Option<String>,
    #[serde(default = "default_true")]
    pub robots_index: bool,
    #[serde(default = "default_true")]
    pub robots_follow: bool,
    #[serde(default)]
    pub og_image_url: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for SeoMetadata {
    fn default() -> Self {
        Self {
            meta_title: None,
            meta_description: None,
            canonical_url: None,
            robots_index: true,
            robots_follow: true,
            og_image_url: None,
        }
    }
}

impl SeoMetadata {
    /// Trims every text field, drops empty ones and checks length and URL rules.
    pub fn normalized(self) -> Result<Self, SeoError> {
        let meta_title = non_empty(self.meta_title);
        let meta_description = non_empty(self.meta_description);
        let canonical_url = non_empty(self.canonical_url);
        let og_image_url = non_empty(self.og_image_url);

        if let Some(title) = &meta_title {
            let len = title.chars().count();
            if len > MAX_META_TITLE_LEN {
                return Err(SeoError::MetaTitleTooLong { len });
            }
        }
        if let Some(description) = &meta_description {
            let len = description.chars().count();
            if len > MAX_META_DESCRIPTION_LEN {
                return Err(SeoError::MetaDescriptionTooLong { len });
            }
        }
        for url in [&canonical_url, &og_image_url].into_iter().flatten() {
            if !is_absolute_http_url(url) {
                return Err(SeoError::InvalidUrl(url.clone()));
            }
        }

        Ok(Self {
            meta_title,
            meta_description,
            canonical_url,
            robots_index: self.robots_index,
            robots_follow: self.robots_follow,
            og_image_url,
        })
    }

    /// Returns the `robots` meta content, e.g. `index,follow`.
    pub fn robots(&self) -> String {
        let index = if self.robots_index { "index" } else { "noindex" };
        let follow = if self.robots_follow { "follow" } else { "nofollow" };
        format!("{index},{follow}")
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_absolute_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty() && !host.starts_with('/') && !host.contains(char::is_whitespace))
}

/// Site-wide settings used when generating metadata.
#[derive(Debug, Clone)]
pub struct SiteContext {
    pub name: String,
    pub base_url: String,
    pub currency: String,
}

impl SiteContext {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            currency: currency.into(),
        }
    }

    /// Joins a site-relative path onto the base URL.
    pub fn absolute_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

/// Type-specific data for the JSON-LD block.
#[derive(Debug, Clone)]
pub enum StructuredData {
    Course {
        price: Money,
        instructor_name: Option<String>,
    },
    BlogPosting {
        author_name: Option<String>,
        published_at: Option<DateTime<Utc>>,
        modified_at: DateTime<Utc>,
        keywords: Vec<String>,
    },
    /// Ancestor chain as `(name, path)` pairs, root first, the page itself last.
    Breadcrumbs(Vec<(String, String)>),
}

/// Everything needed to resolve metadata for one page.
#[derive(Debug, Clone)]
pub struct SeoInput<'a> {
    pub title: &'a str,
    pub summary: &'a str,
    pub path: String,
    pub seo: &'a SeoMetadata,
    pub structured: StructuredData,
}

/// Final metadata rendered into a page head.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedSeo {
    pub title: String,
    pub description: String,
    pub canonical_url: String,
    pub robots: String,
    pub og_image_url: Option<String>,
    pub json_ld: Value,
}

impl ResolvedSeo {
    /// Resolves metadata, falling back to the entity's own fields where the
    /// editor left overrides empty.
    pub fn resolve(input: &SeoInput<'_>, site: &SiteContext) -> Self {
        let title = input
            .seo
            .meta_title
            .clone()
            .unwrap_or_else(|| generated_title(input.title, &site.name));

        let description = input.seo.meta_description.clone().unwrap_or_else(|| {
            truncate_at_word(input.summary, GENERATED_DESCRIPTION_LEN, true)
        });

        let canonical_url = input
            .seo
            .canonical_url
            .clone()
            .unwrap_or_else(|| site.absolute_url(&input.path));

        let json_ld = structured_data(input, site, &canonical_url, &description);

        Self {
            title,
            description,
            canonical_url,
            robots: input.seo.robots(),
            og_image_url: input.seo.og_image_url.clone(),
            json_ld,
        }
    }
}

fn generated_title(title: &str, site_name: &str) -> String {
    let title = collapse_whitespace(title);
    let suffix = format!(" | {site_name}");
    let suffix_len = suffix.chars().count();

    if title.chars().count() + suffix_len <= MAX_META_TITLE_LEN {
        format!("{title}{suffix}")
    } else if suffix_len + 10 < MAX_META_TITLE_LEN {
        let head = truncate_at_word(&title, MAX_META_TITLE_LEN - suffix_len, false);
        format!("{head}{suffix}")
    } else {
        truncate_at_word(&title, MAX_META_TITLE_LEN, false)
    }
}

fn structured_data(
    input: &SeoInput<'_>,
    site: &SiteContext,
    canonical_url: &str,
    description: &str,
) -> Value {
    match &input.structured {
        StructuredData::Course {
            price,
            instructor_name,
        } => {
            let mut value = json!({
                "@context": "https://schema.org",
                "@type": "Course",
                "name": input.title,
                "description": description,
                "url": canonical_url,
                "provider": { "@type": "Organization", "name": site.name, "sameAs": site.base_url },
                "offers": {
                    "@type": "Offer",
                    "price": price.to_string(),
                    "priceCurrency": site.currency,
                    "category": if price.is_zero() { "Free" } else { "Paid" },
                },
            });
            if let Some(name) = instructor_name {
                value["instructor"] = json!({ "@type": "Person", "name": name });
            }
            value
        }
        StructuredData::BlogPosting {
            author_name,
            published_at,
            modified_at,
            keywords,
        } => {
            let mut value = json!({
                "@context": "https://schema.org",
                "@type": "BlogPosting",
                "headline": truncate_at_word(input.title, 110, false),
                "description": description,
                "mainEntityOfPage": canonical_url,
                "dateModified": modified_at.to_rfc3339(),
                "publisher": { "@type": "Organization", "name": site.name },
            });
            if let Some(published_at) = published_at {
                value["datePublished"] = json!(published_at.to_rfc3339());
            }
            if let Some(name) = author_name {
                value["author"] = json!({ "@type": "Person", "name": name });
            }
            if !keywords.is_empty() {
                value["keywords"] = json!(keywords.join(", "));
            }
            if let Some(image) = &input.seo.og_image_url {
                value["image"] = json!(image);
            }
            value
        }
        StructuredData::Breadcrumbs(trail) => {
            let items: Vec<Value> = trail
                .iter()
                .enumerate()
                .map(|(index, (name, path))| {
                    json!({
                        "@type": "ListItem",
                        "position": index + 1,
                        "name": name,
                        "item": site.absolute_url(path),
                    })
                })
                .collect();
            json!({
                "@context": "https://schema.org",
                "@type": "BreadcrumbList",
                "itemListElement": items,
            })
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapses whitespace and cuts `text` to at most `max_chars` characters,
/// preferring to break at a word boundary. With `ellipsis` a trailing `…`
/// is appended when text was dropped (and counted in the limit).
pub fn truncate_at_word(text: &str, max_chars: usize, ellipsis: bool) -> String {
    let text = collapse_whitespace(text);
    if text.chars().count() <= max_chars {
        return text;
    }

    let budget = if ellipsis {
        max_chars.saturating_sub(1)
    } else {
        max_chars
    };
    let head: String = text.chars().take(budget).collect();
    let ends_on_boundary = text.chars().nth(budget).is_some_and(char::is_whitespace);

    // Only back up to a space when that keeps at least half the budget.
    let cut = match head.rfind(' ') {
        _ if ends_on_boundary => head,
        Some(pos) if head[..pos].chars().count() >= budget / 2 => head[..pos].to_string(),
        _ => head,
    };
    let cut = cut.trim_end_matches([' ', ',', ';', ':', '-']).to_string();

    if ellipsis { format!("{cut}…") } else { cut }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteContext {
        SiteContext::new("Academy", "https://academy.test/", "USD")
    }

    #[test]
    fn normalized_trims_and_drops_empty_fields() {
        let seo = SeoMetadata {
            meta_title: Some("  Learn Rust  ".to_string()),
            meta_description: Some("   ".to_string()),
            ..SeoMetadata::default()
        }
        .normalized()
        .unwrap();

        assert_eq!(seo.meta_title.as_deref(), Some("Learn Rust"));
        assert_eq!(seo.meta_description, None);
    }

    #[test]
    fn normalized_rejects_long_title() {
        let seo = SeoMetadata {
            meta_title: Some("x".repeat(71)),
            ..SeoMetadata::default()
        };
        assert_eq!(
            seo.normalized(),
            Err(SeoError::MetaTitleTooLong { len: 71 })
        );
    }

    #[test]
    fn normalized_rejects_relative_canonical() {
        let seo = SeoMetadata {
            canonical_url: Some("/courses/rust".to_string()),
            ..SeoMetadata::default()
        };
        assert!(matches!(seo.normalized(), Err(SeoError::InvalidUrl(_))));
    }

    #[test]
    fn robots_directive() {
        let mut seo = SeoMetadata::default();
        assert_eq!(seo.robots(), "index,follow");
        seo.robots_index = false;
        assert_eq!(seo.robots(), "noindex,follow");
    }

    #[test]
    fn resolve_falls_back_to_entity_fields() {
        let seo = SeoMetadata::default();
        let input = SeoInput {
            title: "Rust Basics",
            summary: "Learn   the\nbasics of Rust.",
            path: "/courses/rust-basics".to_string(),
            seo: &seo,
            structured: StructuredData::Course {
                price: Money::from_cents(4999),
                instructor_name: Some("Ada".to_string()),
            },
        };

        let resolved = ResolvedSeo::resolve(&input, &site());
        assert_eq!(resolved.title, "Rust Basics | Academy");
        assert_eq!(resolved.description, "Learn the basics of Rust.");
        assert_eq!(
            resolved.canonical_url,
            "https://academy.test/courses/rust-basics"
        );
        assert_eq!(resolved.json_ld["@type"], "Course");
        assert_eq!(resolved.json_ld["offers"]["price"], "49.99");
        assert_eq!(resolved.json_ld["instructor"]["name"], "Ada");
    }

    #[test]
    fn resolve_prefers_explicit_overrides() {
        let seo = SeoMetadata {
            meta_title: Some("Custom".to_string()),
            canonical_url: Some("https://elsewhere.test/x".to_string()),
            ..SeoMetadata::default()
        };
        let input = SeoInput {
            title: "Ignored",
            summary: "",
            path: "/blog/x".to_string(),
            seo: &seo,
            structured: StructuredData::Breadcrumbs(vec![("Blog".to_string(), "/blog".to_string())]),
        };

        let resolved = ResolvedSeo::resolve(&input, &site());
        assert_eq!(resolved.title, "Custom");
        assert_eq!(resolved.canonical_url, "https://elsewhere.test/x");
        assert_eq!(
            resolved.json_ld["itemListElement"][0]["item"],
            "https://academy.test/blog"
        );
    }

    #[test]
    fn long_titles_keep_site_suffix() {
        let title = "A very long course title that goes on and on about many different topics";
        let generated = generated_title(title, "Academy");
        assert!(generated.chars().count() <= MAX_META_TITLE_LEN);
        assert!(generated.ends_with(" | Academy"));
    }

    #[test]
    fn truncate_breaks_at_word_boundary() {
        let text = "one two three four five six";
        assert_eq!(truncate_at_word(text, 12, true), "one two…");
        assert_eq!(truncate_at_word(text, 13, false), "one two three");
        assert_eq!(truncate_at_word("short", 10, true), "short");
    }

    #[test]
    fn truncate_without_spaces_cuts_hard() {
        assert_eq!(truncate_at_word("abcdefghij", 5, true), "abcd…");
    }
}

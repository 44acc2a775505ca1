use common::{BlogCategoryId, CategoryId, TagId, UserId};
use domain::catalog::CourseLevel;

/// Builder for catalog course listings.
///
/// Without `include_unpublished` only published, non-deleted courses match.
/// Results are ordered by `published_at` descending, then title.
#[derive(Debug, Clone, Default)]
pub struct CourseQuery {
    /// Match any of these categories (already expanded to descendants).
    pub category_ids: Option<Vec<CategoryId>>,

    /// Case-insensitive substring match over title and summary.
    pub search: Option<String>,

    pub level: Option<CourseLevel>,

    pub instructor_id: Option<UserId>,

    /// Also return drafts and archived courses. Deleted ones never match.
    pub include_unpublished: bool,
}

impl CourseQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn categories(mut self, ids: Vec<CategoryId>) -> Self {
        self.category_ids = Some(ids);
        self
    }

    /// Filters by search text. Blank text is ignored.
    pub fn search(mut self, text: impl Into<String>) -> Self {
        let text = text.into().trim().to_string();
        self.search = (!text.is_empty()).then_some(text);
        self
    }

    pub fn level(mut self, level: CourseLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn instructor(mut self, instructor_id: UserId) -> Self {
        self.instructor_id = Some(instructor_id);
        self
    }

    pub fn include_unpublished(mut self, include: bool) -> Self {
        self.include_unpublished = include;
        self
    }
}

/// Builder for blog post listings. Only published, non-deleted posts match,
/// newest first.
#[derive(Debug, Clone, Default)]
pub struct PostQuery {
    pub category_id: Option<BlogCategoryId>,
    pub tag_id: Option<TagId>,

    /// Case-insensitive substring match over title, excerpt and body.
    pub search: Option<String>,
}

impl PostQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, id: BlogCategoryId) -> Self {
        self.category_id = Some(id);
        self
    }

    pub fn tag(mut self, id: TagId) -> Self {
        self.tag_id = Some(id);
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        let text = text.into().trim().to_string();
        self.search = (!text.is_empty()).then_some(text);
        self
    }
}

/// Escapes `%`, `_` and `\` for use inside a SQL `LIKE` pattern.
pub(crate) fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Case-insensitive substring test used by the in-memory store.
pub(crate) fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

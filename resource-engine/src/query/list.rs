//! List request parameters
//!
//! [`ListParams`] is the textual form of a list request as it arrives from a
//! caller (query string, CLI flags). [`ListQuery`] is the resolved, typed form
//! the repositories consume.
//!
//! # Example
//!
//! ```rust,ignore
//! use resource_engine::query::{ListParams, ListQuery};
//!
//! let params = ListParams::default()
//!     .with_filter("status eq airing")
//!     .with_sort("airDate:desc")
//!     .with_limit(20);
//!
//! let query: ListQuery<Show> = params.resolve(&registry, &config.engine)?;
//! let page = shows.get_all(query).await?;
//! ```

use serde::{Deserialize, Serialize};

use super::error::QueryError;
use super::filter::Filter;
use super::include::{Include, RelationRegistry};
use super::pagination::Pagination;
use super::sort::Sort;
use crate::config::EngineConfig;
use crate::resource::{Resource, ResourceId};

/// Unparsed list request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    /// Filter expression
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Sort specification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    /// Comma-separated relation names
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,
    /// Page size; the configured default applies when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Id of the row the page starts after
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_id: Option<String>,
    /// Page backwards
    #[serde(default)]
    pub reverse: bool,
}

impl ListParams {
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    #[must_use]
    pub fn with_include(mut self, include: impl Into<String>) -> Self {
        self.include = Some(include.into());
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_after(mut self, after_id: impl Into<String>) -> Self {
        self.after_id = Some(after_id.into());
        self
    }

    #[must_use]
    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Parse every part against the schema and relations of `T`
    ///
    /// The limit is clamped by the engine configuration.
    ///
    /// # Errors
    ///
    /// The first parse error found, in the order filter, sort, include,
    /// cursor. Nothing is partially applied.
    pub fn resolve<T: Resource>(
        &self,
        registry: &RelationRegistry,
        engine: &EngineConfig,
    ) -> Result<ListQuery<T>, QueryError> {
        let filter = Filter::from_query(self.filter.as_deref())?;
        let sort = Sort::parse(self.sort.as_deref())?;
        let include = Include::parse(self.include.as_deref(), registry)?;
        let after_id = match self.after_id.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(text) => Some(T::Id::parse_id(text).ok_or_else(|| QueryError::InvalidValue {
                field: "afterId".to_string(),
                value: text.to_string(),
                expected: format!("an id of {}", T::KIND),
            })?),
        };

        Ok(ListQuery {
            filter,
            sort,
            include,
            pagination: Pagination {
                limit: engine.clamp_limit(self.limit),
                after_id,
                reverse: self.reverse,
            },
        })
    }
}

/// Resolved list request for `T`
pub struct ListQuery<T: Resource> {
    pub filter: Option<Filter<T>>,
    pub sort: Sort<T>,
    pub include: Include<T>,
    pub pagination: Pagination<T::Id>,
}

impl<T: Resource> Default for ListQuery<T> {
    fn default() -> Self {
        Self {
            filter: None,
            sort: Sort::Default,
            include: Include::none(),
            pagination: Pagination::default(),
        }
    }
}

impl<T: Resource> Clone for ListQuery<T> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            sort: self.sort.clone(),
            include: self.include.clone(),
            pagination: self.pagination,
        }
    }
}

impl<T: Resource> std::fmt::Debug for ListQuery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListQuery")
            .field("filter", &self.filter)
            .field("sort", &self.sort)
            .field("include", &self.include)
            .field("pagination", &self.pagination)
            .finish()
    }
}

impl<T: Resource> ListQuery<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter<T>) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_sort(mut self, sort: Sort<T>) -> Self {
        self.sort = sort;
        self
    }

    #[must_use]
    pub fn with_include(mut self, include: Include<T>) -> Self {
        self.include = include;
        self
    }

    #[must_use]
    pub fn with_pagination(mut self, pagination: Pagination<T::Id>) -> Self {
        self.pagination = pagination;
        self
    }

    /// Add a structural constraint the caller-supplied filter can not override
    #[must_use]
    pub fn constrained(mut self, constraint: Filter<T>) -> Self {
        self.filter = Filter::and([Some(constraint), self.filter.take()]);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::tests::{book, Book};

    #[test]
    fn test_resolve_parses_every_part() {
        let registry = RelationRegistry::builder().build();
        let query: ListQuery<Book> = ListParams::default()
            .with_filter("pages ge 3")
            .with_sort("title:desc")
            .with_limit(10_000)
            .with_after("4")
            .with_reverse(true)
            .resolve(&registry, &EngineConfig::default())
            .unwrap();

        assert!(query.filter.is_some());
        assert_eq!(query.sort.to_string(), "title:desc");
        assert!(query.include.is_empty());
        assert_eq!(query.pagination.limit, 500);
        assert_eq!(query.pagination.after_id, Some(4));
        assert!(query.pagination.reverse);
    }

    #[test]
    fn test_resolve_defaults() {
        let registry = RelationRegistry::builder().build();
        let query: ListQuery<Book> = ListParams::default()
            .resolve(&registry, &EngineConfig::default())
            .unwrap();
        assert!(query.filter.is_none());
        assert_eq!(query.sort, Sort::Default);
        assert_eq!(query.pagination, Pagination::new(50));
    }

    #[test]
    fn test_resolve_rejects_bad_parts() {
        let registry = RelationRegistry::builder().build();
        let engine = EngineConfig::default();

        let bad_cursor = ListParams::default()
            .with_after("four")
            .resolve::<Book>(&registry, &engine)
            .unwrap_err();
        assert_eq!(bad_cursor.subject(), Some("afterId"));

        let bad_include = ListParams::default()
            .with_include("author")
            .resolve::<Book>(&registry, &engine)
            .unwrap_err();
        assert!(matches!(bad_include, QueryError::UnknownRelation { .. }));
    }

    #[test]
    fn test_constraint_is_kept_alongside_caller_filter() {
        let title = Book::schema().field("title").unwrap();
        let query = ListQuery::<Book>::new()
            .with_filter(Filter::parse("pages gt 1").unwrap())
            .constrained(Filter::Eq(title, "kept".into()));
        let filter = query.filter.unwrap();

        assert!(filter.matches(&book(1, "kept", Some(2))));
        assert!(!filter.matches(&book(2, "other", Some(2))));
        assert!(!filter.matches(&book(3, "kept", Some(1))));
    }
}

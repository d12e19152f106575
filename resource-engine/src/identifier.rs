//! Addressing a resource by id or by slug
//!
//! Every lookup entry point accepts an [`Identifier`], so callers can use
//! whichever handle they have. Turning an identifier into a predicate is pure
//! data manipulation and never touches storage.
//!
//! # Example
//!
//! ```rust,ignore
//! use resource_engine::identifier::Identifier;
//!
//! let by_slug: Identifier<i64> = "dune".parse()?;
//! let by_id: Identifier<i64> = "42".parse()?;
//!
//! let show = shows.get(&by_slug).await?;
//! let episodes = Filter::<Episode>::and([
//!     Some(by_id.matcher(show_id_field, show_slug_field)),
//!     user_filter,
//! ]);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::query::{Filter, QueryError};
use crate::resource::{Field, Resource, ResourceId, Value};

/// Either the id or the slug of a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier<Id> {
    Id(Id),
    Slug(String),
}

impl<Id: ResourceId> Identifier<Id> {
    /// Address a resource by id
    pub fn by_id(id: Id) -> Self {
        Self::Id(id)
    }

    /// Address a resource by slug
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::EmptySlug`] for an empty or blank slug.
    pub fn by_slug(slug: impl Into<String>) -> Result<Self, QueryError> {
        let slug = slug.into();
        if slug.trim().is_empty() {
            return Err(QueryError::EmptySlug);
        }
        Ok(Self::Slug(slug))
    }

    /// Dispatch on the variant
    pub fn match_with<R>(&self, on_id: impl FnOnce(Id) -> R, on_slug: impl FnOnce(&str) -> R) -> R {
        match self {
            Self::Id(id) => on_id(*id),
            Self::Slug(slug) => on_slug(slug),
        }
    }

    /// Predicate selecting the addressed resource
    pub fn to_filter<T: Resource<Id = Id>>(&self) -> Filter<T> {
        let schema = T::schema();
        self.matcher(schema.id_field(), schema.slug_field())
    }

    /// Predicate on fields that hold the identity indirectly
    ///
    /// Used to select rows by their parent, e.g. episodes by the id or slug
    /// of their show.
    pub fn matcher<T: Resource>(&self, id_field: Field<T>, slug_field: Field<T>) -> Filter<T> {
        match self {
            Self::Id(id) => Filter::Eq(id_field, id.to_value()),
            Self::Slug(slug) => Filter::Eq(slug_field, Value::from(slug.as_str())),
        }
    }

    /// Whether `item` is the addressed resource
    pub fn is_same<T: Resource<Id = Id>>(&self, item: &T) -> bool {
        match self {
            Self::Id(id) => item.id() == *id,
            Self::Slug(slug) => item.slug() == slug,
        }
    }

    /// Whether any of `items` is the addressed resource
    pub fn is_contained_in<T: Resource<Id = Id>>(&self, items: &[T]) -> bool {
        items.iter().any(|item| self.is_same(item))
    }
}

/// Parses an id when the text is one, a slug otherwise
impl<Id: ResourceId> FromStr for Identifier<Id> {
    type Err = QueryError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match Id::parse_id(text) {
            Some(id) => Ok(Self::Id(id)),
            None => Self::by_slug(text),
        }
    }
}

impl<Id: fmt::Display> fmt::Display for Identifier<Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::Slug(slug) => f.write_str(slug),
        }
    }
}

impl<Id> From<Id> for Identifier<Id>
where
    Id: ResourceId,
{
    fn from(id: Id) -> Self {
        Self::Id(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::tests::{book, Book};
    use uuid::Uuid;

    #[test]
    fn test_match_round_trip() {
        for id in [1_i64, 7, 123_456] {
            let found = Identifier::by_id(id).match_with(Some, |_| None);
            assert_eq!(found, Some(id));
        }
        for slug in ["dune", "the-expanse"] {
            let found = Identifier::<i64>::by_slug(slug)
                .unwrap()
                .match_with(|_| None, |s| Some(s.to_string()));
            assert_eq!(found.as_deref(), Some(slug));
        }
    }

    #[test]
    fn test_empty_slug_is_rejected() {
        assert_eq!(Identifier::<i64>::by_slug(""), Err(QueryError::EmptySlug));
        assert_eq!(Identifier::<i64>::by_slug("  "), Err(QueryError::EmptySlug));
    }

    #[test]
    fn test_from_str_prefers_ids() {
        assert_eq!("42".parse::<Identifier<i64>>(), Ok(Identifier::Id(42)));
        assert_eq!(
            "dune".parse::<Identifier<i64>>(),
            Ok(Identifier::Slug("dune".to_string()))
        );

        let id = Uuid::now_v7();
        assert_eq!(id.to_string().parse::<Identifier<Uuid>>(), Ok(Identifier::Id(id)));
        // an integer is only a slug for uuid-keyed resources
        assert_eq!(
            "42".parse::<Identifier<Uuid>>(),
            Ok(Identifier::Slug("42".to_string()))
        );
    }

    #[test]
    fn test_filter_and_equality_agree() {
        let rows = vec![book(1, "a", None), book(2, "b", None)];
        for identifier in [Identifier::Id(2), Identifier::Slug("book-2".to_string())] {
            let filter = identifier.to_filter::<Book>();
            let matched: Vec<i64> = rows.iter().filter(|b| filter.matches(b)).map(|b| b.id).collect();
            assert_eq!(matched, vec![2]);
            assert!(identifier.is_same(&rows[1]));
            assert!(identifier.is_contained_in(&rows));
        }
        assert!(!Identifier::Id(9).is_contained_in(&rows));
    }

    #[test]
    fn test_matcher_uses_indirect_fields() {
        // pages stands in for a parent id, title for a parent slug
        let schema = Book::schema();
        let (pages, title) = (schema.field("pages").unwrap(), schema.field("title").unwrap());

        let by_parent_id = Identifier::Id(10).matcher(pages, title);
        assert!(by_parent_id.matches(&book(1, "x", Some(10))));
        assert!(!by_parent_id.matches(&book(2, "x", Some(11))));

        let by_parent_slug = Identifier::<i64>::Slug("x".to_string()).matcher(pages, title);
        assert!(by_parent_slug.matches(&book(3, "x", None)));
    }

    #[test]
    fn test_display_and_serde() {
        assert_eq!(Identifier::<i64>::Id(3).to_string(), "3");
        assert_eq!(Identifier::<i64>::Slug("dune".to_string()).to_string(), "dune");

        let parsed: Identifier<i64> = serde_json::from_str("\"dune\"").unwrap();
        assert_eq!(parsed, Identifier::Slug("dune".to_string()));
        let parsed: Identifier<i64> = serde_json::from_str("5").unwrap();
        assert_eq!(parsed, Identifier::Id(5));
    }
}

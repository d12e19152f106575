//! Repository trait definitions
//!
//! Traits use RPITIT (Return Position Impl Trait In Traits), so implementations
//! write plain `async fn`s and callers get `Send` futures without boxing.
//!
//! # Overview
//!
//! - [`ReadRepository`]: lookups, listing, counting and search
//! - [`Repository`]: adds the create/edit/delete template operations
//! - [`ResourceHooks`]: per-type customisation points called by the template

use std::future::Future;

use super::error::RepositoryError;
use crate::identifier::Identifier;
use crate::query::{Filter, Include, ListQuery, Page};
use crate::resource::{Resource, ResourceId};

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Read side of a repository
pub trait ReadRepository<T: Resource>: Send + Sync {
    /// Look up a resource, `None` when it does not exist
    ///
    /// The slug `"random"` selects one random row. Only storage failures are
    /// reported as errors.
    fn get_or_default(
        &self,
        id: &Identifier<T::Id>,
    ) -> impl Future<Output = RepositoryResult<Option<T>>> + Send;

    /// Look up a resource
    ///
    /// Fails with `not_found` when it does not exist.
    fn get(&self, id: &Identifier<T::Id>) -> impl Future<Output = RepositoryResult<T>> + Send {
        async move {
            self.get_or_default(id)
                .await?
                .ok_or_else(|| RepositoryError::not_found(T::KIND, id.to_string()))
        }
    }

    /// Look up a resource and load the requested relations
    fn get_with(
        &self,
        id: &Identifier<T::Id>,
        include: &Include<T>,
    ) -> impl Future<Output = RepositoryResult<T>> + Send {
        async move {
            let mut item = self.get(id).await?;
            include.apply(std::slice::from_mut(&mut item)).await?;
            Ok(item)
        }
    }

    /// One page of resources, with the query's relations loaded
    fn get_all(&self, query: ListQuery<T>) -> impl Future<Output = RepositoryResult<Page<T>>> + Send;

    /// Number of resources matching a filter
    fn get_count(
        &self,
        filter: Option<Filter<T>>,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Case-insensitive search over the type's searchable fields
    ///
    /// Ordered by the default sort and capped by the configured search limit.
    fn search(&self, query: &str) -> impl Future<Output = RepositoryResult<Vec<T>>> + Send;

    /// The resources with the given ids, in the order of `ids`
    ///
    /// Missing ids are skipped.
    fn from_ids(&self, ids: &[T::Id]) -> impl Future<Output = RepositoryResult<Vec<T>>> + Send;
}

/// Full repository: reads plus the mutation template
///
/// # Example
///
/// ```rust,ignore
/// use resource_engine::repository::Repository;
///
/// let show = shows.create(Show::new("dune", "Dune")).await?;
/// let same = shows.create_if_not_exists(Show::new("dune", "Dune")).await?;
/// assert_eq!(show.id, same.id);
///
/// shows.patch(show.id, |s| s.rating = Some(8.1)).await?;
/// shows.delete(&Identifier::Slug("dune".into())).await?;
/// ```
pub trait Repository<T: Resource>: ReadRepository<T> {
    /// Validate and insert a resource
    ///
    /// A slug conflict fails with `duplicate_resource`, carrying the row that
    /// already holds the slug.
    fn create(&self, item: T) -> impl Future<Output = RepositoryResult<T>> + Send;

    /// Like [`create`](Self::create), but returns the existing row when the
    /// slug is taken, including when a concurrent caller won the race
    fn create_if_not_exists(&self, item: T) -> impl Future<Output = RepositoryResult<T>> + Send;

    /// Replace a resource
    ///
    /// Scalars are taken from `changes`. Relations follow the reset policy:
    /// with `reset_old` every relation is replaced by the value in `changes`
    /// (absent means cleared), without it only relations set in `changes`
    /// are replaced.
    fn edit(
        &self,
        id: T::Id,
        changes: T,
        reset_old: bool,
    ) -> impl Future<Output = RepositoryResult<T>> + Send;

    /// Load a resource, apply `patch` to it and persist the result
    fn patch<F>(&self, id: T::Id, patch: F) -> impl Future<Output = RepositoryResult<T>> + Send
    where
        F: FnOnce(&mut T) + Send;

    /// Delete a resource and the children it owns
    fn delete(&self, id: &Identifier<T::Id>) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Delete every resource matching `filter`, returning how many were removed
    fn delete_all(&self, filter: Filter<T>) -> impl Future<Output = RepositoryResult<u64>> + Send;
}

/// Customisation points of the repository template
///
/// Every method has a default, so a type without special rules uses
/// [`DefaultHooks`]. Errors raised by hooks abort the operation before any
/// write (for `validate` and `edit_relations`) and are propagated unchanged.
pub trait ResourceHooks<T: Resource>: Send + Sync {
    /// Check, and possibly complete, a resource before it is written
    fn validate(&self, item: &mut T) -> impl Future<Output = RepositoryResult<()>> + Send {
        async move { validate_slug(item) }
    }

    /// Merge the relations of `current` into `changes` before an edit
    fn edit_relations(
        &self,
        current: &T,
        changes: &mut T,
        reset_old: bool,
    ) -> impl Future<Output = RepositoryResult<()>> + Send {
        async move {
            apply_relation_policy(current, changes, reset_old);
            Ok(())
        }
    }

    /// Called after a resource was removed from its store
    fn on_delete(&self, _item: &T) -> impl Future<Output = RepositoryResult<()>> + Send {
        async { Ok(()) }
    }

    /// Called after an edit or patch was persisted
    fn on_edited(&self, _old: &T, _new: &T) -> impl Future<Output = RepositoryResult<()>> + Send {
        async { Ok(()) }
    }
}

/// Hooks with the default behavior only
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl<T: Resource> ResourceHooks<T> for DefaultHooks {}

/// Slug rules shared by every resource type
///
/// A slug must be non-empty, must not be `random` (reserved for random
/// lookups) and must not parse as an id (it would be unreachable by slug).
pub fn validate_slug<T: Resource>(item: &T) -> RepositoryResult<()> {
    let slug = item.slug();
    if slug.trim().is_empty() {
        return Err(RepositoryError::validation_failed("Resource can not have an empty slug")
            .with_entity(T::KIND, item.id().to_string()));
    }
    if slug == "random" {
        return Err(RepositoryError::validation_failed(
            "Resources can not have 'random' as a slug",
        )
        .with_entity(T::KIND, slug));
    }
    if T::Id::parse_id(slug).is_some() {
        return Err(RepositoryError::validation_failed(
            "Resource slugs can not be valid ids",
        )
        .with_entity(T::KIND, slug));
    }
    Ok(())
}

/// The relation-reset policy of `edit`
///
/// Without `reset_old`, every relation slot left unset in `changes` keeps the
/// value from `current`. With it, `changes` is taken as is.
pub fn apply_relation_policy<T: Resource>(current: &T, changes: &mut T, reset_old: bool) {
    if reset_old {
        return;
    }
    for slot in T::schema().relations() {
        if !(slot.is_set)(changes) {
            (slot.carry)(current, changes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::tests::{book, Book};
    use crate::repository::RepositoryErrorKind;

    #[test]
    fn test_validate_slug_rules() {
        assert!(validate_slug(&book(1, "a", None)).is_ok());

        let mut item = book(1, "a", None);
        for slug in ["", "random", "42"] {
            item.slug = slug.to_string();
            let error = validate_slug(&item).unwrap_err();
            assert_eq!(error.kind, RepositoryErrorKind::ValidationFailed, "slug {slug:?}");
        }
    }

    #[tokio::test]
    async fn test_default_hooks_accept_valid_resources() {
        let mut item = book(1, "a", None);
        ResourceHooks::<Book>::validate(&DefaultHooks, &mut item)
            .await
            .unwrap();
        ResourceHooks::<Book>::on_delete(&DefaultHooks, &item)
            .await
            .unwrap();
    }
}

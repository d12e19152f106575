//! Repositories: the typed CRUD surface over backing stores
//!
//! # Features
//!
//! - **Template**: [`CrudRepository`] runs validation, relation merging and
//!   conflict translation around a [`Store`](crate::store::Store)
//! - **Hooks**: [`ResourceHooks`] customises those steps per resource type
//! - **Union**: [`UnionRepository`] is a read-only view over projections of
//!   several stores
//! - **Errors**: [`RepositoryError`] classifies every failure by operation
//!   and kind
//!
//! # Example
//!
//! ```rust,ignore
//! use resource_engine::repository::{CrudRepository, DefaultHooks, ReadRepository, Repository};
//! use resource_engine::store::MemoryStore;
//!
//! let studios = CrudRepository::new(MemoryStore::<Studio>::new(), DefaultHooks);
//! let created = studios.create(Studio::new("ghibli", "Studio Ghibli")).await?;
//! let found = studios.get(&"ghibli".parse()?).await?;
//! assert_eq!(created.id, found.id);
//! ```

mod crud;
mod error;
mod traits;
mod union;

// Re-export all public types
pub use crud::{CrudRepository, RANDOM_SLUG};
pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation, ResourceRef};
pub use traits::{
    apply_relation_policy, validate_slug, DefaultHooks, ReadRepository, Repository,
    RepositoryResult, ResourceHooks,
};
pub use union::{StoreSource, UnionRepository, UnionSource};

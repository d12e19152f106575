//! # resource-engine
//!
//! Generic query and repository engine for resource-shaped data: entities with
//! a stable id and a unique slug.
//!
//! ## Features
//!
//! - **Identifiers**: address a resource by id or slug with one type
//! - **Filters**: a typed predicate tree with a textual mini-language checked
//!   against per-type field schemas
//! - **Sorting**: multi-key and seeded random orders, always ending with an id
//!   tie-break
//! - **Keyset pagination**: forward and reverse pages resuming after a row id,
//!   never by offset
//! - **Includes**: batched eager loading of single-valued relations
//! - **Repositories**: a CRUD template with validation and relation hooks, plus
//!   read-only unions of several stores
//! - **Stores**: an in-memory store and a SQL compiler for relational adapters
//!
//! ## Example
//!
//! ```rust,no_run
//! use resource_engine::catalog::{Catalog, CatalogSeed, Show};
//! use resource_engine::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Load configuration
//!     let config = Config::load()?;
//!
//!     // Initialize tracing
//!     init_tracing(&config)?;
//!
//!     // Build and fill the catalog
//!     let catalog = Catalog::in_memory(&config);
//!     catalog.load_seed(CatalogSeed::read("catalog.json").await?).await?;
//!
//!     // List airing shows, newest first
//!     let params = ListParams::default()
//!         .with_filter("status eq airing")
//!         .with_sort("airDate:desc")
//!         .with_include("studio");
//!     let page = catalog.shows.get_all(catalog.list_query::<Show>(&params)?).await?;
//!     println!("{}", serde_json::to_string_pretty(&page)?);
//!
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod identifier;
pub mod observability;
pub mod query;
pub mod repository;
pub mod resource;
pub mod store;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, EngineConfig, LoggingConfig};

    pub use crate::error::{Error, ErrorBody, Result};

    pub use crate::identifier::Identifier;

    pub use crate::observability::init_tracing;

    pub use crate::query::{
        CmpOp, Filter, Include, ListParams, ListQuery, Page, Pagination, QueryError,
        RelationDescriptor, RelationRegistry, Sort,
    };

    pub use crate::repository::{
        CrudRepository, DefaultHooks, ReadRepository, Repository, RepositoryError,
        RepositoryErrorKind, RepositoryOperation, RepositoryResult, ResourceHooks,
        UnionRepository,
    };

    pub use crate::resource::{Field, FieldKind, Resource, ResourceId, Schema, Value};

    pub use crate::store::{MemoryStore, Store, StoreError, StoreQuery};
}

//! Backing-store adapters
//!
//! The repository layer never issues raw queries. It hands a [`StoreQuery`]
//! (filter tree, compiled ordering and limit) to a [`Store`], which executes it
//! however its storage requires. Two adapters ship with the crate:
//!
//! - [`MemoryStore`]: a concurrent in-memory table, evaluating filters with
//!   [`Filter::matches`](crate::query::Filter::matches)
//! - [`SqlCompiler`]: compiles store queries to parameterised SQL for
//!   adapters that drive a relational database
//!
//! # Example
//!
//! ```rust,ignore
//! use resource_engine::store::{MemoryStore, Store, StoreQuery};
//!
//! let store = MemoryStore::<Show>::new();
//! let created = store.insert(show).await?;
//! let rows = store.execute(&StoreQuery::all()).await?;
//! ```

use std::future::Future;

use thiserror::Error;

use crate::query::{filter::id_eq, Filter, OrderBy};
use crate::resource::Resource;

mod memory;
pub mod sql;

pub use memory::MemoryStore;
pub use sql::{Dialect, SqlCompiler, SqlQuery};

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors reported by a backing store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("Unique constraint violated on {field} = {value}")]
    Conflict { field: &'static str, value: String },

    /// The row to update or delete does not exist
    #[error("No row with id {0}")]
    NotFound(String),

    /// The store can not evaluate part of the query
    #[error("Unsupported by this store: {0}")]
    Unsupported(String),

    /// Any other storage failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// A query handed to a store
#[derive(Debug)]
pub struct StoreQuery<T: Resource> {
    pub filter: Option<Filter<T>>,
    pub order: Option<OrderBy<T>>,
    pub limit: Option<usize>,
}

impl<T: Resource> Clone for StoreQuery<T> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            order: self.order.clone(),
            limit: self.limit,
        }
    }
}

impl<T: Resource> StoreQuery<T> {
    /// Every row, in storage order
    pub fn all() -> Self {
        Self {
            filter: None,
            order: None,
            limit: None,
        }
    }

    /// Rows matching `filter`
    pub fn filtered(filter: Option<Filter<T>>) -> Self {
        Self {
            filter,
            order: None,
            limit: None,
        }
    }

    /// The row with the given id
    pub fn by_id(id: &T::Id) -> Self {
        Self {
            filter: Some(id_eq::<T>(id)),
            order: None,
            limit: Some(1),
        }
    }

    /// Set the ordering
    #[must_use]
    pub fn ordered(mut self, order: OrderBy<T>) -> Self {
        self.order = Some(order);
        self
    }

    /// Cap the number of rows
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Contract a storage engine satisfies to be driven by the repositories
///
/// Each call is one unit of work; transactions, if any, are owned by the
/// implementation. Uniqueness violations must be reported as
/// [`StoreError::Conflict`] so the repository can translate them.
pub trait Store<T: Resource>: Send + Sync {
    /// Run a query
    fn execute(&self, query: &StoreQuery<T>) -> impl Future<Output = StoreResult<Vec<T>>> + Send;

    /// Count rows matching a filter
    fn count(&self, filter: Option<&Filter<T>>) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Insert a row, allocating its id when unassigned
    fn insert(&self, item: T) -> impl Future<Output = StoreResult<T>> + Send;

    /// Replace an existing row
    fn update(&self, item: T) -> impl Future<Output = StoreResult<T>> + Send;

    /// Remove a row
    fn delete(&self, id: &T::Id) -> impl Future<Output = StoreResult<()>> + Send;
}

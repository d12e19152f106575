//! Query language: filters, sorts, pagination and includes
//!
//! These are immutable value objects, parsed from caller text and validated
//! against the static schema of the resource type before anything touches a
//! store. They are safe to share across tasks.
//!
//! - [`Filter`]: boolean predicate tree (`status eq airing and rating ge 7`)
//! - [`Sort`]: ordering specification (`airDate:desc,name`)
//! - [`Pagination`] and [`Page`]: keyset pagination by last-seen id
//! - [`Include`]: relations to load eagerly, resolved in a [`RelationRegistry`]
//! - [`ListParams`] and [`ListQuery`]: the textual and resolved list request

pub mod error;
pub mod filter;
pub mod include;
pub mod list;
pub mod pagination;
mod parser;
pub mod sort;

pub use error::QueryError;
pub use filter::{id_eq, CmpOp, Filter, Predicate};
pub use include::{
    Cardinality, ForeignKeyLoader, Include, RelationDescriptor, RelationLoader, RelationRegistry,
    RelationRegistryBuilder,
};
pub use list::{ListParams, ListQuery};
pub use pagination::{fetch_page, keyset_after, Page, Pagination, DEFAULT_PAGE_SIZE};
pub use sort::{random_key, OrderBy, Sort, SortKey, SortTarget};

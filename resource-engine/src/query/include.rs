//! Eager loading of named relations
//!
//! Domain modules register their relations once at startup into a
//! [`RelationRegistry`]; the finished registry is immutable and shared by
//! reference. Callers name the relations they want (`"studio,show"`) and
//! [`Include::parse`] resolves the names against the registry for one resource
//! type. Unknown names are an error, never ignored.
//!
//! Only single-valued (foreign-key) relations can be included. Multi-valued
//! relations may be declared so that naming them gives a precise error, but
//! they have no loader.
//!
//! # Example
//!
//! ```rust,ignore
//! use resource_engine::query::{Include, RelationRegistry};
//!
//! let registry = RelationRegistry::builder()
//!     .one::<Show>(studio_descriptor, ForeignKeyLoader::new(studios, |s| s.studio_id, attach_studio))
//!     .build();
//!
//! let include = Include::<Show>::parse(Some("studio"), &registry)?;
//! include.apply(&mut shows).await?;
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::error::QueryError;
use super::filter::Filter;
use crate::repository::{RepositoryError, RepositoryOperation, RepositoryResult};
use crate::resource::{Resource, ResourceId};
use crate::store::{Store, StoreQuery};

/// How many rows a relation attaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// A single row referenced by a foreign key
    One,
    /// A collection of rows
    Many,
}

/// Static description of a relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    /// Name callers use to include the relation
    pub name: &'static str,
    /// Kind of the related resource
    pub target: &'static str,
    /// Field of the owning resource holding the foreign key
    pub foreign_key: &'static str,
    pub cardinality: Cardinality,
}

impl RelationDescriptor {
    /// Single-valued relation through `foreign_key`
    pub fn one(name: &'static str, target: &'static str, foreign_key: &'static str) -> Self {
        Self {
            name,
            target,
            foreign_key,
            cardinality: Cardinality::One,
        }
    }

    /// Multi-valued relation; declared but never loadable
    pub fn many(name: &'static str, target: &'static str, foreign_key: &'static str) -> Self {
        Self {
            name,
            target,
            foreign_key,
            cardinality: Cardinality::Many,
        }
    }
}

/// Loads one relation for a whole page of rows
#[async_trait]
pub trait RelationLoader<T>: Send + Sync {
    /// Attach the related rows to every item
    async fn load(&self, items: &mut [T]) -> RepositoryResult<()>;
}

/// Batch loader for a foreign-key relation
///
/// Collects the distinct foreign keys of the page, fetches the related rows
/// with a single `In` query, and hands each item its match (or `None`).
pub struct ForeignKeyLoader<T, R: Resource, S> {
    store: S,
    key: fn(&T) -> Option<R::Id>,
    attach: fn(&mut T, Option<R>),
}

impl<T, R: Resource, S> ForeignKeyLoader<T, R, S> {
    pub fn new(store: S, key: fn(&T) -> Option<R::Id>, attach: fn(&mut T, Option<R>)) -> Self {
        Self { store, key, attach }
    }
}

#[async_trait]
impl<T, R, S> RelationLoader<T> for ForeignKeyLoader<T, R, S>
where
    T: Resource,
    R: Resource,
    S: Store<R> + 'static,
{
    async fn load(&self, items: &mut [T]) -> RepositoryResult<()> {
        let mut ids: Vec<R::Id> = items.iter().filter_map(|item| (self.key)(item)).collect();
        ids.sort();
        ids.dedup();

        let mut related: HashMap<R::Id, R> = HashMap::new();
        if !ids.is_empty() {
            let filter = Filter::In(
                R::schema().id_field(),
                ids.iter().map(ResourceId::to_value).collect(),
            );
            let rows = self
                .store
                .execute(&StoreQuery::filtered(Some(filter)))
                .await
                .map_err(|e| {
                    RepositoryError::from_store(RepositoryOperation::Include, e)
                        .with_entity(R::KIND, format!("{} ids", ids.len()))
                })?;
            related.extend(rows.into_iter().map(|row| (row.id(), row)));
        }

        for item in items.iter_mut() {
            let found = (self.key)(item).and_then(|id| related.get(&id).cloned());
            (self.attach)(item, found);
        }
        Ok(())
    }
}

struct Relation<T> {
    descriptor: RelationDescriptor,
    loader: Option<Arc<dyn RelationLoader<T>>>,
}

/// Immutable table of relations, keyed by resource type and name
#[derive(Default)]
pub struct RelationRegistry {
    relations: HashMap<(TypeId, String), Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for RelationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.relations.keys().map(|(_, name)| name.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("RelationRegistry")
            .field("relations", &names)
            .finish()
    }
}

impl RelationRegistry {
    /// Start registering relations
    pub fn builder() -> RelationRegistryBuilder {
        RelationRegistryBuilder::default()
    }

    fn lookup<T: Resource>(&self, name: &str) -> Option<Arc<Relation<T>>> {
        self.relations
            .get(&(TypeId::of::<T>(), name.to_lowercase()))
            .and_then(|entry| Arc::clone(entry).downcast::<Relation<T>>().ok())
    }

    /// Descriptor of a relation of `T`, if declared
    pub fn descriptor<T: Resource>(&self, name: &str) -> Option<RelationDescriptor> {
        self.lookup::<T>(name).map(|r| r.descriptor.clone())
    }
}

/// Collects relation registrations before freezing them
#[derive(Default)]
pub struct RelationRegistryBuilder {
    relations: HashMap<(TypeId, String), Arc<dyn Any + Send + Sync>>,
}

impl RelationRegistryBuilder {
    /// Register a loadable single-valued relation of `T`
    #[must_use]
    pub fn one<T: Resource>(
        mut self,
        descriptor: RelationDescriptor,
        loader: impl RelationLoader<T> + 'static,
    ) -> Self {
        let relation = Relation {
            descriptor,
            loader: Some(Arc::new(loader) as Arc<dyn RelationLoader<T>>),
        };
        self.insert::<T>(relation);
        self
    }

    /// Declare a multi-valued relation of `T`
    #[must_use]
    pub fn many<T: Resource>(mut self, descriptor: RelationDescriptor) -> Self {
        self.insert::<T>(Relation {
            descriptor,
            loader: None,
        });
        self
    }

    fn insert<T: Resource>(&mut self, relation: Relation<T>) {
        let key = (TypeId::of::<T>(), relation.descriptor.name.to_lowercase());
        tracing::trace!(kind = T::KIND, relation = %key.1, "Registering relation");
        self.relations.insert(key, Arc::new(relation));
    }

    /// Freeze the registry
    pub fn build(self) -> Arc<RelationRegistry> {
        Arc::new(RelationRegistry {
            relations: self.relations,
        })
    }
}

/// Resolved set of relations to load for `T`
pub struct Include<T> {
    relations: Vec<Arc<Relation<T>>>,
}

impl<T> Clone for Include<T> {
    fn clone(&self) -> Self {
        Self {
            relations: self.relations.clone(),
        }
    }
}

impl<T> Default for Include<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> fmt::Debug for Include<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Include").field(&self.names()).finish()
    }
}

impl<T> Include<T> {
    /// Load nothing
    pub fn none() -> Self {
        Self {
            relations: Vec::new(),
        }
    }

    /// Whether no relation is requested
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Names of the requested relations
    pub fn names(&self) -> Vec<&'static str> {
        self.relations.iter().map(|r| r.descriptor.name).collect()
    }
}

impl<T: Resource> Include<T> {
    /// Resolve comma-separated relation names; blank input includes nothing
    ///
    /// # Errors
    ///
    /// [`QueryError::UnknownRelation`] when a name is not registered for `T`,
    /// [`QueryError::MultiValuedRelation`] when it names a collection.
    pub fn parse(input: Option<&str>, registry: &RelationRegistry) -> Result<Self, QueryError> {
        let names = input
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty());
        Self::from_names(names, registry)
    }

    /// Resolve relation names
    pub fn from_names<I, S>(names: I, registry: &RelationRegistry) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut relations: Vec<Arc<Relation<T>>> = Vec::new();
        for name in names {
            let name = name.as_ref();
            let relation =
                registry
                    .lookup::<T>(name)
                    .ok_or_else(|| QueryError::UnknownRelation {
                        kind: T::KIND,
                        relation: name.to_string(),
                    })?;
            if relation.loader.is_none() {
                return Err(QueryError::MultiValuedRelation {
                    kind: T::KIND,
                    relation: name.to_string(),
                });
            }
            if !relations
                .iter()
                .any(|r| r.descriptor.name == relation.descriptor.name)
            {
                relations.push(relation);
            }
        }
        Ok(Self { relations })
    }

    /// Load every requested relation into `items`
    pub async fn apply(&self, items: &mut [T]) -> RepositoryResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        for relation in &self.relations {
            if let Some(loader) = &relation.loader {
                tracing::debug!(
                    kind = T::KIND,
                    relation = relation.descriptor.name,
                    rows = items.len(),
                    "Loading relation"
                );
                loader.load(items).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::tests::{book, Book};
    use crate::store::MemoryStore;

    fn registry(store: MemoryStore<Book>) -> Arc<RelationRegistry> {
        // "sequel" points at the book whose id is pages, for lack of a second type
        RelationRegistry::builder()
            .one::<Book>(
                RelationDescriptor::one("sequel", "Book", "pages"),
                ForeignKeyLoader::<Book, Book, _>::new(
                    store,
                    |b: &Book| b.pages,
                    |b: &mut Book, sequel: Option<Book>| {
                        b.tags = sequel.map(|s| vec![s.title]).unwrap_or_default();
                    },
                ),
            )
            .many::<Book>(RelationDescriptor::many("editions", "Book", "id"))
            .build()
    }

    #[tokio::test]
    async fn test_parse_resolves_case_insensitively() {
        let registry = registry(MemoryStore::new());
        let include = Include::<Book>::parse(Some(" Sequel , sequel"), &registry).unwrap();
        assert_eq!(include.names(), vec!["sequel"]);
        assert!(Include::<Book>::parse(None, &registry).unwrap().is_empty());
        assert_eq!(
            registry.descriptor::<Book>("SEQUEL").map(|d| d.target),
            Some("Book")
        );
    }

    #[tokio::test]
    async fn test_parse_rejects_unknown_and_multi_valued() {
        let registry = registry(MemoryStore::new());
        assert_eq!(
            Include::<Book>::parse(Some("sequel,author"), &registry).unwrap_err(),
            QueryError::UnknownRelation {
                kind: "Book",
                relation: "author".to_string()
            }
        );
        assert_eq!(
            Include::<Book>::parse(Some("editions"), &registry).unwrap_err(),
            QueryError::MultiValuedRelation {
                kind: "Book",
                relation: "editions".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_apply_batch_loads_related_rows() {
        let store = MemoryStore::new();
        for row in [book(1, "first", Some(2)), book(2, "second", None), book(3, "third", Some(9))] {
            store.insert(row).await.unwrap();
        }
        let registry = registry(store.clone());
        let include = Include::<Book>::parse(Some("sequel"), &registry).unwrap();

        let mut rows = store.execute(&StoreQuery::all()).await.unwrap();
        include.apply(&mut rows).await.unwrap();

        assert_eq!(rows[0].tags, vec!["second".to_string()]);
        assert!(rows[1].tags.is_empty());
        // dangling foreign key attaches nothing
        assert!(rows[2].tags.is_empty());
    }
}

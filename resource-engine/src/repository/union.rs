//! Read-only repository over projections of several stores
//!
//! A [`UnionRepository`] presents rows coming from heterogeneous resource
//! types as one resource type `U`. Each [`UnionSource`] reads its own store and
//! projects the rows it keeps into `U`; the id mapping of every source must
//! keep the projected ids disjoint (for example by giving one source the
//! negative ids).
//!
//! Reads take a snapshot of all projected rows and run the regular filter,
//! sort and keyset primitives over it, so a union pages exactly like a table.
//! Slugs are only unique per source: listings show every row, and a lookup by
//! slug returns the row of the first source declaring it. Every mutation fails
//! with `unsupported_operation`.
//!
//! # Example
//!
//! ```rust,ignore
//! use resource_engine::repository::{StoreSource, UnionRepository};
//!
//! let items = UnionRepository::new(vec![
//!     Arc::new(StoreSource::new("shows", shows, LibraryItem::from_show)) as Arc<dyn UnionSource<_>>,
//!     Arc::new(StoreSource::new("collections", collections, LibraryItem::from_collection)),
//! ]);
//! let page = items.get_all(ListQuery::new()).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};

use super::crud::RANDOM_SLUG;
use super::error::{RepositoryError, RepositoryOperation};
use super::traits::{ReadRepository, Repository, RepositoryResult};
use crate::config::EngineConfig;
use crate::identifier::Identifier;
use crate::query::{fetch_page, Filter, ListQuery, Page, Sort};
use crate::resource::{Resource, ResourceId};
use crate::store::{Store, StoreError, StoreQuery, StoreResult};

/// One member of a union
pub trait UnionSource<U: Resource>: Send + Sync {
    /// Name of the source, for logs
    fn name(&self) -> &'static str;

    /// Every row this source contributes, already projected into `U`
    fn project(&self) -> BoxFuture<'_, RepositoryResult<Vec<U>>>;
}

/// Union source reading a store of `T`
///
/// Rows are kept when they match the optional filter and projected with a
/// plain function.
pub struct StoreSource<T: Resource, U, S> {
    name: &'static str,
    store: S,
    filter: Option<Filter<T>>,
    project: fn(T) -> U,
}

impl<T: Resource, U, S> StoreSource<T, U, S> {
    pub fn new(name: &'static str, store: S, project: fn(T) -> U) -> Self {
        Self {
            name,
            store,
            filter: None,
            project,
        }
    }

    /// Only keep the rows matching `filter`
    #[must_use]
    pub fn with_filter(mut self, filter: Filter<T>) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl<T, U, S> UnionSource<U> for StoreSource<T, U, S>
where
    T: Resource,
    U: Resource,
    S: Store<T>,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn project(&self) -> BoxFuture<'_, RepositoryResult<Vec<U>>> {
        Box::pin(async move {
            let rows = self
                .store
                .execute(&StoreQuery::filtered(self.filter.clone()))
                .await
                .map_err(|e| {
                    RepositoryError::from_store(RepositoryOperation::GetAll, e)
                        .with_entity(U::KIND, self.name)
                })?;
            Ok(rows.into_iter().map(self.project).collect())
        })
    }
}

/// Immutable rows of one read, queried like a store
struct Snapshot<U> {
    rows: Vec<U>,
}

impl<U: Resource> Store<U> for Snapshot<U> {
    async fn execute(&self, query: &StoreQuery<U>) -> StoreResult<Vec<U>> {
        let mut items: Vec<U> = self
            .rows
            .iter()
            .filter(|row| query.filter.as_ref().map_or(true, |f| f.matches(row)))
            .cloned()
            .collect();
        if let Some(order) = &query.order {
            order.sort(&mut items);
        }
        if let Some(limit) = query.limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    async fn count(&self, filter: Option<&Filter<U>>) -> StoreResult<u64> {
        let count = self
            .rows
            .iter()
            .filter(|row| filter.map_or(true, |f| f.matches(row)))
            .count();
        Ok(count as u64)
    }

    async fn insert(&self, _item: U) -> StoreResult<U> {
        Err(StoreError::Unsupported(format!("insert into {}", U::KIND)))
    }

    async fn update(&self, _item: U) -> StoreResult<U> {
        Err(StoreError::Unsupported(format!("update of {}", U::KIND)))
    }

    async fn delete(&self, _id: &U::Id) -> StoreResult<()> {
        Err(StoreError::Unsupported(format!("delete from {}", U::KIND)))
    }
}

/// Read-only repository composing several sources into one resource type
pub struct UnionRepository<U: Resource> {
    sources: Vec<Arc<dyn UnionSource<U>>>,
    search_limit: usize,
}

impl<U: Resource> std::fmt::Debug for UnionRepository<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("UnionRepository")
            .field("kind", &U::KIND)
            .field("sources", &names)
            .finish()
    }
}

impl<U: Resource> UnionRepository<U> {
    pub fn new(sources: Vec<Arc<dyn UnionSource<U>>>) -> Self {
        Self::with_config(sources, &EngineConfig::default())
    }

    pub fn with_config(sources: Vec<Arc<dyn UnionSource<U>>>, config: &EngineConfig) -> Self {
        Self {
            sources,
            search_limit: config.search_limit,
        }
    }

    /// Projected rows of every source, in source order
    async fn snapshot(&self) -> RepositoryResult<Snapshot<U>> {
        let parts = try_join_all(self.sources.iter().map(|source| source.project())).await?;
        let rows: Vec<U> = parts.into_iter().flatten().collect();
        tracing::trace!(kind = U::KIND, rows = rows.len(), "Projected union rows");
        Ok(Snapshot { rows })
    }

    async fn query(
        &self,
        query: StoreQuery<U>,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Vec<U>> {
        self.snapshot()
            .await?
            .execute(&query)
            .await
            .map_err(|e| RepositoryError::from_store(operation, e))
    }

    fn read_only<R>(&self, operation: RepositoryOperation) -> RepositoryResult<R> {
        tracing::debug!(kind = U::KIND, operation = %operation, "Rejected write on a union");
        Err(RepositoryError::unsupported(operation, U::KIND))
    }
}

impl<U: Resource> ReadRepository<U> for UnionRepository<U> {
    #[tracing::instrument(skip_all, fields(kind = U::KIND, id = %id))]
    async fn get_or_default(&self, id: &Identifier<U::Id>) -> RepositoryResult<Option<U>> {
        let query = match id {
            Identifier::Slug(slug) if slug == RANDOM_SLUG => {
                StoreQuery::all().ordered(Sort::random().compile())
            }
            // unordered keeps source order, so the first source wins a shared slug
            _ => StoreQuery::filtered(Some(id.to_filter())),
        };
        let rows = self.query(query.limit(1), RepositoryOperation::Get).await?;
        Ok(rows.into_iter().next())
    }

    #[tracing::instrument(skip_all, fields(kind = U::KIND))]
    async fn get_all(&self, query: ListQuery<U>) -> RepositoryResult<Page<U>> {
        let ListQuery {
            filter,
            sort,
            include,
            pagination,
        } = query;
        let snapshot = self.snapshot().await?;
        let mut page = fetch_page(&snapshot, filter, &sort, &pagination)
            .await
            .map_err(|e| RepositoryError::from_store(RepositoryOperation::GetAll, e))?;
        include.apply(&mut page.items).await?;
        Ok(page)
    }

    #[tracing::instrument(skip_all, fields(kind = U::KIND))]
    async fn get_count(&self, filter: Option<Filter<U>>) -> RepositoryResult<u64> {
        self.snapshot()
            .await?
            .count(filter.as_ref())
            .await
            .map_err(|e| RepositoryError::from_store(RepositoryOperation::Count, e))
    }

    #[tracing::instrument(skip_all, fields(kind = U::KIND, query = %query))]
    async fn search(&self, query: &str) -> RepositoryResult<Vec<U>> {
        let schema = U::schema();
        let mut fields = schema.search_fields();
        if fields.is_empty() {
            fields.push(schema.slug_field());
        }
        let store_query = StoreQuery::filtered(Some(Filter::contains(fields, query)))
            .ordered(Sort::Default.compile())
            .limit(self.search_limit);
        self.query(store_query, RepositoryOperation::Search).await
    }

    async fn from_ids(&self, ids: &[U::Id]) -> RepositoryResult<Vec<U>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let filter = Filter::In(
            U::schema().id_field(),
            ids.iter().map(ResourceId::to_value).collect(),
        );
        let rows = self
            .query(StoreQuery::filtered(Some(filter)), RepositoryOperation::Get)
            .await?;
        let by_id: HashMap<U::Id, U> = rows.into_iter().map(|row| (row.id(), row)).collect();
        Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
    }
}

impl<U: Resource> Repository<U> for UnionRepository<U> {
    async fn create(&self, _item: U) -> RepositoryResult<U> {
        self.read_only(RepositoryOperation::Create)
    }

    async fn create_if_not_exists(&self, _item: U) -> RepositoryResult<U> {
        self.read_only(RepositoryOperation::CreateIfNotExists)
    }

    async fn edit(&self, _id: U::Id, _changes: U, _reset_old: bool) -> RepositoryResult<U> {
        self.read_only(RepositoryOperation::Edit)
    }

    async fn patch<F>(&self, _id: U::Id, _patch: F) -> RepositoryResult<U>
    where
        F: FnOnce(&mut U) + Send,
    {
        self.read_only(RepositoryOperation::Patch)
    }

    async fn delete(&self, _id: &Identifier<U::Id>) -> RepositoryResult<()> {
        self.read_only(RepositoryOperation::Delete)
    }

    async fn delete_all(&self, _filter: Filter<U>) -> RepositoryResult<u64> {
        self.read_only(RepositoryOperation::DeleteAll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::tests::{book, Book};
    use crate::query::Pagination;
    use crate::repository::RepositoryErrorKind;
    use crate::resource::Value;
    use crate::store::MemoryStore;

    fn negated(mut item: Book) -> Book {
        item.id = -item.id;
        item.slug = format!("neg-{}", item.slug);
        item
    }

    async fn union() -> UnionRepository<Book> {
        let left = MemoryStore::new();
        let right = MemoryStore::new();
        for (id, title) in [(1, "Alpha"), (2, "Charlie"), (3, "Echo")] {
            left.insert(book(id, title, Some(id * 10))).await.unwrap();
        }
        for (id, title) in [(1, "Bravo"), (2, "Delta")] {
            right.insert(book(id, title, None)).await.unwrap();
        }

        let pages = Book::schema().field("pages").unwrap();
        let left = StoreSource::new("left", left, |b: Book| b)
            .with_filter(Filter::Ne(pages, Value::Int(30)));
        let right = StoreSource::new("right", right, negated);
        UnionRepository::new(vec![
            Arc::new(left) as Arc<dyn UnionSource<Book>>,
            Arc::new(right),
        ])
    }

    #[tokio::test]
    async fn test_union_pages_across_sources() {
        let items = union().await;
        let query = ListQuery::new().with_pagination(Pagination::new(3));

        let first = items.get_all(query.clone()).await.unwrap();
        assert_eq!(first.ids(), vec![1, -1, 2]);
        assert_eq!(first.next_cursor, Some(2));

        let rest = items
            .get_all(query.with_pagination(Pagination::new(3).after(2)))
            .await
            .unwrap();
        assert_eq!(rest.ids(), vec![-2]);
        assert_eq!(rest.next_cursor, None);
    }

    #[tokio::test]
    async fn test_union_reads() {
        let items = union().await;
        assert_eq!(items.get_count(None).await.unwrap(), 4);

        let by_slug = items.get(&"neg-book-2".parse().unwrap()).await.unwrap();
        assert_eq!(by_slug.title, "Delta");
        assert!(items.get_or_default(&Identifier::Id(3)).await.unwrap().is_none());

        let found = items.search("a").await.unwrap();
        let titles: Vec<&str> = found.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "Bravo", "Charlie", "Delta"]);

        let rows = items.from_ids(&[-2, 1]).await.unwrap();
        assert_eq!(rows.iter().map(|b| b.id).collect::<Vec<_>>(), vec![-2, 1]);
    }

    #[tokio::test]
    async fn test_shared_slug_resolves_to_first_source() {
        let first = MemoryStore::new();
        let second = MemoryStore::new();
        let mut zulu = book(1, "Zulu", None);
        zulu.slug = "shared".to_string();
        first.insert(zulu).await.unwrap();
        let mut alpha = book(1, "Alpha", None);
        alpha.slug = "shared".to_string();
        second.insert(alpha).await.unwrap();

        let negate_id = |mut b: Book| {
            b.id = -b.id;
            b
        };
        let items = UnionRepository::new(vec![
            Arc::new(StoreSource::new("first", first, |b: Book| b)) as Arc<dyn UnionSource<Book>>,
            Arc::new(StoreSource::new("second", second, negate_id)),
        ]);

        let page = items.get_all(ListQuery::new()).await.unwrap();
        assert_eq!(page.ids(), vec![-1, 1]);
        let found = items.get(&"shared".parse().unwrap()).await.unwrap();
        assert_eq!(found.title, "Zulu");
    }

    #[tokio::test]
    async fn test_union_rejects_writes() {
        let items = union().await;
        let error = items.create(book(0, "x", None)).await.unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::UnsupportedOperation);
        assert_eq!(error.operation, RepositoryOperation::Create);

        let error = items.delete(&Identifier::Id(1)).await.unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::UnsupportedOperation);
        let error = items.patch(1, |b| b.pages = None).await.unwrap_err();
        assert_eq!(error.operation, RepositoryOperation::Patch);
        assert_eq!(items.get_count(None).await.unwrap(), 4);
    }
}

//! In-memory store

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::{Store, StoreError, StoreQuery, StoreResult};
use crate::query::Filter;
use crate::resource::{Resource, ResourceId};

/// Concurrent in-memory table keyed by id
///
/// Cloning is cheap and clones share the same rows, so one table can back a
/// repository and the hooks of other repositories at the same time. Slug
/// uniqueness is checked under the write lock, which makes concurrent inserts
/// of the same slug race-free: exactly one wins, the others get
/// [`StoreError::Conflict`]. Ids are never reused, even after the row holding
/// the greatest id was deleted.
#[derive(Debug)]
pub struct MemoryStore<T: Resource> {
    table: Arc<RwLock<Table<T>>>,
}

#[derive(Debug)]
struct Table<T: Resource> {
    rows: BTreeMap<T::Id, T>,
    /// Greatest id ever stored
    high_water: Option<T::Id>,
}

impl<T: Resource> Table<T> {
    fn slug_conflict(&self, item: &T) -> Option<StoreError> {
        self.rows
            .values()
            .find(|row| row.slug() == item.slug() && row.id() != item.id())
            .map(|_| StoreError::Conflict {
                field: "slug",
                value: item.slug().to_string(),
            })
    }

    fn raise_high_water(&mut self, id: T::Id) {
        if self.high_water.map_or(true, |high| id > high) {
            self.high_water = Some(id);
        }
    }
}

impl<T: Resource> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<T: Resource> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Resource> MemoryStore<T> {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            table: Arc::new(RwLock::new(Table {
                rows: BTreeMap::new(),
                high_water: None,
            })),
        }
    }

    /// Number of stored rows
    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    /// Whether the table is empty
    pub async fn is_empty(&self) -> bool {
        self.table.read().await.rows.is_empty()
    }
}

impl<T: Resource> Store<T> for MemoryStore<T> {
    async fn execute(&self, query: &StoreQuery<T>) -> StoreResult<Vec<T>> {
        let table = self.table.read().await;
        let mut items: Vec<T> = table
            .rows
            .values()
            .filter(|row| query.filter.as_ref().map_or(true, |f| f.matches(row)))
            .cloned()
            .collect();
        drop(table);

        if let Some(order) = &query.order {
            order.sort(&mut items);
        }
        if let Some(limit) = query.limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    async fn count(&self, filter: Option<&Filter<T>>) -> StoreResult<u64> {
        let table = self.table.read().await;
        let count = table
            .rows
            .values()
            .filter(|row| filter.map_or(true, |f| f.matches(row)))
            .count();
        Ok(count as u64)
    }

    async fn insert(&self, mut item: T) -> StoreResult<T> {
        let mut table = self.table.write().await;
        if item.id().is_unassigned() {
            let id = T::Id::allocate(table.high_water.as_ref()).ok_or_else(|| {
                StoreError::Backend(format!("{} id space exhausted", T::KIND))
            })?;
            item.set_id(id);
        } else if table.rows.contains_key(&item.id()) {
            return Err(StoreError::Conflict {
                field: "id",
                value: item.id().to_string(),
            });
        }
        if let Some(conflict) = table.slug_conflict(&item) {
            return Err(conflict);
        }
        table.raise_high_water(item.id());
        table.rows.insert(item.id(), item.clone());
        Ok(item)
    }

    async fn update(&self, item: T) -> StoreResult<T> {
        let mut table = self.table.write().await;
        if !table.rows.contains_key(&item.id()) {
            return Err(StoreError::NotFound(item.id().to_string()));
        }
        if let Some(conflict) = table.slug_conflict(&item) {
            return Err(conflict);
        }
        table.rows.insert(item.id(), item.clone());
        Ok(item)
    }

    async fn delete(&self, id: &T::Id) -> StoreResult<()> {
        self.table
            .write()
            .await
            .rows
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::tests::{book, Book};
    use crate::query::Sort;
    use crate::resource::Value;

    #[tokio::test]
    async fn test_insert_allocates_ids() {
        let store = MemoryStore::<Book>::new();
        let first = store.insert(book(0, "a", None)).await.unwrap();
        let second = store.insert(book(0, "b", None)).await;
        assert_eq!(first.id, 1);
        // slugs are derived from the id in the fixture, so both were "book-0"
        assert!(matches!(second, Err(StoreError::Conflict { field: "slug", .. })));

        let mut third = book(0, "c", None);
        third.slug = "c".to_string();
        assert_eq!(store.insert(third).await.unwrap().id, 2);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_id() {
        let store = MemoryStore::<Book>::new();
        store.insert(book(5, "a", None)).await.unwrap();
        let mut again = book(5, "b", None);
        again.slug = "other".to_string();
        assert!(matches!(
            store.insert(again).await,
            Err(StoreError::Conflict { field: "id", .. })
        ));
    }

    #[tokio::test]
    async fn test_execute_filters_orders_and_limits() {
        let store = MemoryStore::<Book>::new();
        for (id, pages) in [(1, 30), (2, 10), (3, 20), (4, 40)] {
            store.insert(book(id, "t", Some(pages))).await.unwrap();
        }

        let pages = Book::schema().field("pages").unwrap();
        let query = StoreQuery::filtered(Some(Filter::Gt(pages, Value::Int(10))))
            .ordered(Sort::by(pages).compile())
            .limit(2);
        let ids: Vec<i64> = store.execute(&query).await.unwrap().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![3, 1]);

        let filter = Filter::Le(pages, Value::Int(20));
        assert_eq!(store.count(Some(&filter)).await.unwrap(), 2);
        assert_eq!(store.count(None).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_negation_agrees_with_compiled_sql() {
        let store = MemoryStore::<Book>::new();
        store.insert(book(1, "short", Some(3))).await.unwrap();
        store.insert(book(2, "long", Some(9))).await.unwrap();
        store.insert(book(3, "unknown", None)).await.unwrap();

        let filter = Filter::<Book>::parse("not (pages gt 5)").unwrap();
        let rows = store.execute(&StoreQuery::filtered(Some(filter.clone()))).await.unwrap();
        assert_eq!(rows.iter().map(|b| b.id).collect::<Vec<_>>(), vec![1]);

        // null pages make the comparison unknown in SQL, so row 3 is excluded there too
        let compiled = crate::store::SqlCompiler::new(crate::store::Dialect::Postgres, "books")
            .count(Some(&filter))
            .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT count(*) FROM \"books\" WHERE not (\"pages\" > $1)"
        );
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = MemoryStore::<Book>::new();
        store.insert(book(1, "a", None)).await.unwrap();
        store.insert(book(2, "b", None)).await.unwrap();

        let mut renamed = book(1, "renamed", None);
        store.update(renamed.clone()).await.unwrap();
        let found = store.execute(&StoreQuery::by_id(&1)).await.unwrap();
        assert_eq!(found[0].title, "renamed");

        renamed.slug = "book-2".to_string();
        assert!(matches!(
            store.update(renamed).await,
            Err(StoreError::Conflict { .. })
        ));
        assert!(matches!(
            store.update(book(9, "x", None)).await,
            Err(StoreError::NotFound(_))
        ));

        store.delete(&1).await.unwrap();
        assert!(matches!(store.delete(&1).await, Err(StoreError::NotFound(_))));
        assert!(!store.is_empty().await);
    }

    #[tokio::test]
    async fn test_deleted_ids_are_not_reused() {
        let store = MemoryStore::<Book>::new();
        for slug in ["a", "b", "c"] {
            let mut item = book(0, slug, None);
            item.slug = slug.to_string();
            store.insert(item).await.unwrap();
        }
        store.delete(&3).await.unwrap();

        let mut next = book(0, "d", None);
        next.slug = "d".to_string();
        assert_eq!(store.insert(next).await.unwrap().id, 4);
        assert!(store.execute(&StoreQuery::by_id(&3)).await.unwrap().is_empty());

        // explicit ids raise the mark too
        store.insert(book(10, "e", None)).await.unwrap();
        store.delete(&10).await.unwrap();
        let mut after = book(0, "f", None);
        after.slug = "f".to_string();
        assert_eq!(store.insert(after).await.unwrap().id, 11);
    }

    #[tokio::test]
    async fn test_exhausted_id_space_is_an_error() {
        let store = MemoryStore::<Book>::new();
        store.insert(book(i64::MAX, "last", None)).await.unwrap();
        assert!(matches!(
            store.insert(book(0, "next", None)).await,
            Err(StoreError::Backend(_))
        ));
    }
}

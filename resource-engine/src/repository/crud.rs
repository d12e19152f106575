//! The repository template over a backing store

use std::collections::HashMap;
use std::marker::PhantomData;

use super::error::{RepositoryError, RepositoryOperation};
use super::traits::{DefaultHooks, ReadRepository, Repository, RepositoryResult, ResourceHooks};
use crate::config::EngineConfig;
use crate::identifier::Identifier;
use crate::query::{fetch_page, Filter, ListQuery, Page, Sort};
use crate::resource::{Resource, ResourceId};
use crate::store::{Store, StoreError, StoreQuery};

/// Slug that selects a random row in lookups
pub const RANDOM_SLUG: &str = "random";

/// Generic repository: CRUD and search for `T` over the store `S`
///
/// The template layers validation, relation merging and conflict translation
/// on top of the store; `H` customises those steps per type. The repository
/// holds no state of its own and is safe to share between tasks.
///
/// # Example
///
/// ```rust,ignore
/// use resource_engine::repository::{CrudRepository, DefaultHooks};
/// use resource_engine::store::MemoryStore;
///
/// let studios = CrudRepository::new(MemoryStore::<Studio>::new(), DefaultHooks);
/// let ghibli = studios.create(Studio::new("ghibli", "Studio Ghibli")).await?;
/// ```
pub struct CrudRepository<T, S, H = DefaultHooks> {
    store: S,
    hooks: H,
    search_limit: usize,
    _resource: PhantomData<fn() -> T>,
}

impl<T, S, H> std::fmt::Debug for CrudRepository<T, S, H>
where
    T: Resource,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrudRepository")
            .field("kind", &T::KIND)
            .field("search_limit", &self.search_limit)
            .finish()
    }
}

impl<T, S, H> CrudRepository<T, S, H>
where
    T: Resource,
    S: Store<T>,
    H: ResourceHooks<T>,
{
    /// Create a repository with the default engine settings
    pub fn new(store: S, hooks: H) -> Self {
        Self::with_config(store, hooks, &EngineConfig::default())
    }

    /// Create a repository using the engine settings of `config`
    pub fn with_config(store: S, hooks: H, config: &EngineConfig) -> Self {
        Self {
            store,
            hooks,
            search_limit: config.search_limit,
            _resource: PhantomData,
        }
    }

    /// The backing store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The customisation hooks
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    async fn find_one(
        &self,
        filter: Filter<T>,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Option<T>> {
        let query = StoreQuery::filtered(Some(filter)).limit(1);
        let rows = self
            .store
            .execute(&query)
            .await
            .map_err(|e| RepositoryError::from_store(operation, e))?;
        Ok(rows.into_iter().next())
    }

    async fn random(&self) -> RepositoryResult<Option<T>> {
        let query = StoreQuery::all().ordered(Sort::random().compile()).limit(1);
        let rows = self
            .store
            .execute(&query)
            .await
            .map_err(|e| RepositoryError::from_store(RepositoryOperation::Get, e))?;
        Ok(rows.into_iter().next())
    }

    async fn find_by_slug(&self, slug: &str) -> RepositoryResult<Option<T>> {
        let filter = Filter::Eq(T::schema().slug_field(), slug.into());
        self.find_one(filter, RepositoryOperation::Get).await
    }

    /// Turn a store failure of a write into a repository error
    ///
    /// Conflicts are reported as duplicates of the row holding the slug.
    async fn write_error(
        &self,
        error: StoreError,
        slug: &str,
        operation: RepositoryOperation,
    ) -> RepositoryError {
        match error {
            StoreError::Conflict { .. } => {
                let duplicate = RepositoryError::duplicate(T::KIND, slug).with_operation(operation);
                match self.find_by_slug(slug).await {
                    Ok(Some(existing)) => duplicate.with_existing(existing.id(), existing.slug()),
                    _ => duplicate,
                }
            }
            StoreError::NotFound(id) => {
                RepositoryError::not_found(T::KIND, id).with_operation(operation)
            }
            other => RepositoryError::from_store(operation, other).with_entity(T::KIND, slug),
        }
    }

    async fn persist_edit(&self, current: T, mut changes: T) -> RepositoryResult<T> {
        changes.set_id(current.id());
        self.hooks.validate(&mut changes).await?;

        let slug = changes.slug().to_string();
        let updated = match self.store.update(changes).await {
            Ok(updated) => updated,
            Err(e) => return Err(self.write_error(e, &slug, RepositoryOperation::Edit).await),
        };
        self.hooks.on_edited(&current, &updated).await?;
        Ok(updated)
    }

    async fn remove(&self, item: T) -> RepositoryResult<()> {
        let id = item.id();
        self.store.delete(&id).await.map_err(|e| match e {
            StoreError::NotFound(_) => {
                RepositoryError::not_found(T::KIND, id.to_string())
                    .with_operation(RepositoryOperation::Delete)
            }
            other => RepositoryError::from_store(RepositoryOperation::Delete, other)
                .with_entity(T::KIND, id.to_string()),
        })?;
        tracing::debug!(kind = T::KIND, id = %id, slug = item.slug(), "Deleted resource");
        self.hooks.on_delete(&item).await
    }
}

impl<T, S, H> ReadRepository<T> for CrudRepository<T, S, H>
where
    T: Resource,
    S: Store<T>,
    H: ResourceHooks<T>,
{
    #[tracing::instrument(skip_all, fields(kind = T::KIND, id = %id))]
    async fn get_or_default(&self, id: &Identifier<T::Id>) -> RepositoryResult<Option<T>> {
        match id {
            Identifier::Slug(slug) if slug == RANDOM_SLUG => self.random().await,
            _ => {
                self.find_one(id.to_filter(), RepositoryOperation::Get)
                    .await
            }
        }
    }

    #[tracing::instrument(skip_all, fields(kind = T::KIND))]
    async fn get_all(&self, query: ListQuery<T>) -> RepositoryResult<Page<T>> {
        let ListQuery {
            filter,
            sort,
            include,
            pagination,
        } = query;
        tracing::debug!(
            filter = ?filter,
            sort = %sort,
            limit = pagination.limit,
            after = ?pagination.after_id,
            reverse = pagination.reverse,
            "Listing resources"
        );

        let mut page = fetch_page(&self.store, filter, &sort, &pagination)
            .await
            .map_err(|e| RepositoryError::from_store(RepositoryOperation::GetAll, e))?;
        include.apply(&mut page.items).await?;
        Ok(page)
    }

    #[tracing::instrument(skip_all, fields(kind = T::KIND))]
    async fn get_count(&self, filter: Option<Filter<T>>) -> RepositoryResult<u64> {
        self.store
            .count(filter.as_ref())
            .await
            .map_err(|e| RepositoryError::from_store(RepositoryOperation::Count, e))
    }

    #[tracing::instrument(skip_all, fields(kind = T::KIND, query = %query))]
    async fn search(&self, query: &str) -> RepositoryResult<Vec<T>> {
        let schema = T::schema();
        let mut fields = schema.search_fields();
        if fields.is_empty() {
            fields.push(schema.slug_field());
        }
        let store_query = StoreQuery::filtered(Some(Filter::contains(fields, query)))
            .ordered(Sort::Default.compile())
            .limit(self.search_limit);
        self.store
            .execute(&store_query)
            .await
            .map_err(|e| RepositoryError::from_store(RepositoryOperation::Search, e))
    }

    async fn from_ids(&self, ids: &[T::Id]) -> RepositoryResult<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let filter = Filter::In(
            T::schema().id_field(),
            ids.iter().map(ResourceId::to_value).collect(),
        );
        let rows = self
            .store
            .execute(&StoreQuery::filtered(Some(filter)))
            .await
            .map_err(|e| RepositoryError::from_store(RepositoryOperation::Get, e))?;
        let by_id: HashMap<T::Id, T> = rows.into_iter().map(|row| (row.id(), row)).collect();
        Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
    }
}

impl<T, S, H> Repository<T> for CrudRepository<T, S, H>
where
    T: Resource,
    S: Store<T>,
    H: ResourceHooks<T>,
{
    #[tracing::instrument(skip_all, fields(kind = T::KIND, slug = %item.slug()))]
    async fn create(&self, mut item: T) -> RepositoryResult<T> {
        self.hooks.validate(&mut item).await?;

        let slug = item.slug().to_string();
        match self.store.insert(item).await {
            Ok(created) => {
                tracing::debug!(id = %created.id(), "Created resource");
                Ok(created)
            }
            Err(e) => Err(self.write_error(e, &slug, RepositoryOperation::Create).await),
        }
    }

    #[tracing::instrument(skip_all, fields(kind = T::KIND, slug = %item.slug()))]
    async fn create_if_not_exists(&self, item: T) -> RepositoryResult<T> {
        let slug = item.slug().to_string();
        if let Some(existing) = self.find_by_slug(&slug).await? {
            return Ok(existing);
        }

        match self.create(item).await {
            Ok(created) => Ok(created),
            Err(e) if e.is_duplicate() => {
                tracing::warn!(slug = %slug, "Lost a create race, returning the existing row");
                self.find_by_slug(&slug).await?.ok_or_else(|| {
                    RepositoryError::not_found(T::KIND, slug.as_str())
                        .with_operation(RepositoryOperation::CreateIfNotExists)
                })
            }
            Err(e) => Err(e),
        }
    }

    #[tracing::instrument(skip_all, fields(kind = T::KIND, id = %id, reset_old = reset_old))]
    async fn edit(&self, id: T::Id, mut changes: T, reset_old: bool) -> RepositoryResult<T> {
        let current = self
            .get(&Identifier::Id(id))
            .await
            .map_err(|e| e.with_operation(RepositoryOperation::Edit))?;

        self.hooks
            .edit_relations(&current, &mut changes, reset_old)
            .await?;
        self.persist_edit(current, changes).await
    }

    #[tracing::instrument(skip_all, fields(kind = T::KIND, id = %id))]
    async fn patch<F>(&self, id: T::Id, patch: F) -> RepositoryResult<T>
    where
        F: FnOnce(&mut T) + Send,
    {
        let current = self
            .get(&Identifier::Id(id))
            .await
            .map_err(|e| e.with_operation(RepositoryOperation::Patch))?;

        let mut changes = current.clone();
        patch(&mut changes);
        self.persist_edit(current, changes)
            .await
            .map_err(|e| e.with_operation(RepositoryOperation::Patch))
    }

    #[tracing::instrument(skip_all, fields(kind = T::KIND, id = %id))]
    async fn delete(&self, id: &Identifier<T::Id>) -> RepositoryResult<()> {
        let item = self
            .get(id)
            .await
            .map_err(|e| e.with_operation(RepositoryOperation::Delete))?;
        self.remove(item).await
    }

    #[tracing::instrument(skip_all, fields(kind = T::KIND, filter = %filter))]
    async fn delete_all(&self, filter: Filter<T>) -> RepositoryResult<u64> {
        let rows = self
            .store
            .execute(&StoreQuery::filtered(Some(filter)))
            .await
            .map_err(|e| RepositoryError::from_store(RepositoryOperation::DeleteAll, e))?;

        let mut deleted = 0;
        for row in rows {
            match self.remove(row).await {
                Ok(()) => deleted += 1,
                // already removed by the cascade of an earlier row
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.with_operation(RepositoryOperation::DeleteAll)),
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::tests::{book, Book};
    use crate::query::Pagination;
    use crate::repository::RepositoryErrorKind;
    use crate::store::MemoryStore;
    use crate::resource::Value;

    fn repository() -> CrudRepository<Book, MemoryStore<Book>> {
        CrudRepository::new(MemoryStore::new(), DefaultHooks)
    }

    fn named(slug: &str, title: &str) -> Book {
        let mut item = book(0, title, None);
        item.slug = slug.to_string();
        item
    }

    #[tokio::test]
    async fn test_create_and_get_by_either_identifier() {
        let repo = repository();
        let created = repo.create(named("dune", "Dune")).await.unwrap();
        assert_eq!(created.id, 1);

        let by_id = repo.get(&Identifier::Id(1)).await.unwrap();
        let by_slug = repo.get(&"dune".parse().unwrap()).await.unwrap();
        assert_eq!(by_id, by_slug);

        let missing = repo.get(&Identifier::Id(9)).await.unwrap_err();
        assert_eq!(missing.kind, RepositoryErrorKind::NotFound);
        assert!(repo.get_or_default(&Identifier::Id(9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_duplicate_carries_existing_row() {
        let repo = repository();
        repo.create(named("dune", "Dune")).await.unwrap();

        let error = repo.create(named("dune", "Dune again")).await.unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::DuplicateResource);
        assert_eq!(error.operation, RepositoryOperation::Create);
        assert_eq!(error.existing.map(|e| e.id), Some("1".to_string()));
    }

    #[tokio::test]
    async fn test_validation_rejects_before_writing() {
        let repo = repository();
        for slug in ["random", "12", ""] {
            let error = repo.create(named(slug, "x")).await.unwrap_err();
            assert_eq!(error.kind, RepositoryErrorKind::ValidationFailed);
        }
        assert_eq!(repo.get_count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_if_not_exists_returns_existing() {
        let repo = repository();
        let first = repo.create_if_not_exists(named("dune", "Dune")).await.unwrap();
        let second = repo
            .create_if_not_exists(named("dune", "Other title"))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(repo.get_count(None).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_create_if_not_exists_yields_one_row() {
        let repo = std::sync::Arc::new(repository());
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let repo = std::sync::Arc::clone(&repo);
                tokio::spawn(async move { repo.create_if_not_exists(named("a", "A")).await })
            })
            .collect();

        let mut rows = Vec::new();
        for task in tasks {
            rows.push(task.await.unwrap().unwrap());
        }
        assert!(rows.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(repo.get_count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_random_slug_returns_a_row() {
        let repo = repository();
        let random = Identifier::Slug(RANDOM_SLUG.to_string());
        assert!(repo.get_or_default(&random).await.unwrap().is_none());

        repo.create(named("a", "A")).await.unwrap();
        repo.create(named("b", "B")).await.unwrap();
        let picked = repo.get(&random).await.unwrap();
        assert!(["a", "b"].contains(&picked.slug.as_str()));
    }

    #[tokio::test]
    async fn test_edit_patch_and_slug_conflicts() {
        let repo = repository();
        let dune = repo.create(named("dune", "Dune")).await.unwrap();
        repo.create(named("emma", "Emma")).await.unwrap();

        let edited = repo
            .edit(dune.id, named("dune-1965", "Dune (1965)"), true)
            .await
            .unwrap();
        assert_eq!(edited.id, dune.id);
        assert_eq!(edited.slug, "dune-1965");

        let patched = repo.patch(dune.id, |b| b.pages = Some(412)).await.unwrap();
        assert_eq!(patched.pages, Some(412));
        assert_eq!(patched.title, "Dune (1965)");

        let conflict = repo
            .patch(dune.id, |b| b.slug = "emma".to_string())
            .await
            .unwrap_err();
        assert!(conflict.is_duplicate());
        assert_eq!(conflict.operation, RepositoryOperation::Patch);

        let missing = repo.edit(77, named("x", "x"), false).await.unwrap_err();
        assert!(missing.is_not_found());
        assert_eq!(missing.operation, RepositoryOperation::Edit);
    }

    #[tokio::test]
    async fn test_delete_and_delete_all() {
        let repo = repository();
        for (slug, pages) in [("a", 10), ("b", 200), ("c", 300)] {
            let mut item = named(slug, slug);
            item.pages = Some(pages);
            repo.create(item).await.unwrap();
        }

        repo.delete(&Identifier::Slug("a".to_string())).await.unwrap();
        assert!(repo.delete(&Identifier::Id(1)).await.unwrap_err().is_not_found());

        let pages = Book::schema().field("pages").unwrap();
        let deleted = repo
            .delete_all(Filter::Ge(pages, Value::Int(100)))
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(repo.get_count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_is_capped_and_sorted() {
        let config = EngineConfig {
            search_limit: 2,
            ..EngineConfig::default()
        };
        let repo: CrudRepository<Book, _> =
            CrudRepository::with_config(MemoryStore::new(), DefaultHooks, &config);
        for (slug, title) in [("c", "Ring C"), ("a", "ring a"), ("b", "RING b"), ("d", "dune")] {
            repo.create(named(slug, title)).await.unwrap();
        }

        let found = repo.search("ring").await.unwrap();
        let titles: Vec<&str> = found.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["RING b", "Ring C"]);
    }

    #[tokio::test]
    async fn test_from_ids_keeps_requested_order() {
        let repo = repository();
        for slug in ["a", "b", "c"] {
            repo.create(named(slug, slug)).await.unwrap();
        }
        let rows = repo.from_ids(&[3, 9, 1]).await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[tokio::test]
    async fn test_get_all_pages_through_the_repository() {
        let repo = repository();
        for i in 1..=5 {
            repo.create(named(&format!("same-{i}"), "Same")).await.unwrap();
        }

        let query = ListQuery::new()
            .with_sort(Sort::parse(Some("title")).unwrap())
            .with_pagination(Pagination::new(2));
        let first = repo.get_all(query.clone()).await.unwrap();
        assert_eq!(first.ids(), vec![1, 2]);

        let rest = repo
            .get_all(query.with_pagination(Pagination::new(10).after(2)))
            .await
            .unwrap();
        assert_eq!(rest.ids(), vec![3, 4, 5]);
        assert_eq!(rest.next_cursor, None);
    }
}

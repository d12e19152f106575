//! Media catalog built on the engine
//!
//! Studios, shows, seasons, episodes and collections live in in-memory stores
//! behind [`CrudRepository`] instances with per-type hooks, and the library
//! view unions shows and collections. [`Catalog`] wires everything, including
//! the relation registry, from one [`Config`].
//!
//! # Example
//!
//! ```rust,ignore
//! use resource_engine::catalog::{Catalog, CatalogSeed};
//! use resource_engine::prelude::*;
//!
//! let catalog = Catalog::in_memory(&Config::load()?);
//! catalog.load_seed(CatalogSeed::read("catalog.json").await?).await?;
//!
//! let query = catalog.list_query::<Episode>(&ListParams::default().with_limit(10))?;
//! let page = catalog.episodes_of(&"arcane".parse()?, query).await?;
//! ```

mod collection;
mod episode;
mod library_item;
mod season;
mod show;
mod studio;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use collection::{Collection, CollectionHooks};
pub use episode::{Episode, EpisodeHooks};
pub use library_item::{library, ItemKind, LibraryItem};
pub use season::{Season, SeasonHooks};
pub use show::{Show, ShowHooks, Status};
pub use studio::Studio;

use crate::config::{Config, EngineConfig};
use crate::identifier::Identifier;
use crate::query::{
    ForeignKeyLoader, ListParams, ListQuery, Page, QueryError, RelationDescriptor,
    RelationRegistry,
};
use crate::repository::{
    CrudRepository, DefaultHooks, ReadRepository, Repository, RepositoryResult, UnionRepository,
};
use crate::resource::Resource;
use crate::store::MemoryStore;

pub type StudioRepository = CrudRepository<Studio, MemoryStore<Studio>, DefaultHooks>;
pub type ShowRepository = CrudRepository<Show, MemoryStore<Show>, ShowHooks>;
pub type SeasonRepository = CrudRepository<Season, MemoryStore<Season>, SeasonHooks>;
pub type EpisodeRepository = CrudRepository<Episode, MemoryStore<Episode>, EpisodeHooks>;
pub type CollectionRepository =
    CrudRepository<Collection, MemoryStore<Collection>, CollectionHooks>;

/// Rows to load into a fresh catalog, in dependency order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub studios: Vec<Studio>,
    #[serde(default)]
    pub collections: Vec<Collection>,
    #[serde(default)]
    pub shows: Vec<Show>,
    #[serde(default)]
    pub seasons: Vec<Season>,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

impl CatalogSeed {
    /// Read a JSON seed file
    pub async fn read(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let text = tokio::fs::read_to_string(path.as_ref()).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Number of rows created by [`Catalog::load_seed`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub studios: usize,
    pub collections: usize,
    pub shows: usize,
    pub seasons: usize,
    pub episodes: usize,
}

/// Every repository of the catalog, sharing one set of stores
pub struct Catalog {
    pub studios: StudioRepository,
    pub shows: ShowRepository,
    pub seasons: SeasonRepository,
    pub episodes: EpisodeRepository,
    pub collections: CollectionRepository,
    pub library: UnionRepository<LibraryItem>,
    registry: Arc<RelationRegistry>,
    engine: EngineConfig,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("registry", &self.registry)
            .field("engine", &self.engine)
            .finish()
    }
}

impl Catalog {
    /// Build an empty catalog backed by in-memory stores
    pub fn in_memory(config: &Config) -> Self {
        let engine = config.engine.clone();
        let studios = MemoryStore::<Studio>::new();
        let shows = MemoryStore::<Show>::new();
        let seasons = MemoryStore::<Season>::new();
        let episodes = MemoryStore::<Episode>::new();
        let collections = MemoryStore::<Collection>::new();

        let registry = relations(&studios, &shows, &seasons);

        Self {
            studios: CrudRepository::with_config(studios, DefaultHooks, &engine),
            shows: CrudRepository::with_config(
                shows.clone(),
                ShowHooks::new(seasons.clone(), episodes.clone()),
                &engine,
            ),
            seasons: CrudRepository::with_config(
                seasons.clone(),
                SeasonHooks::new(shows.clone(), episodes.clone()),
                &engine,
            ),
            episodes: CrudRepository::with_config(
                episodes.clone(),
                EpisodeHooks::new(shows.clone(), seasons, episodes),
                &engine,
            ),
            collections: CrudRepository::with_config(
                collections.clone(),
                CollectionHooks::new(shows.clone()),
                &engine,
            ),
            library: library(shows, collections, &engine),
            registry,
            engine,
        }
    }

    /// Relations declared by the catalog types
    pub fn registry(&self) -> &RelationRegistry {
        &self.registry
    }

    /// Engine settings the catalog was built with
    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    /// Resolve textual list parameters for `T`
    pub fn list_query<T: Resource>(&self, params: &ListParams) -> Result<ListQuery<T>, QueryError> {
        params.resolve(&self.registry, &self.engine)
    }

    /// Episodes of one show, addressed by id or slug
    pub async fn episodes_of(
        &self,
        show: &Identifier<i64>,
        query: ListQuery<Episode>,
    ) -> RepositoryResult<Page<Episode>> {
        let owned = show.matcher(Episode::show_id_field(), Episode::show_slug_field());
        self.episodes.get_all(query.constrained(owned)).await
    }

    /// Create every row of `seed`
    ///
    /// Parents are created before children, so children may refer to parents
    /// by the ids given in the seed.
    pub async fn load_seed(&self, seed: CatalogSeed) -> RepositoryResult<SeedSummary> {
        let mut summary = SeedSummary::default();
        for studio in seed.studios {
            self.studios.create(studio).await?;
            summary.studios += 1;
        }
        for collection in seed.collections {
            self.collections.create(collection).await?;
            summary.collections += 1;
        }
        for show in seed.shows {
            self.shows.create(show).await?;
            summary.shows += 1;
        }
        for season in seed.seasons {
            self.seasons.create(season).await?;
            summary.seasons += 1;
        }
        for episode in seed.episodes {
            self.episodes.create(episode).await?;
            summary.episodes += 1;
        }
        tracing::info!(?summary, "Loaded catalog seed");
        Ok(summary)
    }
}

fn relations(
    studios: &MemoryStore<Studio>,
    shows: &MemoryStore<Show>,
    seasons: &MemoryStore<Season>,
) -> Arc<RelationRegistry> {
    RelationRegistry::builder()
        .one::<Show>(
            RelationDescriptor::one("studio", Studio::KIND, "studioId"),
            ForeignKeyLoader::<Show, Studio, _>::new(
                studios.clone(),
                |show: &Show| show.studio_id,
                |show: &mut Show, studio: Option<Studio>| show.studio = studio,
            ),
        )
        .many::<Show>(RelationDescriptor::many("seasons", Season::KIND, "showId"))
        .many::<Show>(RelationDescriptor::many("episodes", Episode::KIND, "showId"))
        .many::<Show>(RelationDescriptor::many("collections", Collection::KIND, "collections"))
        .many::<Studio>(RelationDescriptor::many("shows", Show::KIND, "studioId"))
        .one::<Season>(
            RelationDescriptor::one("show", Show::KIND, "showId"),
            ForeignKeyLoader::<Season, Show, _>::new(
                shows.clone(),
                |season: &Season| Some(season.show_id),
                |season: &mut Season, show: Option<Show>| season.show = show.map(Box::new),
            ),
        )
        .many::<Season>(RelationDescriptor::many("episodes", Episode::KIND, "seasonId"))
        .one::<Episode>(
            RelationDescriptor::one("show", Show::KIND, "showId"),
            ForeignKeyLoader::<Episode, Show, _>::new(
                shows.clone(),
                |episode: &Episode| Some(episode.show_id),
                |episode: &mut Episode, show: Option<Show>| episode.show = show.map(Box::new),
            ),
        )
        .one::<Episode>(
            RelationDescriptor::one("season", Season::KIND, "seasonId"),
            ForeignKeyLoader::<Episode, Season, _>::new(
                seasons.clone(),
                |episode: &Episode| episode.season_id,
                |episode: &mut Episode, season: Option<Season>| {
                    episode.season = season.map(Box::new)
                },
            ),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Include, Pagination};
    use crate::repository::RepositoryErrorKind;

    fn with_id<T: Resource<Id = i64>>(mut item: T, id: i64) -> T {
        item.set_id(id);
        item
    }

    fn seed() -> CatalogSeed {
        let mut dune = with_id(Show::new("dune", "Dune"), 1);
        dune.studio_id = Some(1);
        dune.collections = Some(vec![1]);
        dune.status = Status::Finished;

        let mut mononoke = with_id(Show::new("mononoke", "Princess Mononoke"), 2);
        mononoke.studio_id = Some(1);
        mononoke.status = Status::Finished;

        let mut arcane = with_id(Show::new("arcane", "Arcane"), 3);
        arcane.status = Status::Airing;

        CatalogSeed {
            studios: vec![with_id(Studio::new("ghibli", "Studio Ghibli"), 1)],
            collections: vec![with_id(Collection::new("dune-saga", "Dune Saga"), 1)],
            shows: vec![dune, mononoke, arcane],
            seasons: vec![Season::new(3, 1)],
            episodes: vec![
                Episode::numbered(3, 1, 1),
                Episode::numbered(3, 1, 2),
                Episode::numbered(3, 1, 3),
                Episode::absolute(2, Some(1)),
            ],
        }
    }

    async fn catalog() -> Catalog {
        let catalog = Catalog::in_memory(&Config::default());
        let summary = catalog.load_seed(seed()).await.unwrap();
        assert_eq!(summary.episodes, 4);
        catalog
    }

    #[tokio::test]
    async fn test_episode_validation_completes_rows() {
        let catalog = catalog().await;
        let first = catalog.episodes.get(&Identifier::Id(1)).await.unwrap();
        assert_eq!(first.slug, "arcane-s1e1");
        assert_eq!(first.show_slug, "arcane");
        assert_eq!(first.season_id, Some(1));

        let movie = catalog.episodes.get(&"mononoke-1".parse().unwrap()).await.unwrap();
        assert_eq!(movie.season_id, None);

        let season = catalog.seasons.get(&Identifier::Id(1)).await.unwrap();
        assert_eq!(season.slug, "arcane-s1");
    }

    #[tokio::test]
    async fn test_children_require_a_show() {
        let catalog = catalog().await;
        let error = catalog
            .episodes
            .create(Episode::numbered(0, 1, 1))
            .await
            .unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::ValidationFailed);
        assert_eq!(error.message, "Missing show id");

        let error = catalog.seasons.create(Season::new(42, 1)).await.unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::ValidationFailed);
    }

    #[tokio::test]
    async fn test_episodes_of_pages_by_show_identifier() {
        let catalog = catalog().await;
        let query = ListQuery::new().with_pagination(Pagination::new(2));

        let first = catalog
            .episodes_of(&"arcane".parse().unwrap(), query.clone())
            .await
            .unwrap();
        assert_eq!(first.ids(), vec![1, 2]);
        assert_eq!(first.next_cursor, Some(2));

        let rest = catalog
            .episodes_of(
                &Identifier::Id(3),
                query.with_pagination(Pagination::new(2).after(2)),
            )
            .await
            .unwrap();
        assert_eq!(rest.ids(), vec![3]);
        assert_eq!(rest.next_cursor, None);
    }

    #[tokio::test]
    async fn test_includes_load_single_valued_relations() {
        let catalog = catalog().await;
        let include = Include::<Show>::parse(Some("studio"), catalog.registry()).unwrap();
        let page = catalog
            .shows
            .get_all(ListQuery::new().with_include(include))
            .await
            .unwrap();
        let studios: Vec<Option<&str>> = page
            .items
            .iter()
            .map(|s| s.studio.as_ref().map(|studio| studio.slug.as_str()))
            .collect();
        // Arcane, Dune, Princess Mononoke
        assert_eq!(studios, vec![None, Some("ghibli"), Some("ghibli")]);

        let include = Include::<Episode>::parse(Some("show,season"), catalog.registry()).unwrap();
        let episode = catalog
            .episodes
            .get_with(&Identifier::Id(1), &include)
            .await
            .unwrap();
        assert_eq!(episode.show.map(|s| s.slug), Some("arcane".to_string()));
        assert_eq!(episode.season.map(|s| s.season_number), Some(1));

        assert!(matches!(
            Include::<Show>::parse(Some("seasons"), catalog.registry()),
            Err(QueryError::MultiValuedRelation { .. })
        ));
        assert!(matches!(
            Include::<Show>::parse(Some("director"), catalog.registry()),
            Err(QueryError::UnknownRelation { .. })
        ));
    }

    #[tokio::test]
    async fn test_edit_relation_reset_policy() {
        let catalog = catalog().await;
        let mut changes = Show::new("dune", "Dune");
        changes.collections = Some(Vec::new());

        let merged = catalog.shows.edit(1, changes.clone(), false).await.unwrap();
        assert_eq!(merged.studio_id, Some(1));
        assert_eq!(merged.collections, Some(Vec::new()));

        changes.collections = Some(vec![1]);
        let replaced = catalog.shows.edit(1, changes, true).await.unwrap();
        assert_eq!(replaced.studio_id, None);
        assert_eq!(replaced.collections, Some(vec![1]));
    }

    #[tokio::test]
    async fn test_show_rename_rewrites_children() {
        let catalog = catalog().await;
        catalog
            .shows
            .patch(3, |s| s.slug = "arcane-league".to_string())
            .await
            .unwrap();

        let episode = catalog.episodes.get(&Identifier::Id(1)).await.unwrap();
        assert_eq!(episode.show_slug, "arcane-league");
        assert_eq!(episode.slug, "arcane-league-s1e1");
        let season = catalog.seasons.get(&Identifier::Id(1)).await.unwrap();
        assert_eq!(season.slug, "arcane-league-s1");
    }

    #[tokio::test]
    async fn test_show_delete_cascades() {
        let catalog = catalog().await;
        catalog.shows.delete(&"arcane".parse().unwrap()).await.unwrap();

        assert_eq!(catalog.seasons.get_count(None).await.unwrap(), 0);
        assert_eq!(catalog.episodes.get_count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_last_episode_delete_removes_show() {
        let catalog = catalog().await;
        catalog.episodes.delete(&Identifier::Id(1)).await.unwrap();
        assert!(catalog.shows.get_or_default(&Identifier::Id(3)).await.unwrap().is_some());

        catalog.episodes.delete(&Identifier::Id(4)).await.unwrap();
        assert!(catalog.shows.get_or_default(&Identifier::Id(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_library_lists_collections_instead_of_members() {
        let catalog = catalog().await;
        let page = catalog.library.get_all(ListQuery::new()).await.unwrap();
        assert_eq!(page.ids(), vec![3, -1, 2]);
        assert_eq!(page.items[1].kind, ItemKind::Collection);
        assert_eq!(page.items[1].source_id(), 1);

        let error = catalog
            .library
            .delete(&Identifier::Id(-1))
            .await
            .unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::UnsupportedOperation);

        catalog.collections.delete(&Identifier::Id(1)).await.unwrap();
        let page = catalog.library.get_all(ListQuery::new()).await.unwrap();
        assert_eq!(page.ids(), vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_list_query_from_params() {
        let catalog = catalog().await;
        let params = ListParams::default()
            .with_filter("status eq finished")
            .with_sort("name:desc")
            .with_limit(1);
        let query = catalog.list_query::<Show>(&params).unwrap();
        let page = catalog.shows.get_all(query).await.unwrap();
        assert_eq!(page.ids(), vec![2]);
        assert_eq!(page.next_cursor, Some(2));
    }

    #[tokio::test]
    async fn test_seed_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        let json = r#"{"studios":[{"id":4,"slug":"mappa","name":"MAPPA"}],"shows":[{"slug":"jjk","name":"Jujutsu Kaisen","studioId":4}]}"#;
        std::fs::write(&path, json).unwrap();

        let seed = CatalogSeed::read(&path).await.unwrap();
        let catalog = Catalog::in_memory(&Config::default());
        let summary = catalog.load_seed(seed).await.unwrap();
        assert_eq!(summary.studios, 1);
        assert_eq!(summary.shows, 1);
        let show = catalog.shows.get(&"jjk".parse().unwrap()).await.unwrap();
        assert_eq!(show.studio_id, Some(4));
    }
}

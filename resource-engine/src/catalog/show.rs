//! Shows and their lifecycle rules

use std::fmt;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::episode::Episode;
use super::season::Season;
use super::studio::Studio;
use crate::query::Filter;
use crate::repository::{RepositoryError, RepositoryOperation, RepositoryResult, ResourceHooks};
use crate::resource::{Field, FieldKind, Resource, Schema, Value};
use crate::store::{MemoryStore, Store, StoreError, StoreQuery};

/// Airing status of a show
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Unknown,
    Finished,
    Airing,
    Planned,
}

impl Status {
    /// Every variant, as written in filters
    pub const VARIANTS: &'static [&'static str] = &["unknown", "finished", "airing", "planned"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unknown => "unknown",
            Status::Finished => "finished",
            Status::Airing => "airing",
            Status::Planned => "planned",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A series or movie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Show {
    #[serde(default)]
    pub id: i64,
    pub slug: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub air_date: Option<NaiveDate>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub studio_id: Option<i64>,
    /// Ids of the collections containing the show; `None` leaves them unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub studio: Option<Studio>,
}

impl Show {
    pub fn new(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            slug: slug.into(),
            name: name.into(),
            overview: None,
            status: Status::Unknown,
            genres: Vec::new(),
            air_date: None,
            rating: None,
            studio_id: None,
            collections: None,
            studio: None,
        }
    }

    /// Whether the show belongs to the collection `id`
    pub fn is_in_collection(&self, id: i64) -> bool {
        self.collections
            .as_ref()
            .is_some_and(|ids| ids.contains(&id))
    }

    /// Whether the show belongs to any collection
    pub fn is_collected(&self) -> bool {
        self.collections.as_ref().is_some_and(|ids| !ids.is_empty())
    }
}

static SHOW_SCHEMA: Lazy<Schema<Show>> = Lazy::new(|| {
    Schema::builder(
        Field::new("id", "id", FieldKind::Int, |s: &Show| Value::Int(s.id)),
        Field::new("slug", "slug", FieldKind::Text, |s: &Show| {
            Value::from(s.slug.as_str())
        }),
    )
    .field(Field::new("name", "name", FieldKind::Text, |s: &Show| {
        Value::from(s.name.as_str())
    }))
    .field(Field::new(
        "status",
        "status",
        FieldKind::Enum(Status::VARIANTS),
        |s: &Show| Value::from(s.status.as_str()),
    ))
    .field(Field::new("genres", "genres", FieldKind::TextList, |s: &Show| {
        Value::from(s.genres.clone())
    }))
    .field(
        Field::new("airDate", "air_date", FieldKind::Date, |s: &Show| {
            Value::from(s.air_date)
        })
        .nullable(),
    )
    .field(
        Field::new("rating", "rating", FieldKind::Float, |s: &Show| {
            Value::from(s.rating)
        })
        .nullable(),
    )
    .field(
        Field::new("studioId", "studio_id", FieldKind::Int, |s: &Show| {
            Value::from(s.studio_id)
        })
        .nullable(),
    )
    .relation(
        "studio",
        |s: &Show| s.studio_id.is_some(),
        |from: &Show, to: &mut Show| {
            to.studio_id = from.studio_id;
            to.studio = from.studio.clone();
        },
    )
    .relation(
        "collections",
        |s: &Show| s.collections.is_some(),
        |from: &Show, to: &mut Show| to.collections = from.collections.clone(),
    )
    .default_sort("name", false)
    .search(&["name", "slug"])
    .build()
});

impl Resource for Show {
    type Id = i64;
    const KIND: &'static str = "Show";

    fn id(&self) -> i64 {
        self.id
    }

    fn slug(&self) -> &str {
        &self.slug
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn schema() -> &'static Schema<Self> {
        &SHOW_SCHEMA
    }
}

/// Replace the `old` slug prefix of a derived slug
pub(crate) fn rebase_slug(slug: &str, old: &str, new: &str) -> Option<String> {
    slug.strip_prefix(old)
        .filter(|rest| rest.starts_with('-'))
        .map(|rest| format!("{new}{rest}"))
}

/// Delete every row of `store` matching `filter`, ignoring rows already gone
pub(crate) async fn purge<T, S>(store: &S, filter: Filter<T>) -> RepositoryResult<u64>
where
    T: Resource,
    S: Store<T>,
{
    let rows = store
        .execute(&StoreQuery::filtered(Some(filter)))
        .await
        .map_err(|e| RepositoryError::from_store(RepositoryOperation::Delete, e))?;

    let mut deleted = 0;
    for row in rows {
        match store.delete(&row.id()).await {
            Ok(()) => deleted += 1,
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(RepositoryError::from_store(RepositoryOperation::Delete, e)),
        }
    }
    Ok(deleted)
}

/// Delete the seasons and episodes owned by a show
pub(crate) async fn purge_children(
    seasons: &MemoryStore<Season>,
    episodes: &MemoryStore<Episode>,
    show_id: i64,
) -> RepositoryResult<()> {
    let episode_count = purge(
        episodes,
        Filter::Eq(Episode::show_id_field(), Value::Int(show_id)),
    )
    .await?;
    let season_count = purge(
        seasons,
        Filter::Eq(Season::show_id_field(), Value::Int(show_id)),
    )
    .await?;
    tracing::debug!(
        show_id,
        episodes = episode_count,
        seasons = season_count,
        "Deleted show children"
    );
    Ok(())
}

/// Show rules: cascade deletes and propagate slug renames
///
/// Works on the child stores directly so that the cascade never re-enters the
/// episode hooks.
#[derive(Debug, Clone)]
pub struct ShowHooks {
    seasons: MemoryStore<Season>,
    episodes: MemoryStore<Episode>,
}

impl ShowHooks {
    pub fn new(seasons: MemoryStore<Season>, episodes: MemoryStore<Episode>) -> Self {
        Self { seasons, episodes }
    }
}

impl ResourceHooks<Show> for ShowHooks {
    async fn on_delete(&self, item: &Show) -> RepositoryResult<()> {
        purge_children(&self.seasons, &self.episodes, item.id).await
    }

    async fn on_edited(&self, old: &Show, new: &Show) -> RepositoryResult<()> {
        if old.slug == new.slug {
            return Ok(());
        }
        let update_error = |e: StoreError| RepositoryError::from_store(RepositoryOperation::Edit, e);

        let owned = StoreQuery::filtered(Some(Filter::Eq(
            Episode::show_id_field(),
            Value::Int(new.id),
        )));
        for mut episode in self.episodes.execute(&owned).await.map_err(update_error)? {
            episode.show_slug = new.slug.clone();
            if let Some(slug) = rebase_slug(&episode.slug, &old.slug, &new.slug) {
                episode.slug = slug;
            }
            self.episodes.update(episode).await.map_err(update_error)?;
        }

        let owned = StoreQuery::filtered(Some(Filter::Eq(
            Season::show_id_field(),
            Value::Int(new.id),
        )));
        for mut season in self.seasons.execute(&owned).await.map_err(update_error)? {
            if let Some(slug) = rebase_slug(&season.slug, &old.slug, &new.slug) {
                season.slug = slug;
                self.seasons.update(season).await.map_err(update_error)?;
            }
        }

        tracing::debug!(from = %old.slug, to = %new.slug, "Propagated show slug");
        Ok(())
    }
}

//! Episodes of a show

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::season::{parent_show, Season};
use super::show::{purge, Show};
use crate::query::Filter;
use crate::repository::{
    validate_slug, RepositoryError, RepositoryOperation, RepositoryResult, ResourceHooks,
};
use crate::resource::{Field, FieldKind, Resource, Schema, Value};
use crate::store::{MemoryStore, Store, StoreError, StoreQuery};

/// An episode, or the single video of a movie-like show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    #[serde(default)]
    pub id: i64,
    /// Defaults to `{show}-s{season}e{episode}` or `{show}-{absolute}`
    #[serde(default)]
    pub slug: String,
    /// Owning show; `0` means missing
    #[serde(default)]
    pub show_id: i64,
    /// Slug of the owning show, maintained by the repository
    #[serde(default)]
    pub show_slug: String,
    /// Resolved from the season number when left unset
    #[serde(default)]
    pub season_id: Option<i64>,
    #[serde(default)]
    pub season_number: Option<i64>,
    #[serde(default)]
    pub episode_number: Option<i64>,
    #[serde(default)]
    pub absolute_number: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show: Option<Box<Show>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<Box<Season>>,
}

impl Episode {
    /// Episode `episode` of season `season`
    pub fn numbered(show_id: i64, season: i64, episode: i64) -> Self {
        Self {
            season_number: Some(season),
            episode_number: Some(episode),
            ..Self::absolute(show_id, None)
        }
    }

    /// Episode identified only by its absolute number
    pub fn absolute(show_id: i64, absolute: Option<i64>) -> Self {
        Self {
            id: 0,
            slug: String::new(),
            show_id,
            show_slug: String::new(),
            season_id: None,
            season_number: None,
            episode_number: None,
            absolute_number: absolute,
            name: None,
            release_date: None,
            show: None,
            season: None,
        }
    }

    /// Slug derived from the show slug and the numbering
    pub fn default_slug(&self, show_slug: &str) -> Option<String> {
        match (self.season_number, self.episode_number, self.absolute_number) {
            (Some(season), Some(episode), _) => Some(format!("{show_slug}-s{season}e{episode}")),
            (_, _, Some(absolute)) => Some(format!("{show_slug}-{absolute}")),
            _ => None,
        }
    }

    pub(crate) fn show_id_field() -> Field<Episode> {
        EPISODE_SCHEMA.show_id
    }

    pub(crate) fn show_slug_field() -> Field<Episode> {
        EPISODE_SCHEMA.show_slug
    }

    pub(crate) fn season_id_field() -> Field<Episode> {
        EPISODE_SCHEMA.season_id
    }
}

struct EpisodeSchema {
    schema: Schema<Episode>,
    show_id: Field<Episode>,
    show_slug: Field<Episode>,
    season_id: Field<Episode>,
}

static EPISODE_SCHEMA: Lazy<EpisodeSchema> = Lazy::new(|| {
    let show_id = Field::new("showId", "show_id", FieldKind::Int, |e: &Episode| {
        Value::Int(e.show_id)
    });
    let show_slug = Field::new("showSlug", "show_slug", FieldKind::Text, |e: &Episode| {
        Value::from(e.show_slug.as_str())
    });
    let season_id = Field::new("seasonId", "season_id", FieldKind::Int, |e: &Episode| {
        Value::from(e.season_id)
    })
    .nullable();

    let schema = Schema::builder(
        Field::new("id", "id", FieldKind::Int, |e: &Episode| Value::Int(e.id)),
        Field::new("slug", "slug", FieldKind::Text, |e: &Episode| {
            Value::from(e.slug.as_str())
        }),
    )
    .field(show_id)
    .field(show_slug)
    .field(season_id)
    .field(
        Field::new("seasonNumber", "season_number", FieldKind::Int, |e: &Episode| {
            Value::from(e.season_number)
        })
        .nullable(),
    )
    .field(
        Field::new("episodeNumber", "episode_number", FieldKind::Int, |e: &Episode| {
            Value::from(e.episode_number)
        })
        .nullable(),
    )
    .field(
        Field::new("absoluteNumber", "absolute_number", FieldKind::Int, |e: &Episode| {
            Value::from(e.absolute_number)
        })
        .nullable(),
    )
    .field(
        Field::new("name", "name", FieldKind::Text, |e: &Episode| {
            Value::from(e.name.clone())
        })
        .nullable(),
    )
    .field(
        Field::new("releaseDate", "release_date", FieldKind::Date, |e: &Episode| {
            Value::from(e.release_date)
        })
        .nullable(),
    )
    .relation(
        "season",
        |e: &Episode| e.season_id.is_some(),
        |from: &Episode, to: &mut Episode| {
            to.season_id = from.season_id;
            to.season = from.season.clone();
        },
    )
    .default_sort("seasonNumber", false)
    .default_sort("episodeNumber", false)
    .default_sort("absoluteNumber", false)
    .search(&["name", "slug"])
    .build();

    EpisodeSchema {
        schema,
        show_id,
        show_slug,
        season_id,
    }
});

impl Resource for Episode {
    type Id = i64;
    const KIND: &'static str = "Episode";

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
        &EPISODE_SCHEMA.schema
    }
}

/// Episode rules
///
/// Validation requires a parent show, copies its slug, resolves the season
/// from its number and derives the slug when it is empty. Deleting the last
/// episode of a show deletes the show with its seasons.
#[derive(Debug, Clone)]
pub struct EpisodeHooks {
    shows: MemoryStore<Show>,
    seasons: MemoryStore<Season>,
    episodes: MemoryStore<Episode>,
}

impl EpisodeHooks {
    pub fn new(
        shows: MemoryStore<Show>,
        seasons: MemoryStore<Season>,
        episodes: MemoryStore<Episode>,
    ) -> Self {
        Self {
            shows,
            seasons,
            episodes,
        }
    }

    async fn resolve_season(&self, show_id: i64, number: i64) -> RepositoryResult<Option<i64>> {
        let filter = Filter::and([
            Some(Filter::Eq(Season::show_id_field(), Value::Int(show_id))),
            Season::schema()
                .field("seasonNumber")
                .map(|field| Filter::Eq(field, Value::Int(number))),
        ]);
        let rows = self
            .seasons
            .execute(&StoreQuery::filtered(filter).limit(1))
            .await
            .map_err(|e| RepositoryError::from_store(RepositoryOperation::Create, e))?;
        Ok(rows.first().map(|season| season.id))
    }
}

impl ResourceHooks<Episode> for EpisodeHooks {
    async fn validate(&self, item: &mut Episode) -> RepositoryResult<()> {
        let show = parent_show(&self.shows, Episode::KIND, item.show_id, &item.slug).await?;
        item.show_slug = show.slug;

        if let (Some(number), None) = (item.season_number, item.season_id) {
            item.season_id = self.resolve_season(item.show_id, number).await?;
        }

        if item.slug.is_empty() {
            item.slug = item.default_slug(&item.show_slug).ok_or_else(|| {
                RepositoryError::validation_failed(
                    "Episode needs a season and episode number or an absolute number",
                )
                .with_entity(Episode::KIND, item.show_slug.as_str())
            })?;
        }
        validate_slug(item)
    }

    async fn on_delete(&self, item: &Episode) -> RepositoryResult<()> {
        let siblings = Filter::Eq(Episode::show_id_field(), Value::Int(item.show_id));
        let remaining = self
            .episodes
            .count(Some(&siblings))
            .await
            .map_err(|e| RepositoryError::from_store(RepositoryOperation::Delete, e))?;
        if remaining > 0 {
            return Ok(());
        }

        purge(
            &self.seasons,
            Filter::Eq(Season::show_id_field(), Value::Int(item.show_id)),
        )
        .await?;
        match self.shows.delete(&item.show_id).await {
            Ok(()) => {
                tracing::info!(show = %item.show_slug, "Deleted show after its last episode");
                Ok(())
            }
            Err(StoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(RepositoryError::from_store(RepositoryOperation::Delete, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_slug() {
        let episode = Episode::numbered(1, 2, 5);
        assert_eq!(episode.default_slug("dune"), Some("dune-s2e5".to_string()));

        let episode = Episode::absolute(1, Some(12));
        assert_eq!(episode.default_slug("dune"), Some("dune-12".to_string()));
        assert_eq!(Episode::absolute(1, None).default_slug("dune"), None);
    }

    #[test]
    fn test_default_sort_orders_by_numbering() {
        let mut episodes = vec![
            Episode::numbered(1, 2, 1),
            Episode::numbered(1, 1, 2),
            Episode::absolute(1, Some(3)),
            Episode::numbered(1, 1, 1),
        ];
        for (id, episode) in episodes.iter_mut().enumerate() {
            episode.id = id as i64 + 1;
        }
        crate::query::Sort::Default.compile().sort(&mut episodes);
        let ids: Vec<i64> = episodes.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![4, 2, 1, 3]);
    }
}

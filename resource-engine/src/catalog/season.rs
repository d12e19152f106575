//! Seasons of a show

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::episode::Episode;
use super::show::{purge, Show};
use crate::query::Filter;
use crate::repository::{
    validate_slug, RepositoryError, RepositoryOperation, RepositoryResult, ResourceHooks,
};
use crate::resource::{Field, FieldKind, Resource, Schema, Value};
use crate::store::{MemoryStore, Store, StoreQuery};

/// A season of a show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    #[serde(default)]
    pub id: i64,
    /// Defaults to `{show}-s{number}` when left empty
    #[serde(default)]
    pub slug: String,
    /// Owning show; `0` means missing
    #[serde(default)]
    pub show_id: i64,
    pub season_number: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show: Option<Box<Show>>,
}

impl Season {
    pub fn new(show_id: i64, season_number: i64) -> Self {
        Self {
            id: 0,
            slug: String::new(),
            show_id,
            season_number,
            name: None,
            start_date: None,
            show: None,
        }
    }

    pub(crate) fn show_id_field() -> Field<Season> {
        SEASON_SCHEMA.show_id
    }
}

struct SeasonSchema {
    schema: Schema<Season>,
    show_id: Field<Season>,
}

static SEASON_SCHEMA: Lazy<SeasonSchema> = Lazy::new(|| {
    let show_id = Field::new("showId", "show_id", FieldKind::Int, |s: &Season| {
        Value::Int(s.show_id)
    });
    let schema = Schema::builder(
        Field::new("id", "id", FieldKind::Int, |s: &Season| Value::Int(s.id)),
        Field::new("slug", "slug", FieldKind::Text, |s: &Season| {
            Value::from(s.slug.as_str())
        }),
    )
    .field(show_id)
    .field(Field::new(
        "seasonNumber",
        "season_number",
        FieldKind::Int,
        |s: &Season| Value::Int(s.season_number),
    ))
    .field(
        Field::new("name", "name", FieldKind::Text, |s: &Season| {
            Value::from(s.name.clone())
        })
        .nullable(),
    )
    .field(
        Field::new("startDate", "start_date", FieldKind::Date, |s: &Season| {
            Value::from(s.start_date)
        })
        .nullable(),
    )
    .default_sort("seasonNumber", false)
    .search(&["name", "slug"])
    .build();
    SeasonSchema { schema, show_id }
});

impl Resource for Season {
    type Id = i64;
    const KIND: &'static str = "Season";

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
        &SEASON_SCHEMA.schema
    }
}

/// Look up the show a child row points to
pub(crate) async fn parent_show(
    shows: &MemoryStore<Show>,
    kind: &'static str,
    show_id: i64,
    slug: &str,
) -> RepositoryResult<Show> {
    if show_id == 0 {
        return Err(RepositoryError::validation_failed("Missing show id").with_entity(kind, slug));
    }
    shows
        .execute(&StoreQuery::by_id(&show_id))
        .await
        .map_err(|e| RepositoryError::from_store(RepositoryOperation::Create, e))?
        .into_iter()
        .next()
        .ok_or_else(|| {
            RepositoryError::validation_failed(format!("No show with id {show_id}"))
                .with_entity(kind, slug)
        })
}

/// Season rules: a parent show is required and episodes go with the season
#[derive(Debug, Clone)]
pub struct SeasonHooks {
    shows: MemoryStore<Show>,
    episodes: MemoryStore<Episode>,
}

impl SeasonHooks {
    pub fn new(shows: MemoryStore<Show>, episodes: MemoryStore<Episode>) -> Self {
        Self { shows, episodes }
    }
}

impl ResourceHooks<Season> for SeasonHooks {
    async fn validate(&self, item: &mut Season) -> RepositoryResult<()> {
        let show = parent_show(&self.shows, Season::KIND, item.show_id, &item.slug).await?;
        if item.slug.is_empty() {
            item.slug = format!("{}-s{}", show.slug, item.season_number);
        }
        validate_slug(item)
    }

    async fn on_delete(&self, item: &Season) -> RepositoryResult<()> {
        let owned = Filter::Eq(Episode::season_id_field(), Value::Int(item.id));
        let deleted = purge(&self.episodes, owned).await?;
        tracing::debug!(season = %item.slug, episodes = deleted, "Deleted season episodes");
        Ok(())
    }
}

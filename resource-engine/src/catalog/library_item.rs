//! Library items: shows and collections listed together

use std::sync::Arc;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::collection::Collection;
use super::show::{Show, Status};
use crate::config::EngineConfig;
use crate::query::Filter;
use crate::repository::{StoreSource, UnionRepository, UnionSource};
use crate::resource::{Field, FieldKind, Resource, Schema, Value};
use crate::store::MemoryStore;

/// What a library item was projected from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Show,
    Collection,
}

impl ItemKind {
    pub const VARIANTS: &'static [&'static str] = &["show", "collection"];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Show => "show",
            ItemKind::Collection => "collection",
        }
    }
}

/// Entry of the library view
///
/// Shows keep their id; collections get their id negated, so the two never
/// collide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryItem {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub kind: ItemKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_date: Option<NaiveDate>,
}

impl LibraryItem {
    pub fn from_show(show: Show) -> Self {
        Self {
            id: show.id,
            slug: show.slug,
            name: show.name,
            kind: ItemKind::Show,
            overview: show.overview,
            status: Some(show.status),
            air_date: show.air_date,
        }
    }

    pub fn from_collection(collection: Collection) -> Self {
        Self {
            id: -collection.id,
            slug: collection.slug,
            name: collection.name,
            kind: ItemKind::Collection,
            overview: collection.overview,
            status: None,
            air_date: None,
        }
    }

    /// Id of the show or collection this item was projected from
    pub fn source_id(&self) -> i64 {
        self.id.abs()
    }
}

static LIBRARY_ITEM_SCHEMA: Lazy<Schema<LibraryItem>> = Lazy::new(|| {
    Schema::builder(
        Field::new("id", "id", FieldKind::Int, |i: &LibraryItem| Value::Int(i.id)),
        Field::new("slug", "slug", FieldKind::Text, |i: &LibraryItem| {
            Value::from(i.slug.as_str())
        }),
    )
    .field(Field::new("name", "name", FieldKind::Text, |i: &LibraryItem| {
        Value::from(i.name.as_str())
    }))
    .field(Field::new(
        "kind",
        "kind",
        FieldKind::Enum(ItemKind::VARIANTS),
        |i: &LibraryItem| Value::from(i.kind.as_str()),
    ))
    .field(
        Field::new(
            "status",
            "status",
            FieldKind::Enum(Status::VARIANTS),
            |i: &LibraryItem| Value::from(i.status.map(|s| s.as_str())),
        )
        .nullable(),
    )
    .field(
        Field::new("airDate", "air_date", FieldKind::Date, |i: &LibraryItem| {
            Value::from(i.air_date)
        })
        .nullable(),
    )
    .default_sort("name", false)
    .search(&["name", "slug"])
    .build()
});

impl Resource for LibraryItem {
    type Id = i64;
    const KIND: &'static str = "LibraryItem";

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
        &LIBRARY_ITEM_SCHEMA
    }
}

/// The library view: every collection plus the shows outside any collection
pub fn library(
    shows: MemoryStore<Show>,
    collections: MemoryStore<Collection>,
    config: &EngineConfig,
) -> UnionRepository<LibraryItem> {
    let standalone = Filter::lambda(|show: &Show| !show.is_collected());
    let shows = StoreSource::new("shows", shows, LibraryItem::from_show).with_filter(standalone);
    let collections = StoreSource::new("collections", collections, LibraryItem::from_collection);
    let sources = vec![
        Arc::new(shows) as Arc<dyn UnionSource<LibraryItem>>,
        Arc::new(collections),
    ];
    UnionRepository::with_config(sources, config)
}

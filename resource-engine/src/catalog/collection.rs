//! Collections grouping shows

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::show::Show;
use crate::query::Filter;
use crate::repository::{RepositoryError, RepositoryOperation, RepositoryResult, ResourceHooks};
use crate::resource::{Field, FieldKind, Resource, Schema, Value};
use crate::store::{MemoryStore, Store, StoreQuery};

/// A named group of shows (a franchise, a watch order)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    #[serde(default)]
    pub id: i64,
    pub slug: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
}

impl Collection {
    pub fn new(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            slug: slug.into(),
            name: name.into(),
            overview: None,
        }
    }
}

static COLLECTION_SCHEMA: Lazy<Schema<Collection>> = Lazy::new(|| {
    Schema::builder(
        Field::new("id", "id", FieldKind::Int, |c: &Collection| Value::Int(c.id)),
        Field::new("slug", "slug", FieldKind::Text, |c: &Collection| {
            Value::from(c.slug.as_str())
        }),
    )
    .field(Field::new("name", "name", FieldKind::Text, |c: &Collection| {
        Value::from(c.name.as_str())
    }))
    .field(
        Field::new("overview", "overview", FieldKind::Text, |c: &Collection| {
            Value::from(c.overview.clone())
        })
        .nullable(),
    )
    .default_sort("name", false)
    .search(&["name"])
    .build()
});

impl Resource for Collection {
    type Id = i64;
    const KIND: &'static str = "Collection";

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
        &COLLECTION_SCHEMA
    }
}

/// Drops a deleted collection from the memberships of its shows
#[derive(Debug, Clone)]
pub struct CollectionHooks {
    shows: MemoryStore<Show>,
}

impl CollectionHooks {
    pub fn new(shows: MemoryStore<Show>) -> Self {
        Self { shows }
    }
}

impl ResourceHooks<Collection> for CollectionHooks {
    async fn on_delete(&self, item: &Collection) -> RepositoryResult<()> {
        let collection_id = item.id;
        let members = Filter::lambda(move |show: &Show| show.is_in_collection(collection_id));
        let shows = self
            .shows
            .execute(&StoreQuery::filtered(Some(members)))
            .await
            .map_err(|e| RepositoryError::from_store(RepositoryOperation::Delete, e))?;

        for mut show in shows {
            if let Some(ids) = show.collections.as_mut() {
                ids.retain(|id| *id != collection_id);
            }
            self.shows
                .update(show)
                .await
                .map_err(|e| RepositoryError::from_store(RepositoryOperation::Delete, e))?;
        }
        Ok(())
    }
}

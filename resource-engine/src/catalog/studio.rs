//! Studios producing shows

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::resource::{Field, FieldKind, Resource, Schema, Value};

/// A production studio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Studio {
    #[serde(default)]
    pub id: i64,
    pub slug: String,
    pub name: String,
}

impl Studio {
    pub fn new(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            slug: slug.into(),
            name: name.into(),
        }
    }
}

static STUDIO_SCHEMA: Lazy<Schema<Studio>> = Lazy::new(|| {
    Schema::builder(
        Field::new("id", "id", FieldKind::Int, |s: &Studio| Value::Int(s.id)),
        Field::new("slug", "slug", FieldKind::Text, |s: &Studio| {
            Value::from(s.slug.as_str())
        }),
    )
    .field(Field::new("name", "name", FieldKind::Text, |s: &Studio| {
        Value::from(s.name.as_str())
    }))
    .default_sort("name", false)
    .search(&["name"])
    .build()
});

impl Resource for Studio {
    type Id = i64;
    const KIND: &'static str = "Studio";

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
        &STUDIO_SCHEMA
    }
}

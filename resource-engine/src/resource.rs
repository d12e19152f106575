//! Resource contract and static field schemas
//!
//! Every stored entity implements [`Resource`]: a stable identity plus a unique,
//! human-readable slug. Each resource type also declares a [`Schema`], a static
//! table of named fields with typed accessors. Filters, sorts and includes are
//! resolved against this table, so an unknown field name is reported when the
//! query text is parsed instead of silently matching nothing.
//!
//! # Example
//!
//! ```rust
//! use once_cell::sync::Lazy;
//! use resource_engine::resource::{Field, FieldKind, Resource, Schema, Value};
//!
//! #[derive(Debug, Clone)]
//! struct Tag {
//!     id: i64,
//!     slug: String,
//! }
//!
//! static TAG_SCHEMA: Lazy<Schema<Tag>> = Lazy::new(|| {
//!     Schema::builder(
//!         Field::new("id", "id", FieldKind::Int, |t: &Tag| Value::Int(t.id)),
//!         Field::new("slug", "slug", FieldKind::Text, |t: &Tag| Value::from(t.slug.as_str())),
//!     )
//!     .build()
//! });
//!
//! impl Resource for Tag {
//!     type Id = i64;
//!     const KIND: &'static str = "Tag";
//!
//!     fn id(&self) -> i64 { self.id }
//!     fn slug(&self) -> &str { &self.slug }
//!     fn set_id(&mut self, id: i64) { self.id = id; }
//!     fn schema() -> &'static Schema<Self> { &TAG_SCHEMA }
//! }
//!
//! assert!(Tag::schema().field("SLUG").is_some());
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// Identity type of a resource
///
/// Implemented for monotonic integers (`i64`) and UUIDs. An "unassigned" id
/// (`0` or the nil UUID) asks the store to allocate one on insert.
pub trait ResourceId:
    Copy
    + fmt::Debug
    + fmt::Display
    + Eq
    + Ord
    + Hash
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + 'static
{
    /// Whether this id still needs to be allocated by the store
    fn is_unassigned(&self) -> bool;

    /// Allocate the id following `last`, the greatest id the store ever held
    ///
    /// Returns `None` when the id space is exhausted.
    fn allocate(last: Option<&Self>) -> Option<Self>;

    /// Parse an id from its textual form, `None` when the text is not an id
    fn parse_id(text: &str) -> Option<Self>;

    /// Convert into a filter value
    fn to_value(&self) -> Value;
}

impl ResourceId for i64 {
    fn is_unassigned(&self) -> bool {
        *self == 0
    }

    fn allocate(last: Option<&Self>) -> Option<Self> {
        last.map_or(Some(1), |last| (*last).max(0).checked_add(1))
    }

    fn parse_id(text: &str) -> Option<Self> {
        text.parse().ok()
    }

    fn to_value(&self) -> Value {
        Value::Int(*self)
    }
}

impl ResourceId for Uuid {
    fn is_unassigned(&self) -> bool {
        self.is_nil()
    }

    fn allocate(_last: Option<&Self>) -> Option<Self> {
        Some(Uuid::now_v7())
    }

    fn parse_id(text: &str) -> Option<Self> {
        Uuid::parse_str(text).ok()
    }

    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }
}

/// Contract satisfied by every stored entity
///
/// The slug is unique per concrete type and the id never changes once the
/// store assigned it.
pub trait Resource: Clone + fmt::Debug + Send + Sync + 'static {
    /// Identity type
    type Id: ResourceId;

    /// Type name used in error messages and logs
    const KIND: &'static str;

    /// Stable identity
    fn id(&self) -> Self::Id;

    /// Unique human-readable identifier
    fn slug(&self) -> &str;

    /// Assign the identity (stores call this on insert)
    fn set_id(&mut self, id: Self::Id);

    /// Static field registry of this type
    fn schema() -> &'static Schema<Self>;
}

/// Dynamically typed field value
///
/// Used both as the right-hand side of filter comparisons and as the result of
/// field accessors.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Uuid(Uuid),
    List(Vec<Value>),
}

impl Value {
    /// Returns `true` for [`Value::Null`]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the text content, if any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Three-valued comparison
    ///
    /// Returns `None` when either side is null or when the two values have
    /// unrelated types. Integers and floats compare numerically.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => Some(a.total_cmp(b)),
            (Value::Int(a), Value::Float(b)) => Some((*a as f64).total_cmp(b)),
            (Value::Float(a), Value::Int(b)) => Some(a.total_cmp(&(*b as f64))),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        other => return Some(other),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    /// Total ordering used for sorting
    ///
    /// Null sorts after every other value; values of unrelated types are
    /// ordered by their variant.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self
                .compare(other)
                .unwrap_or_else(|| self.rank().cmp(&other.rank())),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
            Value::Date(_) => 4,
            Value::Uuid(_) => 5,
            Value::List(_) => 6,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "\"{}\"", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Uuid(u) => write!(f, "{}", u),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Date(d) => d.serialize(serializer),
            Value::Uuid(u) => u.serialize(serializer),
            Value::List(items) => items.serialize(serializer),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Uuid(value)
    }
}

impl<V: Into<Value>> From<Option<V>> for Value {
    fn from(value: Option<V>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(value: Vec<V>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

/// Declared type of a field, used to type filter literals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Float,
    Bool,
    Text,
    Date,
    Uuid,
    /// Text restricted to a fixed set of variants (matched case-insensitively)
    Enum(&'static [&'static str]),
    /// Collection of text values, queried with `has`
    TextList,
    /// Collection of integers, queried with `has`
    IntList,
}

impl FieldKind {
    /// Whether the field holds a collection
    pub fn is_list(&self) -> bool {
        matches!(self, FieldKind::TextList | FieldKind::IntList)
    }

    /// Kind of the elements of a collection field
    pub fn element(&self) -> FieldKind {
        match self {
            FieldKind::TextList => FieldKind::Text,
            FieldKind::IntList => FieldKind::Int,
            other => *other,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Int => write!(f, "integer"),
            FieldKind::Float => write!(f, "number"),
            FieldKind::Bool => write!(f, "boolean"),
            FieldKind::Text => write!(f, "text"),
            FieldKind::Date => write!(f, "date"),
            FieldKind::Uuid => write!(f, "uuid"),
            FieldKind::Enum(variants) => write!(f, "one of {}", variants.join("|")),
            FieldKind::TextList => write!(f, "text list"),
            FieldKind::IntList => write!(f, "integer list"),
        }
    }
}

/// A named, typed accessor on `T`
pub struct Field<T> {
    /// Public (camelCase) name used in query strings
    pub name: &'static str,
    /// Storage column name
    pub column: &'static str,
    /// Declared type
    pub kind: FieldKind,
    /// Whether the field may be null
    pub nullable: bool,
    /// Accessor
    pub get: fn(&T) -> Value,
}

impl<T> Field<T> {
    /// Declare a non-nullable field
    pub fn new(
        name: &'static str,
        column: &'static str,
        kind: FieldKind,
        get: fn(&T) -> Value,
    ) -> Self {
        Self {
            name,
            column,
            kind,
            nullable: false,
            get,
        }
    }

    /// Mark the field as nullable
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Read this field from `item`
    pub fn value(&self, item: &T) -> Value {
        (self.get)(item)
    }
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Field<T> {}

impl<T> PartialEq for Field<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("nullable", &self.nullable)
            .finish()
    }
}

/// An editable relation of `T`
///
/// Slots drive the relation-reset policy of `edit`: when a slot is unset on
/// the incoming changes and the caller asked for a partial edit, the current
/// value is carried over.
pub struct RelationSlot<T> {
    pub name: &'static str,
    /// Whether `changes` explicitly carries this relation
    pub is_set: fn(&T) -> bool,
    /// Copy the relation from the first argument into the second
    pub carry: fn(&T, &mut T),
}

impl<T> Clone for RelationSlot<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for RelationSlot<T> {}

impl<T> fmt::Debug for RelationSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationSlot").field("name", &self.name).finish()
    }
}

/// Static per-type registry of fields, relations, default sort and search fields
pub struct Schema<T> {
    id: Field<T>,
    slug: Field<T>,
    fields: Vec<Field<T>>,
    relations: Vec<RelationSlot<T>>,
    default_sort: Vec<(Field<T>, bool)>,
    search: Vec<Field<T>>,
}

impl<T> Schema<T> {
    /// Start a schema from its identity fields
    pub fn builder(id: Field<T>, slug: Field<T>) -> SchemaBuilder<T> {
        SchemaBuilder {
            schema: Schema {
                id,
                slug,
                fields: vec![id, slug],
                relations: Vec::new(),
                default_sort: Vec::new(),
                search: Vec::new(),
            },
            default_sort: Vec::new(),
            search: Vec::new(),
        }
    }

    /// The id field
    pub fn id_field(&self) -> Field<T> {
        self.id
    }

    /// The slug field
    pub fn slug_field(&self) -> Field<T> {
        self.slug
    }

    /// Resolve a field by name, ignoring case
    pub fn field(&self, name: &str) -> Option<Field<T>> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .copied()
    }

    /// All declared fields
    pub fn fields(&self) -> &[Field<T>] {
        &self.fields
    }

    /// Editable relations
    pub fn relations(&self) -> &[RelationSlot<T>] {
        &self.relations
    }

    /// Default ordering as `(field, descending)` pairs
    pub fn default_sort(&self) -> &[(Field<T>, bool)] {
        &self.default_sort
    }

    /// Fields matched by free-text search
    pub fn search_fields(&self) -> Vec<Field<T>> {
        self.search.clone()
    }
}

impl<T> fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("fields", &self.fields)
            .field("relations", &self.relations)
            .field("default_sort", &self.default_sort)
            .finish()
    }
}

/// Builder for [`Schema`]
pub struct SchemaBuilder<T> {
    schema: Schema<T>,
    default_sort: Vec<(&'static str, bool)>,
    search: Vec<&'static str>,
}

impl<T> SchemaBuilder<T> {
    /// Declare an additional field
    #[must_use]
    pub fn field(mut self, field: Field<T>) -> Self {
        self.schema.fields.push(field);
        self
    }

    /// Declare an editable relation
    #[must_use]
    pub fn relation(
        mut self,
        name: &'static str,
        is_set: fn(&T) -> bool,
        carry: fn(&T, &mut T),
    ) -> Self {
        self.schema.relations.push(RelationSlot {
            name,
            is_set,
            carry,
        });
        self
    }

    /// Append a key to the default ordering
    #[must_use]
    pub fn default_sort(mut self, field: &'static str, descending: bool) -> Self {
        self.default_sort.push((field, descending));
        self
    }

    /// Declare the fields searched by free-text search
    #[must_use]
    pub fn search(mut self, fields: &[&'static str]) -> Self {
        self.search.extend_from_slice(fields);
        self
    }

    /// Finish the schema
    ///
    /// Falls back to ordering by slug when no default sort was declared.
    ///
    /// # Panics
    ///
    /// Panics if a default-sort or search name is not a declared field.
    pub fn build(self) -> Schema<T> {
        let Self {
            mut schema,
            default_sort,
            search,
        } = self;
        let resolve = |schema: &Schema<T>, name: &str| match schema.field(name) {
            Some(field) => field,
            None => panic!("`{name}` is not a declared field of this schema"),
        };

        schema.default_sort = default_sort
            .iter()
            .map(|(name, descending)| (resolve(&schema, name), *descending))
            .collect();
        if schema.default_sort.is_empty() {
            schema.default_sort.push((schema.slug, false));
        }
        schema.search = search.iter().map(|name| resolve(&schema, name)).collect();
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i64_id_allocation() {
        assert!(0_i64.is_unassigned());
        assert_eq!(i64::allocate(None), Some(1));
        assert_eq!(i64::allocate(Some(&41)), Some(42));
        assert_eq!(i64::allocate(Some(&-3)), Some(1));
        assert_eq!(i64::allocate(Some(&i64::MAX)), None);
        assert_eq!(i64::parse_id("12"), Some(12));
        assert_eq!(i64::parse_id("twelve"), None);
    }

    #[derive(Debug, Clone)]
    struct Tag {
        id: i64,
        slug: String,
    }

    fn tag_builder() -> SchemaBuilder<Tag> {
        Schema::builder(
            Field::new("id", "id", FieldKind::Int, |t: &Tag| Value::Int(t.id)),
            Field::new("slug", "slug", FieldKind::Text, |t: &Tag| {
                Value::from(t.slug.as_str())
            }),
        )
    }

    #[test]
    fn test_schema_resolves_sort_and_search_names() {
        let schema = tag_builder().default_sort("ID", true).search(&["slug"]).build();
        assert_eq!(schema.default_sort()[0].0.name, "id");
        assert!(schema.default_sort()[0].1);
        assert_eq!(schema.search_fields()[0].name, "slug");

        let fallback = tag_builder().build();
        assert_eq!(fallback.default_sort()[0].0.name, "slug");
    }

    #[test]
    #[should_panic(expected = "`title` is not a declared field")]
    fn test_schema_rejects_unknown_default_sort() {
        let _ = tag_builder().default_sort("title", false).build();
    }

    #[test]
    #[should_panic(expected = "`name` is not a declared field")]
    fn test_schema_rejects_unknown_search_field() {
        let _ = tag_builder().search(&["name"]).build();
    }

    #[test]
    fn test_uuid_id_allocation() {
        assert!(Uuid::nil().is_unassigned());
        let id = Uuid::allocate(None).unwrap();
        assert!(!id.is_unassigned());
        assert_eq!(Uuid::parse_id(&id.to_string()), Some(id));
    }

    #[test]
    fn test_value_compare_is_three_valued() {
        assert_eq!(Value::Int(1).compare(&Value::Int(2)), Some(Ordering::Less));
        assert_eq!(Value::Int(2).compare(&Value::Float(1.5)), Some(Ordering::Greater));
        assert_eq!(Value::Null.compare(&Value::Int(2)), None);
        assert_eq!(Value::from("a").compare(&Value::Int(2)), None);
    }

    #[test]
    fn test_value_total_cmp_puts_null_last() {
        let mut values = vec![Value::Null, Value::Int(3), Value::Int(1)];
        values.sort_by(Value::total_cmp);
        assert_eq!(values, vec![Value::Int(1), Value::Int(3), Value::Null]);
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(3_i64)), Value::Int(3));
        assert_eq!(
            Value::from(vec!["a", "b"]),
            Value::List(vec![Value::from("a"), Value::from("b")])
        );
    }

    #[test]
    fn test_value_serializes_untagged() {
        let value = Value::List(vec![Value::Int(1), Value::Null, Value::from("x")]);
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"[1,null,"x"]"#);
    }

    #[test]
    fn test_field_kind_elements() {
        assert!(FieldKind::TextList.is_list());
        assert_eq!(FieldKind::IntList.element(), FieldKind::Int);
        assert_eq!(FieldKind::Date.element(), FieldKind::Date);
    }
}

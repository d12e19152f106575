//! Boolean filter trees over resource fields
//!
//! A [`Filter`] is an immutable, storage-agnostic predicate tree. Leaves hold a
//! resolved [`Field`] of the resource type and a typed comparison value, so a
//! filter can only be built against fields the type actually declares. Stores
//! compile the tree into whatever native form they need; the in-memory
//! evaluation in [`Filter::matches`] is the reference semantics.
//!
//! # Example
//!
//! ```rust,ignore
//! use resource_engine::query::Filter;
//!
//! // Caller-supplied text, parsed against the Show schema
//! let user = Filter::<Show>::parse("status eq airing and not (rating lt 5.5)")?;
//!
//! // Structural constraint the caller can not override
//! let structural = Filter::lambda(|show: &Show| show.studio_id.is_some());
//!
//! let combined = Filter::and([Some(structural), Some(user)]);
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::error::QueryError;
use super::parser;
use super::sort::random_key;
use crate::resource::{Field, Resource, ResourceId, Value};

/// Opaque in-memory predicate
pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Comparison operator of a filter leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CmpOp {
    /// Keyword form used in filter text
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Le => "le",
        }
    }

    /// SQL operator
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }

    /// Parse either the keyword or the symbolic form
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "eq" | "=" | "==" => Some(Self::Eq),
            "ne" | "!=" => Some(Self::Ne),
            "gt" | ">" => Some(Self::Gt),
            "ge" | ">=" => Some(Self::Ge),
            "lt" | "<" => Some(Self::Lt),
            "le" | "<=" => Some(Self::Le),
            _ => None,
        }
    }

    /// Whether a comparison result satisfies this operator
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicate tree over the fields of `T`
pub enum Filter<T: Resource> {
    And(Box<Filter<T>>, Box<Filter<T>>),
    Or(Box<Filter<T>>, Box<Filter<T>>),
    Not(Box<Filter<T>>),
    /// Equality; comparing with [`Value::Null`] means "is null"
    Eq(Field<T>, Value),
    /// Inequality; comparing with [`Value::Null`] means "is not null"
    Ne(Field<T>, Value),
    Gt(Field<T>, Value),
    Ge(Field<T>, Value),
    Lt(Field<T>, Value),
    Le(Field<T>, Value),
    /// Membership of a value in a collection field
    Has(Field<T>, Value),
    /// Field value is one of the listed literals
    In(Field<T>, Vec<Value>),
    /// Case-insensitive substring match on any of the fields
    Contains(Vec<Field<T>>, String),
    /// Comparison in a seeded random order, relative to the row `pivot`
    Random { seed: u64, op: CmpOp, pivot: T::Id },
    /// Arbitrary in-memory predicate
    Lambda(Predicate<T>),
}

impl<T: Resource> Clone for Filter<T> {
    fn clone(&self) -> Self {
        match self {
            Self::And(a, b) => Self::And(a.clone(), b.clone()),
            Self::Or(a, b) => Self::Or(a.clone(), b.clone()),
            Self::Not(a) => Self::Not(a.clone()),
            Self::Eq(f, v) => Self::Eq(*f, v.clone()),
            Self::Ne(f, v) => Self::Ne(*f, v.clone()),
            Self::Gt(f, v) => Self::Gt(*f, v.clone()),
            Self::Ge(f, v) => Self::Ge(*f, v.clone()),
            Self::Lt(f, v) => Self::Lt(*f, v.clone()),
            Self::Le(f, v) => Self::Le(*f, v.clone()),
            Self::Has(f, v) => Self::Has(*f, v.clone()),
            Self::In(f, v) => Self::In(*f, v.clone()),
            Self::Contains(f, s) => Self::Contains(f.clone(), s.clone()),
            Self::Random { seed, op, pivot } => Self::Random {
                seed: *seed,
                op: *op,
                pivot: *pivot,
            },
            Self::Lambda(p) => Self::Lambda(Arc::clone(p)),
        }
    }
}

impl<T: Resource> Filter<T> {
    /// Parse filter text against the schema of `T`
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownField`] for undeclared fields,
    /// [`QueryError::InvalidValue`] for literals that do not fit the field and
    /// [`QueryError::Syntax`] for malformed text.
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        parser::parse(input)
    }

    /// Parse optional filter text; blank input means "no filter"
    pub fn from_query(input: Option<&str>) -> Result<Option<Self>, QueryError> {
        match input.map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => Self::parse(text).map(Some),
        }
    }

    /// Build a comparison leaf from an operator
    pub fn compare(field: Field<T>, op: CmpOp, value: impl Into<Value>) -> Self {
        let value = value.into();
        match op {
            CmpOp::Eq => Self::Eq(field, value),
            CmpOp::Ne => Self::Ne(field, value),
            CmpOp::Gt => Self::Gt(field, value),
            CmpOp::Ge => Self::Ge(field, value),
            CmpOp::Lt => Self::Lt(field, value),
            CmpOp::Le => Self::Le(field, value),
        }
    }

    /// Wrap an in-memory predicate
    pub fn lambda(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self::Lambda(Arc::new(predicate))
    }

    /// Case-insensitive search over `fields`
    pub fn contains(fields: Vec<Field<T>>, needle: impl Into<String>) -> Self {
        Self::Contains(fields, needle.into())
    }

    /// Fold optional filters with `And`, skipping the missing ones
    ///
    /// Returns `None` when every input is `None`.
    pub fn and<I>(filters: I) -> Option<Self>
    where
        I: IntoIterator<Item = Option<Self>>,
    {
        filters
            .into_iter()
            .flatten()
            .reduce(|acc, next| Self::And(Box::new(acc), Box::new(next)))
    }

    /// Fold optional filters with `Or`, skipping the missing ones
    pub fn or<I>(filters: I) -> Option<Self>
    where
        I: IntoIterator<Item = Option<Self>>,
    {
        filters
            .into_iter()
            .flatten()
            .reduce(|acc, next| Self::Or(Box::new(acc), Box::new(next)))
    }

    /// Logical negation
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// The field, operator and value of a comparison leaf
    pub fn comparison(&self) -> Option<(Field<T>, CmpOp, &Value)> {
        match self {
            Self::Eq(f, v) => Some((*f, CmpOp::Eq, v)),
            Self::Ne(f, v) => Some((*f, CmpOp::Ne, v)),
            Self::Gt(f, v) => Some((*f, CmpOp::Gt, v)),
            Self::Ge(f, v) => Some((*f, CmpOp::Ge, v)),
            Self::Lt(f, v) => Some((*f, CmpOp::Lt, v)),
            Self::Le(f, v) => Some((*f, CmpOp::Le, v)),
            _ => None,
        }
    }

    /// Whether the tree contains an opaque predicate
    pub fn has_lambda(&self) -> bool {
        match self {
            Self::Lambda(_) => true,
            Self::And(a, b) | Self::Or(a, b) => a.has_lambda() || b.has_lambda(),
            Self::Not(a) => a.has_lambda(),
            _ => false,
        }
    }

    /// Evaluate the filter against one row
    ///
    /// A row matches only when the filter is definitely true. Comparisons
    /// involving null are unknown rather than false, and `not` keeps unknown
    /// unknown, so a row matches here exactly when the compiled SQL selects it.
    pub fn matches(&self, item: &T) -> bool {
        self.eval(item) == Some(true)
    }

    /// Three-valued evaluation, `None` standing for SQL's unknown
    fn eval(&self, item: &T) -> Option<bool> {
        match self {
            Self::And(a, b) => match (a.eval(item), b.eval(item)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Self::Or(a, b) => match (a.eval(item), b.eval(item)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            Self::Not(a) => a.eval(item).map(|holds| !holds),
            Self::Eq(field, Value::Null) => Some(field.value(item).is_null()),
            Self::Ne(field, Value::Null) => Some(!field.value(item).is_null()),
            Self::Has(field, needle) => match field.value(item) {
                Value::List(values) => Some(
                    values
                        .iter()
                        .any(|v| v.compare(needle) == Some(Ordering::Equal)),
                ),
                _ => None,
            },
            Self::In(field, values) => {
                let value = field.value(item);
                let mut unknown = false;
                for candidate in values {
                    match value.compare(candidate) {
                        Some(Ordering::Equal) => return Some(true),
                        Some(_) => {}
                        None => unknown = true,
                    }
                }
                if unknown {
                    None
                } else {
                    Some(false)
                }
            }
            Self::Contains(fields, needle) => {
                let needle = needle.to_lowercase();
                let mut unknown = false;
                for field in fields {
                    match field.value(item) {
                        Value::Text(text) if text.to_lowercase().contains(&needle) => {
                            return Some(true)
                        }
                        Value::Null => unknown = true,
                        _ => {}
                    }
                }
                if unknown {
                    None
                } else {
                    Some(false)
                }
            }
            Self::Random { seed, op, pivot } => Some(
                op.holds(random_key(*seed, &item.id()).cmp(&random_key(*seed, pivot))),
            ),
            Self::Lambda(predicate) => Some(predicate(item)),
            leaf => {
                let (field, op, value) = leaf.comparison()?;
                field
                    .value(item)
                    .compare(value)
                    .map(|ordering| op.holds(ordering))
            }
        }
    }
}

impl<T: Resource> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Filter({})", self)
    }
}

impl<T: Resource> fmt::Display for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(a, b) => write!(f, "({} and {})", a, b),
            Self::Or(a, b) => write!(f, "({} or {})", a, b),
            Self::Not(a) => write!(f, "not {}", a),
            Self::Has(field, value) => write!(f, "{} has {}", field.name, value),
            Self::In(field, values) => {
                write!(f, "{} in {}", field.name, Value::List(values.clone()))
            }
            Self::Contains(fields, needle) => {
                let names: Vec<&str> = fields.iter().map(|field| field.name).collect();
                write!(f, "search({}, \"{}\")", names.join("|"), needle)
            }
            Self::Random { seed, op, pivot } => write!(f, "random({}) {} {}", seed, op, pivot),
            Self::Lambda(_) => write!(f, "<predicate>"),
            leaf => match leaf.comparison() {
                Some((field, op, value)) => write!(f, "{} {} {}", field.name, op, value),
                None => Ok(()),
            },
        }
    }
}

/// Equality filter on the id of `T`
pub fn id_eq<T: Resource>(id: &T::Id) -> Filter<T> {
    Filter::Eq(T::schema().id_field(), id.to_value())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::resource::{FieldKind, Schema};
    use once_cell::sync::Lazy;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct Book {
        pub id: i64,
        pub slug: String,
        pub title: String,
        pub pages: Option<i64>,
        pub tags: Vec<String>,
    }

    static BOOK_SCHEMA: Lazy<Schema<Book>> = Lazy::new(|| {
        Schema::builder(
            Field::new("id", "id", FieldKind::Int, |b: &Book| Value::Int(b.id)),
            Field::new("slug", "slug", FieldKind::Text, |b: &Book| {
                Value::from(b.slug.as_str())
            }),
        )
        .field(Field::new("title", "title", FieldKind::Text, |b: &Book| {
            Value::from(b.title.as_str())
        }))
        .field(
            Field::new("pages", "pages", FieldKind::Int, |b: &Book| Value::from(b.pages))
                .nullable(),
        )
        .field(Field::new("tags", "tags", FieldKind::TextList, |b: &Book| {
            Value::from(b.tags.clone())
        }))
        .default_sort("title", false)
        .search(&["title"])
        .build()
    });

    impl Resource for Book {
        type Id = i64;
        const KIND: &'static str = "Book";

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
            &BOOK_SCHEMA
        }
    }

    pub(crate) fn book(id: i64, title: &str, pages: Option<i64>) -> Book {
        Book {
            id,
            slug: format!("book-{}", id),
            title: title.to_string(),
            pages,
            tags: Vec::new(),
        }
    }

    fn field(name: &str) -> Field<Book> {
        Book::schema().field(name).unwrap()
    }

    #[test]
    fn test_and_folds_optional_filters() {
        assert!(Filter::<Book>::and([None, None]).is_none());

        let only = Filter::and([None, Some(Filter::Eq(field("id"), Value::Int(1)))]).unwrap();
        assert!(matches!(only, Filter::Eq(_, _)));

        let both = Filter::and([
            Some(Filter::Gt(field("id"), Value::Int(1))),
            None,
            Some(Filter::Lt(field("id"), Value::Int(3))),
        ])
        .unwrap();
        assert!(both.matches(&book(2, "b", None)));
        assert!(!both.matches(&book(3, "c", None)));
    }

    #[test]
    fn test_or_folds_optional_filters() {
        let either = Filter::or([
            Some(Filter::Eq(field("id"), Value::Int(1))),
            Some(Filter::Eq(field("id"), Value::Int(3))),
        ])
        .unwrap();
        assert!(either.matches(&book(1, "a", None)));
        assert!(!either.matches(&book(2, "b", None)));
    }

    #[test]
    fn test_null_equality_means_is_null() {
        let is_null = Filter::Eq(field("pages"), Value::Null);
        let not_null = Filter::Ne(field("pages"), Value::Null);
        assert!(is_null.matches(&book(1, "a", None)));
        assert!(!is_null.matches(&book(1, "a", Some(10))));
        assert!(not_null.matches(&book(1, "a", Some(10))));
    }

    #[test]
    fn test_ordered_comparison_with_null_is_false() {
        let gt = Filter::Gt(field("pages"), Value::Int(5));
        assert!(!gt.matches(&book(1, "a", None)));
        assert!(!gt.clone().negate().negate().matches(&book(1, "a", None)));
        assert!(gt.matches(&book(1, "a", Some(6))));
    }

    #[test]
    fn test_not_over_null_stays_unknown() {
        let untitled = book(1, "a", None);
        let not_long = Filter::Gt(field("pages"), Value::Int(5)).negate();
        assert!(!not_long.matches(&untitled));
        assert!(not_long.matches(&book(2, "b", Some(3))));

        // unknown or true is true, unknown and false is false
        let either = Filter::or([
            Some(not_long.clone()),
            Some(Filter::Eq(field("id"), Value::Int(1))),
        ])
        .unwrap();
        assert!(either.matches(&untitled));
        let both = Filter::and([
            Some(Filter::Eq(field("id"), Value::Int(9))),
            Some(not_long.clone()),
        ])
        .unwrap()
        .negate();
        assert!(both.matches(&untitled));

        let outside = Filter::In(field("pages"), vec![Value::Int(1)]).negate();
        assert!(!outside.matches(&untitled));
        assert!(outside.matches(&book(3, "c", Some(2))));
    }

    #[test]
    fn test_has_and_in() {
        let mut tagged = book(1, "a", None);
        tagged.tags = vec!["drama".to_string(), "comedy".to_string()];

        assert!(Filter::Has(field("tags"), Value::from("drama")).matches(&tagged));
        assert!(!Filter::Has(field("tags"), Value::from("horror")).matches(&tagged));

        let within = Filter::In(field("id"), vec![Value::Int(1), Value::Int(4)]);
        assert!(within.matches(&tagged));
        assert!(!within.matches(&book(2, "b", None)));
    }

    #[test]
    fn test_contains_ignores_case() {
        let search = Filter::contains(vec![field("title")], "RING");
        assert!(search.matches(&book(1, "The Lord of the Rings", None)));
        assert!(!search.matches(&book(2, "Dune", None)));
    }

    #[test]
    fn test_lambda_and_display() {
        let short = Filter::lambda(|b: &Book| b.pages.unwrap_or(0) < 100);
        assert!(short.has_lambda());
        assert!(short.matches(&book(1, "a", Some(50))));

        let text = Filter::and([
            Some(Filter::Eq(field("title"), Value::from("x"))),
            Some(Filter::Le(field("pages"), Value::Int(3)).negate()),
        ])
        .unwrap()
        .to_string();
        assert_eq!(text, "(title eq \"x\" and not pages le 3)");
    }

    #[test]
    fn test_cmp_op_parse_accepts_both_forms() {
        assert_eq!(CmpOp::parse("GE"), Some(CmpOp::Ge));
        assert_eq!(CmpOp::parse(">="), Some(CmpOp::Ge));
        assert_eq!(CmpOp::parse("!="), Some(CmpOp::Ne));
        assert_eq!(CmpOp::parse("like"), None);
    }
}

//! Sort specifications and compiled orderings
//!
//! [`Sort`] is what callers write (`"name"`, `"airDate:desc,name"`,
//! `"random:42"`). [`OrderBy`] is what stores execute: a flat list of keys that
//! always ends with the id, which makes the ordering total and keyset
//! pagination deterministic even when sort keys repeat.

use std::cmp::Ordering;
use std::fmt;

use uuid::Uuid;

use super::error::QueryError;
use crate::resource::{Field, Resource, Value};

/// Caller-facing sort specification
pub enum Sort<T: Resource> {
    /// The ordering declared by the resource schema
    Default,
    /// A single field
    By { field: Field<T>, descending: bool },
    /// Several sorts applied left to right as tie-breakers
    Conglomerate(Vec<Sort<T>>),
    /// A stable pseudo-random order derived from `seed`
    Random { seed: u64 },
}

impl<T: Resource> Clone for Sort<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Default => Self::Default,
            Self::By { field, descending } => Self::By {
                field: *field,
                descending: *descending,
            },
            Self::Conglomerate(sorts) => Self::Conglomerate(sorts.clone()),
            Self::Random { seed } => Self::Random { seed: *seed },
        }
    }
}

impl<T: Resource> PartialEq for Sort<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Default, Self::Default) => true,
            (
                Self::By { field, descending },
                Self::By {
                    field: other_field,
                    descending: other_descending,
                },
            ) => field == other_field && descending == other_descending,
            (Self::Conglomerate(a), Self::Conglomerate(b)) => a == b,
            (Self::Random { seed }, Self::Random { seed: other }) => seed == other,
            _ => false,
        }
    }
}

impl<T: Resource> Default for Sort<T> {
    fn default() -> Self {
        Self::Default
    }
}

impl<T: Resource> Sort<T> {
    /// Ascending sort on a field
    pub fn by(field: Field<T>) -> Self {
        Self::By {
            field,
            descending: false,
        }
    }

    /// Descending sort on a field
    pub fn by_desc(field: Field<T>) -> Self {
        Self::By {
            field,
            descending: true,
        }
    }

    /// Random order with a fresh seed
    pub fn random() -> Self {
        Self::Random {
            seed: fresh_seed(),
        }
    }

    /// Parse a sort specification
    ///
    /// Accepts `key`, `key:asc`, `key:desc`, comma-separated lists of those,
    /// `default` (or nothing) and `random[:seed]`.
    ///
    /// # Errors
    ///
    /// An unknown key yields [`QueryError::UnknownField`]; a bad direction or
    /// seed yields [`QueryError::InvalidSort`] naming the offending token.
    pub fn parse(input: Option<&str>) -> Result<Self, QueryError> {
        let text = match input.map(str::trim) {
            None | Some("") => return Ok(Self::Default),
            Some(text) => text,
        };

        if text.contains(',') {
            let sorts = text
                .split(',')
                .map(|part| Self::parse_single(part.trim()))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self::Conglomerate(sorts));
        }
        Self::parse_single(text)
    }

    fn parse_single(token: &str) -> Result<Self, QueryError> {
        if token.is_empty() {
            return Err(QueryError::InvalidSort {
                token: token.to_string(),
                reason: "empty sort key".to_string(),
            });
        }
        if token.eq_ignore_ascii_case("default") {
            return Ok(Self::Default);
        }
        if token.eq_ignore_ascii_case("random") {
            return Ok(Self::random());
        }

        let (key, order) = match token.split_once(':') {
            Some((key, order)) => (key, Some(order)),
            None => (token, None),
        };

        if key.eq_ignore_ascii_case("random") {
            let seed = order
                .and_then(|seed| seed.parse::<u64>().ok())
                .ok_or_else(|| QueryError::InvalidSort {
                    token: token.to_string(),
                    reason: "invalid random seed".to_string(),
                })?;
            return Ok(Self::Random { seed });
        }

        let descending = match order.map(str::to_ascii_lowercase).as_deref() {
            None | Some("asc") => false,
            Some("desc") => true,
            Some(other) => {
                return Err(QueryError::InvalidSort {
                    token: token.to_string(),
                    reason: format!(
                        "the sort order, if set, should be :asc or :desc but it was :{}",
                        other
                    ),
                })
            }
        };

        let field = T::schema()
            .field(key)
            .ok_or_else(|| QueryError::UnknownField {
                kind: T::KIND,
                field: key.to_string(),
            })?;
        Ok(Self::By { field, descending })
    }

    /// Flatten into executable keys, appending the id tie-break
    ///
    /// The id key follows the direction of the primary key.
    pub fn compile(&self) -> OrderBy<T> {
        let mut keys = Vec::new();
        self.flatten_into(&mut keys);
        let descending = keys.first().is_some_and(|k| k.descending);
        keys.push(SortKey {
            target: SortTarget::Field(T::schema().id_field()),
            descending,
            nulls_first: false,
        });
        OrderBy { keys }
    }

    fn flatten_into(&self, keys: &mut Vec<SortKey<T>>) {
        match self {
            Self::Default => {
                keys.extend(T::schema().default_sort().iter().map(|(field, descending)| {
                    SortKey {
                        target: SortTarget::Field(*field),
                        descending: *descending,
                        nulls_first: false,
                    }
                }));
            }
            Self::By { field, descending } => keys.push(SortKey {
                target: SortTarget::Field(*field),
                descending: *descending,
                nulls_first: false,
            }),
            Self::Conglomerate(sorts) => {
                for sort in sorts {
                    sort.flatten_into(keys);
                }
            }
            Self::Random { seed } => keys.push(SortKey {
                target: SortTarget::Random(*seed),
                descending: false,
                nulls_first: false,
            }),
        }
    }
}

impl<T: Resource> fmt::Debug for Sort<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sort({})", self)
    }
}

impl<T: Resource> fmt::Display for Sort<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::By {
                field,
                descending: true,
            } => write!(f, "{}:desc", field.name),
            Self::By { field, .. } => write!(f, "{}", field.name),
            Self::Conglomerate(sorts) => {
                for (i, sort) in sorts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", sort)?;
                }
                Ok(())
            }
            Self::Random { seed } => write!(f, "random:{}", seed),
        }
    }
}

/// What a sort key orders by
pub enum SortTarget<T> {
    Field(Field<T>),
    /// Seeded hash of the id
    Random(u64),
}

impl<T> Clone for SortTarget<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SortTarget<T> {}

impl<T> fmt::Debug for SortTarget<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(field) => write!(f, "{}", field.name),
            Self::Random(seed) => write!(f, "random({})", seed),
        }
    }
}

/// One key of a compiled ordering
#[derive(Debug)]
pub struct SortKey<T> {
    pub target: SortTarget<T>,
    pub descending: bool,
    /// Nulls sort last unless this is set (only inverted orders set it)
    pub nulls_first: bool,
}

impl<T> Clone for SortKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SortKey<T> {}

impl<T: Resource> SortKey<T> {
    /// The same key traversed in the opposite direction
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            target: self.target,
            descending: !self.descending,
            nulls_first: !self.nulls_first,
        }
    }

    /// Order two rows by this key alone
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        match self.target {
            SortTarget::Field(field) => {
                compare_values(&field.value(a), &field.value(b), self.descending, self.nulls_first)
            }
            SortTarget::Random(seed) => {
                let ordering = random_key(seed, &a.id()).cmp(&random_key(seed, &b.id()));
                if self.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
        }
    }
}

fn compare_values(a: &Value, b: &Value, descending: bool, nulls_first: bool) -> Ordering {
    let nulls = if nulls_first {
        Ordering::Less
    } else {
        Ordering::Greater
    };
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => nulls,
        (false, true) => nulls.reverse(),
        (false, false) if descending => a.total_cmp(b).reverse(),
        (false, false) => a.total_cmp(b),
    }
}

/// Compiled, total ordering
#[derive(Debug)]
pub struct OrderBy<T> {
    keys: Vec<SortKey<T>>,
}

impl<T> Clone for OrderBy<T> {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
        }
    }
}

impl<T: Resource> OrderBy<T> {
    /// Keys in priority order; the last one is always the id
    pub fn keys(&self) -> &[SortKey<T>] {
        &self.keys
    }

    /// The exact reverse of this ordering
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            keys: self.keys.iter().map(SortKey::inverted).collect(),
        }
    }

    /// Compare two rows
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        self.keys
            .iter()
            .map(|key| key.compare(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Sort rows in place
    pub fn sort(&self, items: &mut [T]) {
        items.sort_by(|a, b| self.compare(a, b));
    }
}

/// Position of `id` in the random order generated by `seed`
pub fn random_key<Id: fmt::Display>(seed: u64, id: &Id) -> [u8; 32] {
    *blake3::hash(format!("{}{}", seed, id).as_bytes()).as_bytes()
}

fn fresh_seed() -> u64 {
    Uuid::new_v4().as_u64_pair().0
}

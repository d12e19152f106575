//! Keyset (cursor) pagination
//!
//! Pages resume from the last row a caller has seen instead of from a numeric
//! offset, which keeps paging correct while rows are inserted or deleted.
//!
//! Both directions share one primitive, [`keyset_after`], which builds the
//! predicate "strictly after this row in this ordering". A backward page is a
//! forward page over the inverted ordering, reversed in memory before it is
//! returned.
//!
//! # Example
//!
//! ```rust,ignore
//! use resource_engine::query::{fetch_page, Pagination, Sort};
//!
//! let mut cursor = None;
//! loop {
//!     let page = fetch_page(&store, None, &Sort::Default, &Pagination::new(20).after_opt(cursor)).await?;
//!     render(&page.items);
//!     match page.next_cursor {
//!         Some(next) => cursor = Some(next),
//!         None => break,
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};

use super::filter::{CmpOp, Filter};
use super::sort::{OrderBy, Sort, SortTarget};
use crate::resource::{Resource, Value};
use crate::store::{Store, StoreQuery, StoreResult};

/// Default number of rows per page
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Limit, cursor and direction of a page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination<Id> {
    /// Maximum number of rows; zero yields an empty page
    pub limit: usize,
    /// Id of the row the page starts after
    pub after_id: Option<Id>,
    /// Page backwards, towards the start of the ordering
    #[serde(default)]
    pub reverse: bool,
}

impl<Id> Default for Pagination<Id> {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl<Id> Pagination<Id> {
    /// First page of `limit` rows
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            after_id: None,
            reverse: false,
        }
    }

    /// Start after the row `id`
    #[must_use]
    pub fn after(mut self, id: Id) -> Self {
        self.after_id = Some(id);
        self
    }

    /// Start after the row `id`, if any
    #[must_use]
    pub fn after_opt(mut self, id: Option<Id>) -> Self {
        self.after_id = id;
        self
    }

    /// Page backwards
    #[must_use]
    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }
}

/// One page of results
///
/// `next_cursor` is the id to pass as `after_id` (with the same `reverse`
/// flag) to continue in the same direction, `None` on the last page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", bound(serialize = "T: Serialize"))]
pub struct Page<T: Resource> {
    pub items: Vec<T>,
    pub next_cursor: Option<T::Id>,
}

impl<T: Resource> Page<T> {
    /// A page without rows or cursor
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }

    /// Number of rows in the page
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the page has no rows
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ids of the rows, in order
    pub fn ids(&self) -> Vec<T::Id> {
        self.items.iter().map(Resource::id).collect()
    }
}

/// Predicate selecting the rows strictly after `reference` in `order`
///
/// Expands to `k1 > v1 or (k1 = v1 and k2 > v2) or ...`, with "greater"
/// meaning "later in this key's direction". Nulls are placed according to
/// each key: a null reference value is followed by nothing when nulls sort
/// last, and by every non-null value when they sort first.
pub fn keyset_after<T: Resource>(order: &OrderBy<T>, reference: &T) -> Option<Filter<T>> {
    let mut clauses = Vec::new();
    let mut equals: Vec<Filter<T>> = Vec::new();
    let later = |descending: bool| if descending { CmpOp::Lt } else { CmpOp::Gt };

    for key in order.keys() {
        match key.target {
            SortTarget::Random(seed) => {
                let pivot = reference.id();
                let after = Filter::Random {
                    seed,
                    op: later(key.descending),
                    pivot,
                };
                clauses.push(Filter::and(
                    equals.iter().cloned().map(Some).chain([Some(after)]),
                ));
                equals.push(Filter::Random {
                    seed,
                    op: CmpOp::Eq,
                    pivot,
                });
            }
            SortTarget::Field(field) => {
                let value = field.value(reference);
                let after = if value.is_null() {
                    key.nulls_first.then(|| Filter::Ne(field, Value::Null))
                } else {
                    let strictly = Filter::compare(field, later(key.descending), value.clone());
                    if field.nullable && !key.nulls_first {
                        Filter::or([Some(strictly), Some(Filter::Eq(field, Value::Null))])
                    } else {
                        Some(strictly)
                    }
                };
                if let Some(after) = after {
                    clauses.push(Filter::and(
                        equals.iter().cloned().map(Some).chain([Some(after)]),
                    ));
                }
                equals.push(Filter::Eq(field, value));
            }
        }
    }

    Filter::or(clauses)
}

/// Run one page request against a store
///
/// The store is asked for one row more than the limit, which tells whether a
/// following page exists. An `after_id` that no longer exists yields an empty
/// page: cursors are best-effort, not snapshots.
pub async fn fetch_page<T, S>(
    store: &S,
    filter: Option<Filter<T>>,
    sort: &Sort<T>,
    pagination: &Pagination<T::Id>,
) -> StoreResult<Page<T>>
where
    T: Resource,
    S: Store<T>,
{
    if pagination.limit == 0 {
        return Ok(Page::empty());
    }

    let forward = sort.compile();
    let order = if pagination.reverse {
        forward.inverted()
    } else {
        forward
    };

    let filter = match &pagination.after_id {
        None => filter,
        Some(after) => {
            let reference = store.execute(&StoreQuery::by_id(after)).await?.into_iter().next();
            let Some(reference) = reference else {
                tracing::debug!(kind = T::KIND, after = %after, "Cursor row no longer exists");
                return Ok(Page::empty());
            };
            Filter::and([filter, keyset_after(&order, &reference)])
        }
    };

    let query = StoreQuery::filtered(filter)
        .ordered(order)
        .limit(pagination.limit.saturating_add(1));
    let mut items = store.execute(&query).await?;

    let has_more = items.len() > pagination.limit;
    items.truncate(pagination.limit);
    let next_cursor = if has_more {
        items.last().map(Resource::id)
    } else {
        None
    };
    if pagination.reverse {
        items.reverse();
    }

    Ok(Page { items, next_cursor })
}

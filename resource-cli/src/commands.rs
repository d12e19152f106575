use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::Value;

use resource_engine::catalog::{Catalog, Episode};
use resource_engine::identifier::Identifier;
use resource_engine::query::{Include, ListParams};
use resource_engine::repository::ReadRepository;
use resource_engine::resource::Resource;

/// What to do with the selected resource kind
#[derive(Subcommand, Debug, Clone)]
pub enum Action {
    /// List one page of resources
    List(ListArgs),
    /// Show one resource by id or slug (`random` picks one)
    Get {
        /// Id or slug
        #[arg(value_name = "IDENTIFIER")]
        identifier: String,

        /// Comma-separated relations to load
        #[arg(long)]
        include: Option<String>,
    },
    /// Case-insensitive search over the searchable fields
    Search {
        #[arg(value_name = "QUERY")]
        query: String,
    },
    /// Count resources matching a filter
    Count {
        /// Filter expression, e.g. "status eq airing"
        #[arg(long)]
        filter: Option<String>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Filter expression, e.g. "rating ge 8 and genres has drama"
    #[arg(long)]
    pub filter: Option<String>,

    /// Sort specification, e.g. "airDate:desc,name" or "random:42"
    #[arg(long)]
    pub sort: Option<String>,

    /// Page size
    #[arg(long)]
    pub limit: Option<usize>,

    /// Id of the row the page starts after (a previous nextCursor)
    #[arg(long, value_name = "ID")]
    pub after: Option<String>,

    /// Page backwards from --after
    #[arg(long)]
    pub reverse: bool,

    /// Comma-separated relations to load
    #[arg(long)]
    pub include: Option<String>,
}

impl ListArgs {
    fn params(&self) -> ListParams {
        ListParams {
            filter: self.filter.clone(),
            sort: self.sort.clone(),
            include: self.include.clone(),
            limit: self.limit,
            after_id: self.after.clone(),
            reverse: self.reverse,
        }
    }
}

/// Run an action against one repository and render the result as JSON
pub async fn run<T, R>(catalog: &Catalog, repository: &R, action: Action) -> Result<Value>
where
    T: Resource + Serialize,
    R: ReadRepository<T>,
{
    match action {
        Action::List(args) => {
            let query = catalog.list_query::<T>(&args.params())?;
            let page = repository.get_all(query).await?;
            Ok(serde_json::to_value(page)?)
        }
        Action::Get {
            identifier,
            include,
        } => {
            let id: Identifier<T::Id> = identifier
                .parse()
                .with_context(|| format!("Invalid identifier: {identifier}"))?;
            let include = Include::<T>::parse(include.as_deref(), catalog.registry())?;
            let item = repository.get_with(&id, &include).await?;
            Ok(serde_json::to_value(item)?)
        }
        Action::Search { query } => {
            let items = repository.search(&query).await?;
            Ok(serde_json::to_value(items)?)
        }
        Action::Count { filter } => {
            let params = ListParams {
                filter,
                ..ListParams::default()
            };
            let query = catalog.list_query::<T>(&params)?;
            let count = repository.get_count(query.filter).await?;
            Ok(serde_json::json!({ "count": count }))
        }
    }
}

/// List the episodes of one show
pub async fn episodes_of(catalog: &Catalog, show: &str, args: &ListArgs) -> Result<Value> {
    let show: Identifier<i64> = show
        .parse()
        .with_context(|| format!("Invalid show identifier: {show}"))?;
    let query = catalog.list_query::<Episode>(&args.params())?;
    let page = catalog.episodes_of(&show, query).await?;
    Ok(serde_json::to_value(page)?)
}

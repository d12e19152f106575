//! Repository error types
//!
//! Every repository operation fails with one [`RepositoryError`], which records
//! what was being done, what category of failure occurred and, when known,
//! which resource was involved.
//!
//! # Example
//!
//! ```rust
//! use resource_engine::repository::{RepositoryError, RepositoryErrorKind};
//!
//! let error = RepositoryError::not_found("Show", "dune");
//! assert!(matches!(error.kind, RepositoryErrorKind::NotFound));
//! assert!(error.entity_id.is_some());
//! ```

use std::fmt;

use serde::Serialize;

use crate::query::QueryError;
use crate::store::StoreError;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryOperation {
    /// Looking up a single resource by identifier
    Get,
    /// Listing a page of resources
    GetAll,
    /// Counting resources matching a filter
    Count,
    /// Free-text search
    Search,
    /// Creating a resource
    Create,
    /// Creating a resource unless its slug already exists
    CreateIfNotExists,
    /// Replacing a resource
    Edit,
    /// Partially updating a resource
    Patch,
    /// Deleting a resource
    Delete,
    /// Deleting every resource matching a filter
    DeleteAll,
    /// Loading included relations
    Include,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "get"),
            Self::GetAll => write!(f, "get_all"),
            Self::Count => write!(f, "count"),
            Self::Search => write!(f, "search"),
            Self::Create => write!(f, "create"),
            Self::CreateIfNotExists => write!(f, "create_if_not_exists"),
            Self::Edit => write!(f, "edit"),
            Self::Patch => write!(f, "patch"),
            Self::Delete => write!(f, "delete"),
            Self::DeleteAll => write!(f, "delete_all"),
            Self::Include => write!(f, "include"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryErrorKind {
    /// No resource matches the identifier
    NotFound,
    /// A uniqueness constraint rejected the write
    DuplicateResource,
    /// Query text or a validation hook rejected the input
    ValidationFailed,
    /// The repository does not support the operation
    UnsupportedOperation,
    /// Any other failure reported by the backing store
    StorageError,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::DuplicateResource => write!(f, "duplicate_resource"),
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::UnsupportedOperation => write!(f, "unsupported_operation"),
            Self::StorageError => write!(f, "storage_error"),
        }
    }
}

/// Identity of the row that already holds a conflicting slug
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRef {
    pub id: String,
    pub slug: String,
}

/// Structured repository error with operation context
///
/// # Example
///
/// ```rust
/// use resource_engine::repository::RepositoryError;
///
/// let error = RepositoryError::not_found("Show", "dune");
/// assert_eq!(
///     error.to_string(),
///     "Repository not_found error during get: Resource not found [Show: dune]"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The type of resource involved (e.g., "Show", "Episode")
    pub entity_type: Option<String>,
    /// The id or slug of the resource involved
    pub entity_id: Option<String>,
    /// The row already holding the slug, for duplicate errors
    pub existing: Option<ResourceRef>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
            existing: None,
        }
    }

    /// Create a "not found" error with entity context
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Get,
            RepositoryErrorKind::NotFound,
            "Resource not found",
        )
        .with_entity(entity_type, entity_id)
    }

    /// Create a "duplicate resource" error for a conflicting slug
    ///
    /// # Example
    ///
    /// ```rust
    /// use resource_engine::repository::{RepositoryError, RepositoryErrorKind};
    ///
    /// let error = RepositoryError::duplicate("Show", "dune");
    /// assert_eq!(error.kind, RepositoryErrorKind::DuplicateResource);
    /// assert!(error.is_duplicate());
    /// ```
    pub fn duplicate(entity_type: impl Into<String>, slug: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Create,
            RepositoryErrorKind::DuplicateResource,
            "Resource already exists",
        )
        .with_entity(entity_type, slug)
    }

    /// Create a validation failed error
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Create,
            RepositoryErrorKind::ValidationFailed,
            message,
        )
    }

    /// Create an error for an operation the repository refuses
    pub fn unsupported(operation: RepositoryOperation, entity_type: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        Self {
            message: format!("{} resources are read-only", entity_type),
            entity_type: Some(entity_type),
            ..Self::new(operation, RepositoryErrorKind::UnsupportedOperation, "")
        }
    }

    /// Create a storage error
    pub fn storage(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::StorageError, message)
    }

    /// Classify a backing-store failure
    ///
    /// Uniqueness conflicts become [`RepositoryErrorKind::DuplicateResource`],
    /// unsupported queries [`RepositoryErrorKind::UnsupportedOperation`], and
    /// everything else [`RepositoryErrorKind::StorageError`].
    pub fn from_store(operation: RepositoryOperation, error: StoreError) -> Self {
        match error {
            StoreError::Conflict { field, value } => Self::new(
                operation,
                RepositoryErrorKind::DuplicateResource,
                format!("Resource already exists with {} {}", field, value),
            ),
            StoreError::Unsupported(message) => {
                Self::new(operation, RepositoryErrorKind::UnsupportedOperation, message)
            }
            other => Self::storage(operation, other.to_string()),
        }
    }

    /// Add entity context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Attach the row that already holds the conflicting slug
    #[must_use]
    pub fn with_existing(mut self, id: impl fmt::Display, slug: impl Into<String>) -> Self {
        self.existing = Some(ResourceRef {
            id: id.to_string(),
            slug: slug.into(),
        });
        self
    }

    /// Whether this is a uniqueness conflict
    pub fn is_duplicate(&self) -> bool {
        self.kind == RepositoryErrorKind::DuplicateResource
    }

    /// Whether the resource was missing
    pub fn is_not_found(&self) -> bool {
        self.kind == RepositoryErrorKind::NotFound
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let (Some(entity_type), Some(entity_id)) = (&self.entity_type, &self.entity_id) {
            write!(f, " [{}: {}]", entity_type, entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}

impl From<QueryError> for RepositoryError {
    fn from(error: QueryError) -> Self {
        Self::new(
            RepositoryOperation::GetAll,
            RepositoryErrorKind::ValidationFailed,
            error.to_string(),
        )
    }
}

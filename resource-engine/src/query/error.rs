//! Errors raised while parsing query text
//!
//! Filter, sort and include strings are validated when they are parsed. Any
//! problem surfaces immediately as a [`QueryError`] and nothing is partially
//! applied.

use thiserror::Error;

/// Problem found in caller-supplied query text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// A field name that the resource type does not declare
    #[error("Unknown field `{field}` on {kind}")]
    UnknownField { kind: &'static str, field: String },

    /// Malformed filter text
    #[error("Invalid filter at position {position}: {message}")]
    Syntax { message: String, position: usize },

    /// A literal that does not fit the field's declared type
    #[error("Invalid value `{value}` for field `{field}`: expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    /// Malformed sort token
    #[error("Invalid sort `{token}`: {reason}")]
    InvalidSort { token: String, reason: String },

    /// A relation name that is not registered for the resource type
    #[error("Unknown relation `{relation}` on {kind}")]
    UnknownRelation { kind: &'static str, relation: String },

    /// A collection relation, which cannot be eagerly loaded
    #[error("Relation `{relation}` on {kind} is multi-valued and cannot be included")]
    MultiValuedRelation { kind: &'static str, relation: String },

    /// An empty slug given where an identifier was expected
    #[error("A slug can not be empty")]
    EmptySlug,
}

impl QueryError {
    pub(crate) fn syntax(message: impl Into<String>, position: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            position,
        }
    }

    /// The field or token the error is about, if any
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::UnknownField { field, .. } | Self::InvalidValue { field, .. } => Some(field),
            Self::InvalidSort { token, .. } => Some(token),
            Self::UnknownRelation { relation, .. }
            | Self::MultiValuedRelation { relation, .. } => Some(relation),
            Self::Syntax { .. } | Self::EmptySlug => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_offending_token() {
        let error = QueryError::InvalidSort {
            token: "name:up".to_string(),
            reason: "the sort order, if set, should be :asc or :desc".to_string(),
        };
        assert!(error.to_string().contains("name:up"));
        assert_eq!(error.subject(), Some("name:up"));
    }

    #[test]
    fn test_syntax_error_reports_position() {
        let error = QueryError::syntax("Expected closing parenthesis", 7);
        assert_eq!(
            error.to_string(),
            "Invalid filter at position 7: Expected closing parenthesis"
        );
        assert_eq!(error.subject(), None);
    }
}

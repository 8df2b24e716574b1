//! Unified error model for the factor registry.
//! One enum covers every failure the registry, descriptor validation and
//! fetch pipeline can raise, along with helper constructors and mappings
//! from the tabular engine and ambient error types.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FactorError {
    /// A parameter had the wrong shape for the operation (empty column list,
    /// duplicate output names within one descriptor, ...).
    InvalidArgument { message: String },
    /// The alias list does not line up with the origin column list.
    AliasLengthMismatch { message: String },
    /// A named column is absent from a source schema.
    ColumnNotFound { column: String, message: String },
    /// fetch was invoked with no timestamp/id context ever established.
    FilterNotSet { message: String },
    /// A fold or concat ran over zero fetchable descriptors.
    EmptyRegistry { message: String },
    /// The source value is of a kind the operation cannot consume.
    UnsupportedProvenance { message: String },
    /// Connector or tabular-engine failure surfaced during a fetch.
    Exec { message: String },
}

impl FactorError {
    pub fn kind_str(&self) -> &'static str {
        match self {
            FactorError::InvalidArgument { .. } => "invalid_argument",
            FactorError::AliasLengthMismatch { .. } => "alias_length_mismatch",
            FactorError::ColumnNotFound { .. } => "column_not_found",
            FactorError::FilterNotSet { .. } => "filter_not_set",
            FactorError::EmptyRegistry { .. } => "empty_registry",
            FactorError::UnsupportedProvenance { .. } => "unsupported_provenance",
            FactorError::Exec { .. } => "exec_error",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            FactorError::InvalidArgument { message }
            | FactorError::AliasLengthMismatch { message }
            | FactorError::ColumnNotFound { message, .. }
            | FactorError::FilterNotSet { message }
            | FactorError::EmptyRegistry { message }
            | FactorError::UnsupportedProvenance { message }
            | FactorError::Exec { message } => message.as_str(),
        }
    }

    pub fn invalid<S: Into<String>>(msg: S) -> Self { FactorError::InvalidArgument { message: msg.into() } }
    pub fn alias_mismatch<S: Into<String>>(msg: S) -> Self { FactorError::AliasLengthMismatch { message: msg.into() } }
    pub fn column_not_found<S: Into<String>>(column: S) -> Self {
        let column = column.into();
        let message = format!("cannot locate {} column! please check the relevant parameter is correct!", column);
        FactorError::ColumnNotFound { column, message }
    }
    pub fn filter_not_set<S: Into<String>>(msg: S) -> Self { FactorError::FilterNotSet { message: msg.into() } }
    pub fn empty_registry<S: Into<String>>(msg: S) -> Self { FactorError::EmptyRegistry { message: msg.into() } }
    pub fn unsupported<S: Into<String>>(msg: S) -> Self { FactorError::UnsupportedProvenance { message: msg.into() } }
    pub fn exec<S: Into<String>>(msg: S) -> Self { FactorError::Exec { message: msg.into() } }
}

impl Display for FactorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind_str(), self.message())
    }
}

impl std::error::Error for FactorError {}

pub type FactorResult<T> = Result<T, FactorError>;

impl From<anyhow::Error> for FactorError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: treat as Exec unless downcasted elsewhere
        FactorError::Exec { message: err.to_string() }
    }
}

impl From<polars::error::PolarsError> for FactorError {
    fn from(err: polars::error::PolarsError) -> Self {
        FactorError::Exec { message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_mapping() {
        assert_eq!(FactorError::invalid("oops").kind_str(), "invalid_argument");
        assert_eq!(FactorError::alias_mismatch("bad").kind_str(), "alias_length_mismatch");
        assert_eq!(FactorError::column_not_found("v9").kind_str(), "column_not_found");
        assert_eq!(FactorError::filter_not_set("no dts").kind_str(), "filter_not_set");
        assert_eq!(FactorError::empty_registry("none").kind_str(), "empty_registry");
        assert_eq!(FactorError::unsupported("frame").kind_str(), "unsupported_provenance");
        assert_eq!(FactorError::exec("boom").kind_str(), "exec_error");
    }

    #[test]
    fn column_not_found_names_the_column() {
        let err = FactorError::column_not_found("cik_dt");
        match &err {
            FactorError::ColumnNotFound { column, message } => {
                assert_eq!(column, "cik_dt");
                assert!(message.contains("cik_dt"));
            }
            _ => panic!("expected ColumnNotFound"),
        }
        assert!(err.to_string().starts_with("column_not_found:"));
    }

    #[test]
    fn serde_tagging_roundtrip() {
        let err = FactorError::empty_registry("no sql factors to federate");
        let text = serde_json::to_string(&err).unwrap();
        assert!(text.contains("\"type\":\"empty_registry\""));
        let back: FactorError = serde_json::from_str(&text).unwrap();
        assert_eq!(back.message(), err.message());
    }

    #[test]
    fn anyhow_maps_to_exec() {
        let err: FactorError = anyhow::anyhow!("connector down").into();
        assert_eq!(err.kind_str(), "exec_error");
        assert_eq!(err.message(), "connector down");
    }
}

//! Error types for ec2kit

use thiserror::Error;

/// Result type for ec2kit operations
pub type Result<T> = std::result::Result<T, Ec2KitError>;

/// Core error type for ec2kit operations
#[derive(Error, Debug)]
pub enum Ec2KitError {
    /// Nothing matched, so there is nothing to present or act on
    #[error("there is no {0} to select")]
    NothingToSelect(String),

    /// The operator picked nothing
    #[error("no {0} selected")]
    SelectionCancelled(String),

    /// A call site needed exactly one entry and got more
    #[error("{count} {label} entries selected, please select exactly one")]
    TooManySelected { label: String, count: usize },

    /// Remote compute API call failed
    #[error("{operation} failed for {target}: {message}")]
    Remote {
        operation: &'static str,
        target: String,
        code: Option<String>,
        message: String,
    },

    /// Inventory snapshot could not be read or written
    #[error("inventory cache error for {region}: {message}")]
    Cache { region: String, message: String },

    /// Name or output template could not be parsed or rendered
    #[error("template error: {0}")]
    Template(String),

    /// The remote state contradicts what the workflow requires
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Operator input could not be understood
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Ec2KitError {
    /// Create a template error
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Create an invariant-violation error
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a cache error for a region
    pub fn cache(region: impl Into<String>, msg: impl std::fmt::Display) -> Self {
        Self::Cache {
            region: region.into(),
            message: msg.to_string(),
        }
    }

    /// Remote error code, when the API reported one
    pub fn remote_code(&self) -> Option<&str> {
        match self {
            Self::Remote { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

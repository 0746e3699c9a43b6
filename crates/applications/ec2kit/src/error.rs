//! AWS SDK error conversion
//!
//! Every SDK call goes through [`remote_error`] so the core only ever sees
//! [`Ec2KitError::Remote`] with the operation, the target and the API error
//! code (read with `.code()` rather than matching on message text).

use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

pub use ec2kit_core::{Ec2KitError, Result};

/// Build a `map_err` adapter naming the failed operation and its target
pub(crate) fn remote_error<E, R, T>(
    operation: &'static str,
    target: T,
) -> impl FnOnce(SdkError<E, R>) -> Ec2KitError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
    T: Into<String>,
{
    move |err| Ec2KitError::Remote {
        operation,
        target: target.into(),
        code: err.code().map(str::to_string),
        message: DisplayErrorContext(&err).to_string(),
    }
}

/// Error for a response that parsed but lacks a field the call guarantees
pub(crate) fn missing_field(operation: &'static str, field: &str) -> Ec2KitError {
    Ec2KitError::invariant(format!("{operation} response has no {field}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_is_invariant() {
        let err = missing_field("AllocateAddress", "allocation id");
        assert!(matches!(err, Ec2KitError::Invariant(_)));
        assert_eq!(
            err.to_string(),
            "invariant violated: AllocateAddress response has no allocation id"
        );
    }
}

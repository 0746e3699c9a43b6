//! ec2kit Core - Shared types and traits
//!
//! This crate defines the core abstractions used across:
//! - the AWS gateway adapter (`ec2kit::ec2`)
//! - the operator workflows (inventory cache, launch, addresses)
//! - the `ec2kit` CLI
//!
//! Key types:
//! - ComputeGateway trait (interface to the remote compute API)
//! - Picker trait (interactive "pick some of N" capability)
//! - Instance / Address records and the launch request
//! - Error types

pub mod error;
pub mod traits;
pub mod types;

pub use error::*;
pub use traits::*;
pub use types::*;

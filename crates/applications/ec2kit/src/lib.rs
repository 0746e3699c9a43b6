//! # ec2kit
//!
//! Operator commands for a fleet of EC2 instances and their elastic
//! addresses.
//!
//! ## Architecture
//!
//! ```text
//! ec2kit (binary) ──→ Operator workflows
//! ├── Inventory cache  ──→  Selector ──→ Picker (terminal)
//! ├── Launch orchestrator ─┐
//! └── Address manager ─────┴──→ ComputeGateway (EC2)
//! ```
//!
//! Every workflow talks to the cloud through [`ComputeGateway`]; the EC2
//! adapter in [`ec2`] is the only implementation shipped. The workflows are
//! strictly sequential: one call is awaited before the next is issued.

#![warn(clippy::all)]

pub mod address;
pub mod billing;
pub mod cache;
pub mod config;
pub mod ec2;
pub mod error;
pub mod launch;
pub mod logging;
pub mod operator;
pub mod prompt;
pub mod selector;
pub mod template;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Public exports
// ============================================================================

pub use address::{AddressManager, Attachment};
pub use cache::{InventoryCache, Snapshot, SnapshotStore};
pub use config::Ec2KitConfig;
pub use ec2::Ec2Gateway;
pub use launch::{LaunchOptions, LaunchReport, LaunchSpecification, Launcher};
pub use logging::Verbosity;
pub use operator::{Associated, Operator};
pub use prompt::StdinPicker;
pub use selector::{AddressEntry, InstanceEntry, Selectable, Selector, StaticChoice};
pub use template::Template;

pub use ec2kit_core::{ComputeGateway, Ec2KitError, Picker, Result};

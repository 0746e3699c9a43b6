//! Core traits for ec2kit
//!
//! The ComputeGateway trait is the only way the workflows talk to the cloud.
//! Cache, launch and address code work through this interface ONLY - never
//! concrete SDK types.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::*;

/// Remote compute API, bound to one region.
#[async_trait]
pub trait ComputeGateway: Send + Sync {
    /// Region this gateway talks to
    fn region(&self) -> &str;

    /// Inventory
    async fn describe_instances(&self) -> Result<Vec<Instance>>;
    async fn describe_instances_by_id(&self, ids: &[String]) -> Result<Vec<Instance>>;

    /// Lifecycle
    async fn start_instances(&self, ids: &[String]) -> Result<Vec<StateChange>>;
    async fn stop_instances(&self, ids: &[String]) -> Result<Vec<StateChange>>;
    async fn terminate_instances(&self, ids: &[String], dry_run: bool) -> Result<Vec<StateChange>>;
    async fn modify_instance_type(&self, id: &str, instance_type: &str) -> Result<()>;
    async fn run_instances(&self, request: &LaunchRequest, dry_run: bool) -> Result<Vec<Instance>>;

    /// Tags
    async fn create_tags(&self, resources: &[String], tags: &[Tag]) -> Result<()>;
    async fn delete_tags(&self, resources: &[String], keys: &[String]) -> Result<()>;

    /// Elastic addresses
    async fn describe_addresses(&self) -> Result<Vec<Address>>;
    async fn describe_addresses_for_instance(&self, instance_id: &str) -> Result<Vec<Address>>;
    async fn allocate_address(&self) -> Result<AllocatedAddress>;
    async fn associate_address(&self, allocation_id: &str, instance_id: &str) -> Result<String>;
    async fn disassociate_address(&self, association_id: &str) -> Result<()>;
    async fn release_address(&self, allocation_id: &str) -> Result<()>;
}

/// Interactive operator: pick some of N labeled items, answer yes/no.
pub trait Picker {
    /// Indices of the chosen items; empty when the operator selected nothing
    fn pick(&self, label: &str, prompt: &str, items: &[String]) -> Result<Vec<usize>>;

    /// Yes/no question, `default` on an empty answer
    fn confirm(&self, message: &str, default: bool) -> Result<bool>;
}

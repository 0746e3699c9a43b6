//! EC2 gateway
//!
//! The AWS implementation of [`ComputeGateway`]. This is the single place
//! where SDK types (and their optional fields) are converted into the core
//! records; nothing past this module touches `aws_sdk_ec2` types.

use crate::config::load_sdk_config;
use crate::error::{missing_field, remote_error, Result};
use async_trait::async_trait;
use aws_sdk_ec2::{
    types::{
        AttributeValue, BlockDeviceMapping, DomainType, EbsBlockDevice, Filter,
        IamInstanceProfileSpecification, InstanceNetworkInterfaceSpecification,
        InstanceState as AwsInstanceState, InstanceStateChange, InstanceType, Placement,
        Tag as AwsTag, VolumeType,
    },
    Client,
};
use base64::prelude::*;
use ec2kit_core::{
    Address, AllocatedAddress, BlockDevice, ComputeGateway, Instance, InstanceState,
    LaunchRequest, StateChange, Tag,
};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// [`ComputeGateway`] backed by the EC2 API
pub struct Ec2Gateway {
    client: Client,
    region: String,
}

impl Ec2Gateway {
    /// Wrap an existing client
    pub fn new(client: Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }

    /// Connect to `region`, optionally through a named credentials profile
    pub async fn connect(region: &str, profile: Option<&str>) -> Self {
        debug!("Creating EC2 client for region: {}", region);
        let config = load_sdk_config(region, profile).await;
        Self::new(Client::new(&config), region)
    }
}

#[async_trait]
impl ComputeGateway for Ec2Gateway {
    fn region(&self) -> &str {
        &self.region
    }

    async fn describe_instances(&self) -> Result<Vec<Instance>> {
        debug!(region = %self.region, "Describing all instances");

        let mut instances = Vec::new();
        let mut pages = self.client.describe_instances().into_paginator().send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(remote_error("DescribeInstances", self.region.as_str()))?;
            for reservation in page.reservations() {
                instances.extend(reservation.instances().iter().filter_map(instance_from_aws));
            }
        }

        debug!(count = instances.len(), "Describe complete");
        Ok(instances)
    }

    async fn describe_instances_by_id(&self, ids: &[String]) -> Result<Vec<Instance>> {
        // An empty id list would describe the whole region.
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .describe_instances()
            .set_instance_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(remote_error("DescribeInstances", ids.join(",")))?;

        Ok(response
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .filter_map(instance_from_aws)
            .collect())
    }

    async fn start_instances(&self, ids: &[String]) -> Result<Vec<StateChange>> {
        let response = self
            .client
            .start_instances()
            .set_instance_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(remote_error("StartInstances", ids.join(",")))?;

        Ok(response.starting_instances().iter().map(state_change).collect())
    }

    async fn stop_instances(&self, ids: &[String]) -> Result<Vec<StateChange>> {
        let response = self
            .client
            .stop_instances()
            .set_instance_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(remote_error("StopInstances", ids.join(",")))?;

        Ok(response.stopping_instances().iter().map(state_change).collect())
    }

    async fn terminate_instances(&self, ids: &[String], dry_run: bool) -> Result<Vec<StateChange>> {
        let response = self
            .client
            .terminate_instances()
            .set_instance_ids(Some(ids.to_vec()))
            .dry_run(dry_run)
            .send()
            .await
            .map_err(remote_error("TerminateInstances", ids.join(",")))?;

        Ok(response
            .terminating_instances()
            .iter()
            .map(state_change)
            .collect())
    }

    async fn modify_instance_type(&self, id: &str, instance_type: &str) -> Result<()> {
        self.client
            .modify_instance_attribute()
            .instance_id(id)
            .instance_type(AttributeValue::builder().value(instance_type).build())
            .send()
            .await
            .map_err(remote_error("ModifyInstanceAttribute", id))?;

        Ok(())
    }

    async fn run_instances(&self, request: &LaunchRequest, dry_run: bool) -> Result<Vec<Instance>> {
        debug!(
            image = %request.image_id,
            instance_type = %request.instance_type,
            subnet = %request.subnet_id,
            dry_run,
            "Running instances"
        );

        let block_devices: Vec<BlockDeviceMapping> = request
            .ebs_devices
            .iter()
            .map(|ebs| {
                BlockDeviceMapping::builder()
                    .device_name(&ebs.device_name)
                    .ebs(
                        EbsBlockDevice::builder()
                            .delete_on_termination(ebs.delete_on_termination)
                            .set_encrypted(ebs.encrypted)
                            .set_volume_size(ebs.size_gb)
                            .set_volume_type(ebs.volume_type.as_deref().map(VolumeType::from))
                            .build(),
                    )
                    .build()
            })
            .collect();

        let network_interface = InstanceNetworkInterfaceSpecification::builder()
            .device_index(0)
            .associate_public_ip_address(request.public_ip_enabled)
            .set_subnet_id(non_empty(&request.subnet_id))
            .set_groups(if request.security_group_ids.is_empty() {
                None
            } else {
                Some(request.security_group_ids.clone())
            })
            .set_ipv6_address_count(request.ipv6_enabled.then_some(1))
            .build();

        let mut run_req = self
            .client
            .run_instances()
            .image_id(&request.image_id)
            .instance_type(InstanceType::from(request.instance_type.as_str()))
            .min_count(request.count)
            .max_count(request.count)
            .dry_run(dry_run)
            .ebs_optimized(request.ebs_optimized)
            .set_key_name(request.key_name.clone())
            .set_block_device_mappings(if block_devices.is_empty() {
                None
            } else {
                Some(block_devices)
            })
            .network_interfaces(network_interface)
            .set_user_data(
                request
                    .user_data
                    .as_ref()
                    .map(|data| BASE64_STANDARD.encode(data)),
            )
            .set_client_token(request.client_token.clone());

        if let Some(role) = &request.iam_role_name {
            run_req = run_req
                .iam_instance_profile(IamInstanceProfileSpecification::builder().name(role).build());
        }

        if let Some(group) = &request.placement_group_name {
            run_req = run_req.placement(Placement::builder().group_name(group).build());
        }

        let response = run_req.send().await.map_err(remote_error(
            "RunInstances",
            format!("{} in {}", request.image_id, self.region),
        ))?;

        Ok(response
            .instances()
            .iter()
            .filter_map(instance_from_aws)
            .collect())
    }

    async fn create_tags(&self, resources: &[String], tags: &[Tag]) -> Result<()> {
        self.client
            .create_tags()
            .set_resources(Some(resources.to_vec()))
            .set_tags(Some(
                tags.iter()
                    .map(|t| AwsTag::builder().key(&t.key).value(&t.value).build())
                    .collect(),
            ))
            .send()
            .await
            .map_err(remote_error("CreateTags", resources.join(",")))?;

        Ok(())
    }

    async fn delete_tags(&self, resources: &[String], keys: &[String]) -> Result<()> {
        self.client
            .delete_tags()
            .set_resources(Some(resources.to_vec()))
            .set_tags(Some(
                keys.iter().map(|k| AwsTag::builder().key(k).build()).collect(),
            ))
            .send()
            .await
            .map_err(remote_error("DeleteTags", resources.join(",")))?;

        Ok(())
    }

    async fn describe_addresses(&self) -> Result<Vec<Address>> {
        let response = self
            .client
            .describe_addresses()
            .send()
            .await
            .map_err(remote_error("DescribeAddresses", self.region.as_str()))?;

        Ok(response.addresses().iter().map(address_from_aws).collect())
    }

    async fn describe_addresses_for_instance(&self, instance_id: &str) -> Result<Vec<Address>> {
        let response = self
            .client
            .describe_addresses()
            .filters(Filter::builder().name("instance-id").values(instance_id).build())
            .send()
            .await
            .map_err(remote_error("DescribeAddresses", instance_id))?;

        Ok(response.addresses().iter().map(address_from_aws).collect())
    }

    async fn allocate_address(&self) -> Result<AllocatedAddress> {
        let response = self
            .client
            .allocate_address()
            .domain(DomainType::Vpc)
            .send()
            .await
            .map_err(remote_error("AllocateAddress", self.region.as_str()))?;

        Ok(AllocatedAddress {
            allocation_id: response
                .allocation_id()
                .ok_or_else(|| missing_field("AllocateAddress", "allocation id"))?
                .to_string(),
            public_ip: response.public_ip().unwrap_or_default().to_string(),
        })
    }

    async fn associate_address(&self, allocation_id: &str, instance_id: &str) -> Result<String> {
        let response = self
            .client
            .associate_address()
            .allocation_id(allocation_id)
            .instance_id(instance_id)
            .allow_reassociation(true)
            .send()
            .await
            .map_err(remote_error(
                "AssociateAddress",
                format!("{allocation_id} -> {instance_id}"),
            ))?;

        response
            .association_id()
            .map(str::to_string)
            .ok_or_else(|| missing_field("AssociateAddress", "association id"))
    }

    async fn disassociate_address(&self, association_id: &str) -> Result<()> {
        self.client
            .disassociate_address()
            .association_id(association_id)
            .send()
            .await
            .map_err(remote_error("DisassociateAddress", association_id))?;

        Ok(())
    }

    async fn release_address(&self, allocation_id: &str) -> Result<()> {
        self.client
            .release_address()
            .allocation_id(allocation_id)
            .send()
            .await
            .map_err(remote_error("ReleaseAddress", allocation_id))?;

        Ok(())
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn state_name(state: Option<&AwsInstanceState>) -> InstanceState {
    state
        .and_then(|s| s.name())
        .map(|n| InstanceState::from(n.as_str()))
        .unwrap_or_else(|| InstanceState::Unknown(String::new()))
}

fn state_change(change: &InstanceStateChange) -> StateChange {
    StateChange {
        instance_id: change.instance_id().unwrap_or_default().to_string(),
        previous: state_name(change.previous_state()),
        current: state_name(change.current_state()),
    }
}

/// Parse an AWS EC2 instance into our Instance record
fn instance_from_aws(instance: &aws_sdk_ec2::types::Instance) -> Option<Instance> {
    let id = instance.instance_id()?;

    let ipv6 = instance
        .network_interfaces()
        .iter()
        .flat_map(|ni| ni.ipv6_addresses())
        .filter_map(|a| a.ipv6_address())
        .find(|a| !a.is_empty())
        .map(str::to_string);

    let tags = instance
        .tags()
        .iter()
        .filter_map(|t| Some(Tag::new(t.key()?, t.value().unwrap_or_default())))
        .collect();

    let block_devices = instance
        .block_device_mappings()
        .iter()
        .map(|m| BlockDevice {
            device_name: m.device_name().unwrap_or_default().to_string(),
            volume_id: m.ebs().and_then(|e| e.volume_id()).map(str::to_string),
        })
        .collect();

    let launch_time = instance
        .launch_time()
        .and_then(|t| chrono::DateTime::from_timestamp(t.secs(), t.subsec_nanos()));

    let mut attributes = BTreeMap::new();
    let mut put = |key: &str, value: Option<&str>| {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            attributes.insert(key.to_string(), Value::String(v.to_string()));
        }
    };
    put("image_id", instance.image_id());
    put("key_name", instance.key_name());
    put("vpc_id", instance.vpc_id());
    put("subnet_id", instance.subnet_id());
    put(
        "availability_zone",
        instance.placement().and_then(|p| p.availability_zone()),
    );
    put("architecture", instance.architecture().map(|a| a.as_str()));
    put("platform_details", instance.platform_details());
    put("private_dns_name", instance.private_dns_name());
    put("public_dns_name", instance.public_dns_name());
    put(
        "iam_instance_profile",
        instance.iam_instance_profile().and_then(|p| p.arn()),
    );

    let groups: Vec<Value> = instance
        .security_groups()
        .iter()
        .filter_map(|g| g.group_id())
        .map(|g| Value::String(g.to_string()))
        .collect();
    if !groups.is_empty() {
        attributes.insert("security_group_ids".to_string(), Value::Array(groups));
    }
    if let Some(optimized) = instance.ebs_optimized() {
        attributes.insert("ebs_optimized".to_string(), Value::Bool(optimized));
    }

    Some(Instance {
        instance_id: id.to_string(),
        state: state_name(instance.state()),
        instance_type: instance
            .instance_type()
            .map(|t| t.as_str().to_string())
            .unwrap_or_default(),
        public_ip: instance.public_ip_address().map(str::to_string),
        private_ip: instance.private_ip_address().map(str::to_string),
        ipv6,
        tags,
        block_devices,
        launch_time,
        attributes,
    })
}

fn address_from_aws(address: &aws_sdk_ec2::types::Address) -> Address {
    Address {
        allocation_id: address.allocation_id().unwrap_or_default().to_string(),
        association_id: address.association_id().map(str::to_string),
        public_ip: address.public_ip().unwrap_or_default().to_string(),
        instance_id: address
            .instance_id()
            .filter(|id| !id.is_empty())
            .map(str::to_string),
        name: String::new(),
    }
}

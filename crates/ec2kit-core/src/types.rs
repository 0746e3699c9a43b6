//! Core types shared across ec2kit components

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag key holding an instance's display name
pub const NAME_TAG: &str = "Name";

/// Instance lifecycle state
///
/// Unknown state names reported by the API are preserved verbatim so that
/// filtering keeps comparing the raw strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
    Unknown(String),
}

impl InstanceState {
    /// The state name as the API spells it
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
            Self::Unknown(name) => name,
        }
    }
}

impl From<&str> for InstanceState {
    fn from(name: &str) -> Self {
        match name {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            "shutting-down" => Self::ShuttingDown,
            "terminated" => Self::Terminated,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<String> for InstanceState {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<InstanceState> for String {
    fn from(state: InstanceState) -> Self {
        state.as_str().to_string()
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which instances a listing keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateFilter {
    #[default]
    Any,
    Running,
    Stopped,
}

impl StateFilter {
    /// Check whether an instance in `state` passes this filter
    pub fn matches(&self, state: &InstanceState) -> bool {
        match self {
            Self::Any => true,
            Self::Running => *state == InstanceState::Running,
            Self::Stopped => *state == InstanceState::Stopped,
        }
    }
}

impl std::fmt::Display for StateFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => write!(f, "any state"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Key/value tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Block device attached to an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDevice {
    pub device_name: String,
    pub volume_id: Option<String>,
}

/// A compute instance as returned by the gateway
///
/// `attributes` carries every other field the gateway reported, so a
/// persisted snapshot is a pass-through of the remote record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub state: InstanceState,
    #[serde(default)]
    pub instance_type: String,
    #[serde(default)]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub private_ip: Option<String>,
    #[serde(default)]
    pub ipv6: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub block_devices: Vec<BlockDevice>,
    #[serde(default)]
    pub launch_time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Instance {
    /// Create a bare instance record
    pub fn new(instance_id: impl Into<String>, state: InstanceState) -> Self {
        Self {
            instance_id: instance_id.into(),
            state,
            instance_type: String::new(),
            public_ip: None,
            private_ip: None,
            ipv6: None,
            tags: Vec::new(),
            block_devices: Vec::new(),
            launch_time: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Value of the Name tag, empty when the instance has none
    pub fn name(&self) -> &str {
        self.tag(NAME_TAG).unwrap_or_default()
    }

    /// Value of the first tag with `key`
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }

    /// Volume ids of the attached EBS block devices, in mapping order
    pub fn volume_ids(&self) -> Vec<String> {
        self.block_devices
            .iter()
            .filter_map(|d| d.volume_id.clone())
            .collect()
    }
}

/// Elastic address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub allocation_id: String,
    pub association_id: Option<String>,
    pub public_ip: String,
    pub instance_id: Option<String>,
    /// Name tag of the bound instance, empty when unbound or unnamed
    #[serde(default)]
    pub name: String,
}

impl Address {
    /// Whether the address is currently bound to an instance
    pub fn is_associated(&self) -> bool {
        self.association_id.is_some() || self.instance_id.is_some()
    }
}

/// Result of allocating a new address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedAddress {
    pub allocation_id: String,
    pub public_ip: String,
}

/// State transition reported by start/stop/terminate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub instance_id: String,
    pub previous: InstanceState,
    pub current: InstanceState,
}

/// EBS volume to create at launch
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EbsDevice {
    pub device_name: String,
    pub delete_on_termination: bool,
    /// Left unset on purpose for root volumes whose size is modified:
    /// the API rejects an explicit encryption flag there
    pub encrypted: Option<bool>,
    pub size_gb: Option<i32>,
    pub volume_type: Option<String>,
}

/// Fully resolved RunInstances parameters
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LaunchRequest {
    pub image_id: String,
    pub instance_type: String,
    pub subnet_id: String,
    pub count: i32,
    pub key_name: Option<String>,
    pub security_group_ids: Vec<String>,
    pub public_ip_enabled: bool,
    pub ipv6_enabled: bool,
    pub iam_role_name: Option<String>,
    pub ebs_devices: Vec<EbsDevice>,
    pub ebs_optimized: bool,
    pub placement_group_name: Option<String>,
    /// Plain text; the gateway adapter encodes it
    pub user_data: Option<String>,
    /// Idempotency token for the run call
    pub client_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(id: &str, name: &str) -> Instance {
        let mut instance = Instance::new(id, InstanceState::Running);
        instance.tags.push(Tag::new("env", "prod"));
        instance.tags.push(Tag::new(NAME_TAG, name));
        instance
    }

    #[test]
    fn test_instance_state_round_trips_api_names() {
        for name in [
            "pending",
            "running",
            "stopping",
            "stopped",
            "shutting-down",
            "terminated",
        ] {
            assert_eq!(InstanceState::from(name).as_str(), name);
        }

        let odd = InstanceState::from("hibernating");
        assert_eq!(odd, InstanceState::Unknown("hibernating".to_string()));
        assert_eq!(odd.to_string(), "hibernating");
    }

    #[test]
    fn test_state_filter() {
        assert!(StateFilter::Any.matches(&InstanceState::Terminated));
        assert!(StateFilter::Running.matches(&InstanceState::Running));
        assert!(!StateFilter::Running.matches(&InstanceState::Pending));
        assert!(StateFilter::Stopped.matches(&InstanceState::Stopped));
        assert!(!StateFilter::Stopped.matches(&InstanceState::Stopping));
    }

    #[test]
    fn test_name_comes_from_name_tag() {
        assert_eq!(tagged("i-1", "web-1").name(), "web-1");
        assert_eq!(Instance::new("i-2", InstanceState::Stopped).name(), "");
    }

    #[test]
    fn test_volume_ids_skip_unsettled_mappings() {
        let mut instance = tagged("i-1", "db");
        instance.block_devices = vec![
            BlockDevice {
                device_name: "/dev/xvda".to_string(),
                volume_id: Some("vol-a".to_string()),
            },
            BlockDevice {
                device_name: "/dev/xvdb".to_string(),
                volume_id: None,
            },
        ];

        assert_eq!(instance.volume_ids(), vec!["vol-a".to_string()]);
    }

    #[test]
    fn test_instance_serde_keeps_unknown_attributes() {
        let json = r#"{
            "instance_id": "i-0abc",
            "state": "stopped",
            "instance_type": "t3.micro",
            "tags": [{"key": "Name", "value": "db"}],
            "image_id": "ami-123",
            "placement": {"availability_zone": "us-east-1a"}
        }"#;

        let instance: Instance = serde_json::from_str(json).unwrap();
        assert_eq!(instance.state, InstanceState::Stopped);
        assert_eq!(instance.name(), "db");
        assert_eq!(instance.attributes["image_id"], "ami-123");

        let back = serde_json::to_value(&instance).unwrap();
        assert_eq!(back["placement"]["availability_zone"], "us-east-1a");
        assert_eq!(back["state"], "stopped");
    }

    #[test]
    fn test_address_association() {
        let mut address = Address {
            allocation_id: "eipalloc-1".to_string(),
            association_id: None,
            public_ip: "54.0.0.1".to_string(),
            instance_id: None,
            name: String::new(),
        };
        assert!(!address.is_associated());

        address.association_id = Some("eipassoc-1".to_string());
        address.instance_id = Some("i-1".to_string());
        assert!(address.is_associated());
    }
}

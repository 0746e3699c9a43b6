//! In-memory gateway and scripted picker for unit tests

use async_trait::async_trait;
use ec2kit_core::{
    Address, AllocatedAddress, BlockDevice, ComputeGateway, Ec2KitError, Instance, InstanceState,
    LaunchRequest, Picker, Result, StateChange, Tag, NAME_TAG,
};
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Build a named instance record
pub(crate) fn instance(id: &str, name: &str, state: InstanceState) -> Instance {
    let mut instance = Instance::new(id, state);
    instance.instance_type = "t3.micro".to_string();
    if !name.is_empty() {
        instance.tags.push(Tag::new(NAME_TAG, name));
    }
    instance
}

/// Build an address record, bound when `instance_id` is given
pub(crate) fn address(allocation_id: &str, ip: &str, instance_id: Option<&str>) -> Address {
    Address {
        allocation_id: allocation_id.to_string(),
        association_id: instance_id.map(|_| format!("eipassoc-{allocation_id}")),
        public_ip: ip.to_string(),
        instance_id: instance_id.map(str::to_string),
        name: String::new(),
    }
}

#[derive(Default)]
pub(crate) struct FakeState {
    pub instances: Vec<Instance>,
    pub addresses: Vec<Address>,
    /// Operation names in call order
    pub calls: Vec<String>,
    pub run_requests: Vec<(LaunchRequest, bool)>,
    pub tag_calls: Vec<(Vec<String>, Vec<Tag>)>,
    pub deleted_tags: Vec<(Vec<String>, Vec<String>)>,
    pub associations: Vec<(String, String)>,
    /// Operations that fail with a remote error
    pub failing: HashSet<&'static str>,
    /// Number of by-id reads that report no volumes yet
    pub hidden_volume_reads: usize,
    next_id: usize,
}

/// [`ComputeGateway`] over an in-memory fleet
///
/// Launched instances come back from `run_instances` without a public IP
/// or volumes, the way the real API reports them; the stored copies have
/// both so a later describe sees them.
pub(crate) struct FakeGateway {
    region: String,
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn with_instances(self, instances: Vec<Instance>) -> Self {
        self.state().instances = instances;
        self
    }

    pub fn with_addresses(self, addresses: Vec<Address>) -> Self {
        self.state().addresses = addresses;
        self
    }

    pub fn failing(self, operation: &'static str) -> Self {
        self.state().failing.insert(operation);
        self
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.state().calls.iter().filter(|c| *c == operation).count()
    }

    fn record(&self, operation: &'static str, target: &str) -> Result<MutexGuard<'_, FakeState>> {
        let mut state = self.state();
        state.calls.push(operation.to_string());
        if state.failing.contains(operation) {
            return Err(remote(operation, target, "FakeFailure"));
        }
        Ok(state)
    }
}

fn remote(operation: &'static str, target: &str, code: &str) -> Ec2KitError {
    Ec2KitError::Remote {
        operation,
        target: target.to_string(),
        code: Some(code.to_string()),
        message: format!("{code} from fake gateway"),
    }
}

fn transition(
    state: &mut FakeState,
    ids: &[String],
    to: InstanceState,
) -> Vec<StateChange> {
    state
        .instances
        .iter_mut()
        .filter(|i| ids.contains(&i.instance_id))
        .map(|i| {
            let previous = std::mem::replace(&mut i.state, to.clone());
            StateChange {
                instance_id: i.instance_id.clone(),
                previous,
                current: to.clone(),
            }
        })
        .collect()
}

#[async_trait]
impl ComputeGateway for FakeGateway {
    fn region(&self) -> &str {
        &self.region
    }

    async fn describe_instances(&self) -> Result<Vec<Instance>> {
        let state = self.record("DescribeInstances", &self.region)?;
        Ok(state.instances.clone())
    }

    async fn describe_instances_by_id(&self, ids: &[String]) -> Result<Vec<Instance>> {
        let mut state = self.record("DescribeInstancesById", &ids.join(","))?;
        let hide_volumes = state.hidden_volume_reads > 0;
        if hide_volumes {
            state.hidden_volume_reads -= 1;
        }

        Ok(state
            .instances
            .iter()
            .filter(|i| ids.contains(&i.instance_id))
            .cloned()
            .map(|mut i| {
                if hide_volumes {
                    i.block_devices.clear();
                }
                i
            })
            .collect())
    }

    async fn start_instances(&self, ids: &[String]) -> Result<Vec<StateChange>> {
        let mut state = self.record("StartInstances", &ids.join(","))?;
        Ok(transition(&mut state, ids, InstanceState::Pending))
    }

    async fn stop_instances(&self, ids: &[String]) -> Result<Vec<StateChange>> {
        let mut state = self.record("StopInstances", &ids.join(","))?;
        Ok(transition(&mut state, ids, InstanceState::Stopping))
    }

    async fn terminate_instances(&self, ids: &[String], dry_run: bool) -> Result<Vec<StateChange>> {
        let mut state = self.record("TerminateInstances", &ids.join(","))?;
        if dry_run {
            return Err(remote("TerminateInstances", &ids.join(","), "DryRunOperation"));
        }
        Ok(transition(&mut state, ids, InstanceState::ShuttingDown))
    }

    async fn modify_instance_type(&self, id: &str, instance_type: &str) -> Result<()> {
        let mut state = self.record("ModifyInstanceAttribute", id)?;
        for i in state.instances.iter_mut().filter(|i| i.instance_id == id) {
            i.instance_type = instance_type.to_string();
        }
        Ok(())
    }

    async fn run_instances(&self, request: &LaunchRequest, dry_run: bool) -> Result<Vec<Instance>> {
        let mut state = self.record("RunInstances", &request.image_id)?;
        state.run_requests.push((request.clone(), dry_run));
        if dry_run {
            return Err(remote("RunInstances", &request.image_id, "DryRunOperation"));
        }

        let mut launched = Vec::new();
        for _ in 0..request.count {
            state.next_id += 1;
            let n = state.next_id;

            let mut created = Instance::new(format!("i-{n:017x}"), InstanceState::Pending);
            created.instance_type = request.instance_type.clone();
            created.private_ip = Some(format!("10.0.0.{n}"));

            let mut stored = created.clone();
            if request.public_ip_enabled {
                stored.public_ip = Some(format!("54.0.0.{n}"));
            }
            stored.block_devices = if request.ebs_devices.is_empty() {
                vec![BlockDevice {
                    device_name: "/dev/xvda".to_string(),
                    volume_id: Some(format!("vol-{n}")),
                }]
            } else {
                request
                    .ebs_devices
                    .iter()
                    .enumerate()
                    .map(|(i, ebs)| BlockDevice {
                        device_name: ebs.device_name.clone(),
                        volume_id: Some(format!("vol-{n}-{i}")),
                    })
                    .collect()
            };

            state.instances.push(stored);
            launched.push(created);
        }

        Ok(launched)
    }

    async fn create_tags(&self, resources: &[String], tags: &[Tag]) -> Result<()> {
        let mut state = self.record("CreateTags", &resources.join(","))?;
        state.tag_calls.push((resources.to_vec(), tags.to_vec()));
        for i in state
            .instances
            .iter_mut()
            .filter(|i| resources.contains(&i.instance_id))
        {
            for tag in tags {
                i.tags.retain(|t| t.key != tag.key);
                i.tags.push(tag.clone());
            }
        }
        Ok(())
    }

    async fn delete_tags(&self, resources: &[String], keys: &[String]) -> Result<()> {
        let mut state = self.record("DeleteTags", &resources.join(","))?;
        state.deleted_tags.push((resources.to_vec(), keys.to_vec()));
        for i in state
            .instances
            .iter_mut()
            .filter(|i| resources.contains(&i.instance_id))
        {
            i.tags.retain(|t| !keys.contains(&t.key));
        }
        Ok(())
    }

    async fn describe_addresses(&self) -> Result<Vec<Address>> {
        let state = self.record("DescribeAddresses", &self.region)?;
        Ok(state.addresses.clone())
    }

    async fn describe_addresses_for_instance(&self, instance_id: &str) -> Result<Vec<Address>> {
        let state = self.record("DescribeAddressesForInstance", instance_id)?;
        Ok(state
            .addresses
            .iter()
            .filter(|a| a.instance_id.as_deref() == Some(instance_id))
            .cloned()
            .collect())
    }

    async fn allocate_address(&self) -> Result<AllocatedAddress> {
        let mut state = self.record("AllocateAddress", &self.region)?;
        state.next_id += 1;
        let n = state.next_id;
        let allocated = AllocatedAddress {
            allocation_id: format!("eipalloc-new{n}"),
            public_ip: format!("54.1.0.{n}"),
        };
        state.addresses.push(address(
            &allocated.allocation_id,
            &allocated.public_ip,
            None,
        ));
        Ok(allocated)
    }

    async fn associate_address(&self, allocation_id: &str, instance_id: &str) -> Result<String> {
        let mut state = self.record("AssociateAddress", allocation_id)?;
        state
            .associations
            .push((allocation_id.to_string(), instance_id.to_string()));

        let association_id = format!("eipassoc-{allocation_id}");
        let address = state
            .addresses
            .iter_mut()
            .find(|a| a.allocation_id == allocation_id)
            .ok_or_else(|| remote("AssociateAddress", allocation_id, "InvalidAllocationID.NotFound"))?;
        address.association_id = Some(association_id.clone());
        address.instance_id = Some(instance_id.to_string());
        Ok(association_id)
    }

    async fn disassociate_address(&self, association_id: &str) -> Result<()> {
        let mut state = self.record("DisassociateAddress", association_id)?;
        let address = state
            .addresses
            .iter_mut()
            .find(|a| a.association_id.as_deref() == Some(association_id))
            .ok_or_else(|| {
                remote("DisassociateAddress", association_id, "InvalidAssociationID.NotFound")
            })?;
        address.association_id = None;
        address.instance_id = None;
        Ok(())
    }

    async fn release_address(&self, allocation_id: &str) -> Result<()> {
        let mut state = self.record("ReleaseAddress", allocation_id)?;
        let position = state
            .addresses
            .iter()
            .position(|a| a.allocation_id == allocation_id)
            .ok_or_else(|| remote("ReleaseAddress", allocation_id, "InvalidAllocationID.NotFound"))?;
        if state.addresses[position].is_associated() {
            return Err(remote("ReleaseAddress", allocation_id, "InvalidIPAddress.InUse"));
        }
        state.addresses.remove(position);
        Ok(())
    }
}

/// [`Picker`] replaying canned answers, recording what it was shown
///
/// Unscripted confirmations answer `false`.
#[derive(Default)]
pub(crate) struct ScriptedPicker {
    answers: Mutex<VecDeque<Vec<usize>>>,
    confirmations: Mutex<VecDeque<bool>>,
    shown: Mutex<Vec<(String, Vec<String>)>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPicker {
    pub fn answering(answers: Vec<Vec<usize>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            ..Self::default()
        }
    }

    pub fn confirming(self, confirmations: Vec<bool>) -> Self {
        *self.confirmations.lock().unwrap() = confirmations.into();
        self
    }

    /// Labels and item lists presented so far
    pub fn shown(&self) -> Vec<(String, Vec<String>)> {
        self.shown.lock().unwrap().clone()
    }

    /// Confirmation questions asked so far
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl Picker for ScriptedPicker {
    fn pick(&self, label: &str, _prompt: &str, items: &[String]) -> Result<Vec<usize>> {
        self.shown
            .lock()
            .unwrap()
            .push((label.to_string(), items.to_vec()));
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or_default())
    }

    fn confirm(&self, message: &str, _default: bool) -> Result<bool> {
        self.asked.lock().unwrap().push(message.to_string());
        Ok(self.confirmations.lock().unwrap().pop_front().unwrap_or(false))
    }
}

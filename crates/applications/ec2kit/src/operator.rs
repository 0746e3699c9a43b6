//! Operator workflows behind the commands
//!
//! Each workflow resolves its targets (explicit id or a pick from the
//! inventory cache), asks for confirmation where told to, then acts through
//! the gateway. A declined confirmation yields `Ok(None)`.

use crate::address::{AddressManager, Attachment};
use crate::cache::{InventoryCache, INSTANCE_LABEL};
use crate::config::validate_instance_id;
use crate::selector::{self, AddressEntry, Selectable, Selector};
use ec2kit_core::{
    Address, ComputeGateway, Ec2KitError, Picker, Result, StateChange, StateFilter, Tag,
};
use std::fmt;
use tracing::info;

/// An address bound to an instance by attach or move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Associated {
    pub association_id: String,
    pub public_ip: String,
    pub instance_id: String,
}

impl fmt::Display for Associated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "associated association_id:{}\tpublic_ip:{}\tinstance_id:{}",
            self.association_id, self.public_ip, self.instance_id
        )
    }
}

/// Parse `Key1=Value1,Key2=Value2`
pub fn parse_tag_pairs(pairs: &str) -> Result<Vec<Tag>> {
    pairs
        .split(',')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok(Tag::new(key, value)),
            _ => Err(Ec2KitError::InvalidInput(format!(
                "tag pair {pair:?} is not Key=Value"
            ))),
        })
        .collect()
}

/// Parse `Key1,Key2`
pub fn parse_keys(keys: &str) -> Vec<String> {
    keys.split(',')
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

fn log_changes(verb: &str, changes: &[StateChange]) {
    for change in changes {
        info!("{} {}: {} -> {}", verb, change.instance_id, change.previous, change.current);
    }
}

/// Runs the interactive workflows against one region
pub struct Operator<'a, G: ComputeGateway + ?Sized, P: Picker + ?Sized> {
    gateway: &'a G,
    picker: &'a P,
    cache: InventoryCache,
    reload: bool,
}

impl<'a, G: ComputeGateway + ?Sized, P: Picker + ?Sized> Operator<'a, G, P> {
    /// Picks reload the inventory unless [`Operator::with_cached_picks`]
    pub fn new(gateway: &'a G, picker: &'a P, cache: InventoryCache) -> Self {
        Self {
            gateway,
            picker,
            cache,
            reload: true,
        }
    }

    pub fn with_cached_picks(mut self, use_cache: bool) -> Self {
        self.reload = !use_cache;
        self
    }

    /// Let the operator pick instances in `filter`
    pub async fn pick_instances(&self, filter: StateFilter) -> Result<Vec<String>> {
        let entries = self
            .cache
            .load_or_refresh(self.gateway, filter, self.reload)
            .await?;
        let chosen =
            Selector::new(self.picker).choose(INSTANCE_LABEL, "select instances", entries)?;
        Ok(selector::values(&chosen))
    }

    pub async fn pick_instance(&self, filter: StateFilter) -> Result<String> {
        let entries = self
            .cache
            .load_or_refresh(self.gateway, filter, self.reload)
            .await?;
        let chosen =
            Selector::new(self.picker).choose_one(INSTANCE_LABEL, "select an instance", entries)?;
        Ok(chosen.value().to_string())
    }

    /// Explicit id, or the operator's picks
    async fn targets(&self, instance_id: Option<String>, filter: StateFilter) -> Result<Vec<String>> {
        match instance_id {
            Some(id) => Ok(vec![id]),
            None => self.pick_instances(filter).await,
        }
    }

    /// Explicit (validated) id, or a single pick from any state
    async fn target(&self, instance_id: Option<String>) -> Result<String> {
        match instance_id {
            Some(id) => {
                validate_instance_id(&id)?;
                Ok(id)
            }
            None => self.pick_instance(StateFilter::Any).await,
        }
    }

    /// Print the targets of a destructive action, then ask
    async fn confirm_targets(&self, ids: &[String], question: &str) -> Result<bool> {
        let instances = self.gateway.describe_instances_by_id(ids).await?;

        for instance in &instances {
            let name = match instance.name() {
                "" => "[no Name tag instance]",
                name => name,
            };
            eprintln!(
                "{}\t{}\t{}\t{}",
                instance.instance_id,
                name,
                instance.instance_type,
                instance.private_ip.as_deref().unwrap_or_default()
            );
        }

        self.picker.confirm(question, false)
    }

    /// Start stopped instances
    pub async fn start(
        &self,
        instance_id: Option<String>,
        ask: bool,
    ) -> Result<Option<Vec<StateChange>>> {
        let ids = self.targets(instance_id, StateFilter::Stopped).await?;

        if ask && !self.confirm_targets(&ids, "start above instances?").await? {
            info!("Canceled instance start action");
            return Ok(None);
        }

        let changes = self.gateway.start_instances(&ids).await?;
        log_changes("started", &changes);
        Ok(Some(changes))
    }

    /// Stop running instances
    pub async fn stop(
        &self,
        instance_id: Option<String>,
        ask: bool,
    ) -> Result<Option<Vec<StateChange>>> {
        let ids = self.targets(instance_id, StateFilter::Running).await?;

        if ask && !self.confirm_targets(&ids, "stop above instances?").await? {
            info!("Canceled instance stop action");
            return Ok(None);
        }

        let changes = self.gateway.stop_instances(&ids).await?;
        log_changes("stopped", &changes);
        Ok(Some(changes))
    }

    /// Change the type of stopped instances, optionally starting them
    ///
    /// Returns the changed instance ids.
    pub async fn change_type(
        &self,
        instance_id: Option<String>,
        instance_type: Option<String>,
        start: bool,
        ask: bool,
    ) -> Result<Option<Vec<String>>> {
        let ids = self.targets(instance_id, StateFilter::Stopped).await?;

        let instance_type = match instance_type {
            Some(t) => t,
            None => Selector::new(self.picker)
                .choose_one(
                    "instance type",
                    "select instance type",
                    selector::instance_type_choices(),
                )?
                .value()
                .to_string(),
        };

        let question = format!("change above instances to {instance_type}?");
        if ask && !self.confirm_targets(&ids, &question).await? {
            info!("Canceled instance type change action");
            return Ok(None);
        }

        for id in &ids {
            self.gateway.modify_instance_type(id, &instance_type).await?;
            info!("✅ {} instance type changed to {}", id, instance_type);

            if start {
                let changes = self
                    .gateway
                    .start_instances(std::slice::from_ref(id))
                    .await?;
                log_changes("started", &changes);
            }
        }
        Ok(Some(ids))
    }

    /// Terminate instances; stopped ones are offered unless `any_state`
    ///
    /// A dry run that the API accepts comes back as an empty change list.
    pub async fn terminate(
        &self,
        instance_id: Option<String>,
        dry_run: bool,
        ask: bool,
        any_state: bool,
    ) -> Result<Option<Vec<StateChange>>> {
        let filter = if any_state {
            StateFilter::Any
        } else {
            StateFilter::Stopped
        };
        let ids = self.targets(instance_id, filter).await?;

        if ask
            && !self
                .confirm_targets(&ids, "you really want to terminate above instances?")
                .await?
        {
            info!("Canceled instance termination");
            return Ok(None);
        }

        match self.gateway.terminate_instances(&ids, dry_run).await {
            Ok(changes) => {
                log_changes("terminated", &changes);
                Ok(Some(changes))
            }
            Err(e) if dry_run && e.remote_code() == Some("DryRunOperation") => {
                info!("Dry run succeeded, pass --execute to terminate {}", ids.join(", "));
                Ok(Some(Vec::new()))
            }
            Err(e) => Err(e),
        }
    }

    /// Set and delete tags; running instances are offered unless `any_state`
    ///
    /// At least one tag or key is required, checked before any pick.
    /// Returns the tagged instance ids.
    pub async fn tag(
        &self,
        instance_id: Option<String>,
        tags: &[Tag],
        delete_keys: &[String],
        any_state: bool,
    ) -> Result<Vec<String>> {
        if tags.is_empty() && delete_keys.is_empty() {
            return Err(Ec2KitError::InvalidInput(
                "specify --pairs and/or --delete-keys".to_string(),
            ));
        }

        let filter = if any_state {
            StateFilter::Any
        } else {
            StateFilter::Running
        };
        let ids = self.targets(instance_id, filter).await?;

        if !tags.is_empty() {
            self.gateway.create_tags(&ids, tags).await?;
            info!("Tagged {} instance(s)", ids.len());
        }
        if !delete_keys.is_empty() {
            self.gateway.delete_tags(&ids, delete_keys).await?;
            info!("Deleted tags {} from {} instance(s)", delete_keys.join(","), ids.len());
        }
        Ok(ids)
    }

    /// Give an instance an address, reusing a free one if asked
    pub async fn attach_address(&self, instance_id: Option<String>, reuse: bool) -> Result<Associated> {
        let instance_id = self.target(instance_id).await?;

        let Attachment {
            association_id,
            public_ip,
            ..
        } = AddressManager::new(self.gateway)
            .attach(&instance_id, reuse)
            .await?;

        Ok(Associated {
            association_id,
            public_ip,
            instance_id,
        })
    }

    /// Pick an address and a target instance, then rebind the address
    pub async fn move_address(&self, ask: bool) -> Result<Option<Associated>> {
        let manager = AddressManager::new(self.gateway);

        let addresses: Vec<AddressEntry> =
            manager.list().await?.into_iter().map(AddressEntry).collect();
        let AddressEntry(address) =
            Selector::new(self.picker).choose_one("EIP", "select EIP", addresses)?;
        let instance_id = self.pick_instance(StateFilter::Any).await?;

        if ask {
            let target = self
                .gateway
                .describe_instances_by_id(std::slice::from_ref(&instance_id))
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    Ec2KitError::invariant(format!("{instance_id} no longer exists, please retry"))
                })?;

            eprintln!("{} '{}' -> '{}'", address.public_ip, address.name, target.name());
            if !self.picker.confirm("move above EIP?", false)? {
                info!("Canceled move EIP action");
                return Ok(None);
            }
        }

        let association_id = manager.move_to(&address, &instance_id).await?;
        Ok(Some(Associated {
            association_id,
            public_ip: address.public_ip,
            instance_id,
        }))
    }

    /// Unbind an instance's address, releasing it unless told to keep it
    ///
    /// Returns the address as it was before detaching.
    pub async fn detach_address(
        &self,
        instance_id: Option<String>,
        release: bool,
        ask: bool,
    ) -> Result<Option<Address>> {
        let instance_id = self.target(instance_id).await?;

        let manager = AddressManager::new(self.gateway);
        let address = manager.find_by_instance(&instance_id).await?;

        if ask {
            let name = self
                .gateway
                .describe_instances_by_id(std::slice::from_ref(&instance_id))
                .await?
                .first()
                .map(|i| i.name().to_string())
                .unwrap_or_default();

            eprintln!("{}\t{}", name, address.public_ip);
            if !self.picker.confirm("you really want to detach above EIP?", false)? {
                info!("Canceled detach EIP action");
                return Ok(None);
            }
        }

        manager.detach(&address, release).await?;
        Ok(Some(address))
    }
}

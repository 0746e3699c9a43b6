//! Elastic address lifecycle
//!
//! Primitive operations map one-to-one onto gateway calls. The composite
//! workflows (attach, move, detach) sequence them; an address is always
//! disassociated before it is released.

use ec2kit_core::{Address, AllocatedAddress, ComputeGateway, Ec2KitError, Result};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Result of [`AddressManager::attach`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub association_id: String,
    pub allocation_id: String,
    pub public_ip: String,
    /// An existing unassociated address was used
    pub reused: bool,
}

/// Allocate, bind, unbind and release elastic addresses
pub struct AddressManager<'a, G: ComputeGateway + ?Sized> {
    gateway: &'a G,
}

impl<'a, G: ComputeGateway + ?Sized> AddressManager<'a, G> {
    pub fn new(gateway: &'a G) -> Self {
        Self { gateway }
    }

    /// Allocate a new VPC address
    pub async fn allocate(&self) -> Result<AllocatedAddress> {
        let allocated = self.gateway.allocate_address().await?;
        info!("✅ Allocated {} ({})", allocated.public_ip, allocated.allocation_id);
        Ok(allocated)
    }

    /// Bind an address to an instance, rebinding it if already bound
    pub async fn associate(&self, allocation_id: &str, instance_id: &str) -> Result<String> {
        let association_id = self
            .gateway
            .associate_address(allocation_id, instance_id)
            .await?;
        debug!(allocation_id, instance_id, %association_id, "Associated");
        Ok(association_id)
    }

    /// Unbind an address; it stays allocated
    pub async fn disassociate(&self, association_id: &str) -> Result<()> {
        self.gateway.disassociate_address(association_id).await?;
        debug!(association_id, "Disassociated");
        Ok(())
    }

    /// Release an allocation; callers disassociate first
    pub async fn release(&self, allocation_id: &str) -> Result<()> {
        self.gateway.release_address(allocation_id).await?;
        info!("🗑️  Released {}", allocation_id);
        Ok(())
    }

    /// Release a known address, refusing while it is still bound
    pub async fn release_address(&self, address: &Address) -> Result<()> {
        if address.is_associated() {
            return Err(Ec2KitError::invariant(format!(
                "{} ({}) is still associated, disassociate it before releasing",
                address.public_ip, address.allocation_id
            )));
        }
        self.release(&address.allocation_id).await
    }

    /// First address with no bound instance, if any
    pub async fn find_unassociated(&self) -> Result<Option<Address>> {
        let addresses = self.gateway.describe_addresses().await?;
        Ok(addresses.into_iter().find(|a| a.instance_id.is_none()))
    }

    /// The single address bound to `instance_id`
    pub async fn find_by_instance(&self, instance_id: &str) -> Result<Address> {
        let mut addresses = self
            .gateway
            .describe_addresses_for_instance(instance_id)
            .await?;

        match addresses.len() {
            1 => Ok(addresses.remove(0)),
            0 => Err(Ec2KitError::invariant(format!(
                "{instance_id} has no elastic address"
            ))),
            n => Err(Ec2KitError::invariant(format!(
                "{instance_id} has {n} elastic addresses, expected exactly one"
            ))),
        }
    }

    /// All addresses, named after their bound instance
    ///
    /// Names come from a fresh instance listing, never from the cache.
    pub async fn list(&self) -> Result<Vec<Address>> {
        let mut addresses = self.gateway.describe_addresses().await?;
        let instances = self.gateway.describe_instances().await?;

        let names: HashMap<&str, &str> = instances
            .iter()
            .map(|i| (i.instance_id.as_str(), i.name()))
            .collect();

        for address in &mut addresses {
            if let Some(id) = &address.instance_id {
                address.name = names.get(id.as_str()).copied().unwrap_or_default().to_string();
            }
        }

        Ok(addresses)
    }

    /// Give `instance_id` an address: reuse a free one if asked, else allocate
    pub async fn attach(&self, instance_id: &str, reuse: bool) -> Result<Attachment> {
        let mut reused = None;
        if reuse {
            match self.find_unassociated().await {
                Ok(Some(address)) => reused = Some(address),
                Ok(None) => info!("No unassociated address, allocating a new one"),
                Err(e) => warn!("⚠️  Failed to look up unassociated addresses, allocating: {}", e),
            }
        }

        let (allocation_id, public_ip, reused) = match reused {
            Some(address) => (address.allocation_id, address.public_ip, true),
            None => {
                let allocated = self.allocate().await?;
                (allocated.allocation_id, allocated.public_ip, false)
            }
        };

        let association_id = self.associate(&allocation_id, instance_id).await?;
        info!("✅ Attached {} to {}", public_ip, instance_id);

        Ok(Attachment {
            association_id,
            allocation_id,
            public_ip,
            reused,
        })
    }

    /// Rebind `address` to `instance_id` without disassociating first
    pub async fn move_to(&self, address: &Address, instance_id: &str) -> Result<String> {
        let association_id = self.associate(&address.allocation_id, instance_id).await?;
        info!(
            "✅ Moved {} from {} to {}",
            address.public_ip,
            address.instance_id.as_deref().unwrap_or("(unassociated)"),
            instance_id
        );
        Ok(association_id)
    }

    /// Unbind `address`, then release it unless told to keep it
    pub async fn detach(&self, address: &Address, release: bool) -> Result<()> {
        let association_id = address.association_id.as_deref().ok_or_else(|| {
            Ec2KitError::invariant(format!(
                "{} ({}) has no association",
                address.public_ip, address.allocation_id
            ))
        })?;

        self.disassociate(association_id).await?;
        info!("✅ Detached {}", address.public_ip);

        if release {
            let unbound = Address {
                association_id: None,
                instance_id: None,
                ..address.clone()
            };
            self.release_address(&unbound).await?;
        }
        Ok(())
    }
}

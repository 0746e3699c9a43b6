//! Command handlers
//!
//! Handlers connect to EC2, hand the workflow to an [`Operator`] on the
//! terminal picker and print the results. Declining a confirmation ends the
//! command without an error.

use anyhow::{Context as _, Result};
use ec2kit::billing;
use ec2kit::cache::{InventoryCache, SnapshotStore};
use ec2kit::config::{Ec2KitConfig, Profile};
use ec2kit::launch::{self, LaunchOptions, Launcher};
use ec2kit::operator::{parse_keys, parse_tag_pairs};
use ec2kit::selector::{self, Selectable, Selector};
use ec2kit::{Ec2Gateway, Ec2KitError, Operator, StdinPicker};
use ec2kit_core::StateFilter;
use std::path::{Path, PathBuf};
use tracing::info;

/// Resolved settings shared by the region-bound commands
pub struct Context {
    pub region: String,
    pub profile: Option<String>,
    pub dir: PathBuf,
    pub use_cache: bool,
}

impl Context {
    async fn gateway(&self) -> Ec2Gateway {
        Ec2Gateway::connect(&self.region, self.profile.as_deref()).await
    }

    fn cache(&self) -> InventoryCache {
        InventoryCache::new(SnapshotStore::new(&self.dir))
    }

    fn operator<'a>(&self, gateway: &'a Ec2Gateway) -> Operator<'a, Ec2Gateway, StdinPicker> {
        Operator::new(gateway, &StdinPicker, self.cache()).with_cached_picks(self.use_cache)
    }
}

pub fn init(dir: &Path, existing: Option<Ec2KitConfig>) -> Result<()> {
    let region = Selector::new(&StdinPicker).choose_one(
        "region",
        "select default region",
        selector::region_choices(),
    )?;

    let profile_name = existing.and_then(|c| c.default.profile_name);
    let config = Ec2KitConfig {
        default: Profile {
            profile_name,
            aws_region: region.value().to_string(),
        },
    };
    config.save(dir).context("saving config.toml")?;

    info!("✅ Default region {} saved to {}", region.value(), Ec2KitConfig::path(dir).display());
    Ok(())
}

pub async fn ec2list(ctx: &Context, force: bool, tsv: bool) -> Result<()> {
    let gateway = ctx.gateway().await;
    let entries = match ctx.cache().load_or_refresh(&gateway, StateFilter::Any, force).await {
        Ok(entries) => entries,
        Err(Ec2KitError::NothingToSelect(_)) => {
            info!("No instances in {}", ctx.region);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        if tsv {
            println!("{}", entry.tsv());
        } else {
            println!("{}", entry.display());
        }
    }
    Ok(())
}

pub async fn ec2start(ctx: &Context, instance_id: Option<String>, ask: bool) -> Result<()> {
    let gateway = ctx.gateway().await;
    ctx.operator(&gateway).start(instance_id, ask).await?;
    Ok(())
}

pub async fn ec2stop(ctx: &Context, instance_id: Option<String>, ask: bool) -> Result<()> {
    let gateway = ctx.gateway().await;
    ctx.operator(&gateway).stop(instance_id, ask).await?;
    Ok(())
}

pub async fn ec2type(
    ctx: &Context,
    instance_id: Option<String>,
    instance_type: Option<String>,
    start: bool,
    ask: bool,
) -> Result<()> {
    let gateway = ctx.gateway().await;
    ctx.operator(&gateway)
        .change_type(instance_id, instance_type, start, ask)
        .await?;
    Ok(())
}

pub fn write_skeleton(path: &Path) -> Result<()> {
    launch::write_skeleton(path)
        .with_context(|| format!("can not store skeleton to {}", path.display()))?;
    info!("✅ Skeleton written to {}", path.display());
    Ok(())
}

pub async fn ec2run(ctx: &Context, files: &[PathBuf], options: &LaunchOptions) -> Result<()> {
    if files.is_empty() {
        anyhow::bail!("a launch specification file is required");
    }

    let specs = launch::load_specifications(files)?;
    let gateway = ctx.gateway().await;

    let report = Launcher::new(&gateway)
        .launch_all(&specs, options, &mut std::io::stdout().lock())
        .await?;

    if !report.is_success() {
        for failure in &report.failures {
            tracing::error!(
                "{} #{} failed: {}",
                failure.specification,
                failure.sequence,
                failure.error
            );
        }
        anyhow::bail!("{} launch(es) failed", report.failures.len());
    }
    Ok(())
}

pub async fn ec2terminate(
    ctx: &Context,
    instance_id: Option<String>,
    dry_run: bool,
    ask: bool,
    any_state: bool,
) -> Result<()> {
    let gateway = ctx.gateway().await;
    ctx.operator(&gateway)
        .terminate(instance_id, dry_run, ask, any_state)
        .await?;
    Ok(())
}

pub async fn ec2tag(
    ctx: &Context,
    instance_id: Option<String>,
    pairs: Option<String>,
    delete_keys: Option<String>,
    any_state: bool,
) -> Result<()> {
    let tags = pairs.as_deref().map(parse_tag_pairs).transpose()?.unwrap_or_default();
    let keys = delete_keys.as_deref().map(parse_keys).unwrap_or_default();

    let gateway = ctx.gateway().await;
    ctx.operator(&gateway)
        .tag(instance_id, &tags, &keys, any_state)
        .await?;
    Ok(())
}

pub async fn attach_eip(ctx: &Context, instance_id: Option<String>, reuse: bool) -> Result<()> {
    let gateway = ctx.gateway().await;
    let associated = ctx
        .operator(&gateway)
        .attach_address(instance_id, reuse)
        .await?;
    println!("{associated}");
    Ok(())
}

pub async fn move_eip(ctx: &Context, ask: bool) -> Result<()> {
    let gateway = ctx.gateway().await;
    if let Some(associated) = ctx.operator(&gateway).move_address(ask).await? {
        println!("{associated}");
    }
    Ok(())
}

pub async fn detach_eip(
    ctx: &Context,
    instance_id: Option<String>,
    release: bool,
    ask: bool,
) -> Result<()> {
    let gateway = ctx.gateway().await;
    ctx.operator(&gateway)
        .detach_address(instance_id, release, ask)
        .await
        .context("failed to detach the EIP of the instance")?;
    Ok(())
}

pub async fn billing_price(profile: Option<&str>) -> Result<()> {
    let billing = billing::estimated_charges(profile)
        .await
        .context("failed to get billing price")?;
    println!("{billing}");
    Ok(())
}

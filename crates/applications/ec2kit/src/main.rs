//! ec2kit - operator commands for EC2 instances and elastic addresses
//!
//! ## Usage
//!
//! ```bash
//! # Pick the default region once
//! ec2kit init
//!
//! # List instances (cached per region, -f reloads)
//! ec2kit ls -f
//!
//! # Start / stop / retype / terminate with an interactive picker
//! ec2kit start --confirm
//! ec2kit terminate --execute
//!
//! # Launch instances from YAML launch specifications
//! ec2kit run --skeleton web.yml
//! ec2kit run web.yml --symbol blue
//!
//! # Elastic addresses
//! ec2kit attach-eip --reuse
//! ec2kit move-eip
//! ec2kit detach-eip --without-release
//! ```

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use ec2kit::config::{self, Ec2KitConfig};
use ec2kit::logging::{init_tracing, Verbosity};
use std::path::PathBuf;
use tracing::warn;

mod commands;

use commands::Context;

/// ec2kit: EC2 instance and elastic address operations
#[derive(Parser)]
#[command(name = "ec2kit", version)]
#[command(about = "Operator commands for EC2 instances and elastic addresses", long_about = None)]
struct Cli {
    /// AWS region (default: config.toml)
    #[arg(short, long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// Only print errors
    #[arg(long, global = true)]
    silent: bool,

    /// Print debug output
    #[arg(long, global = true)]
    verbose: bool,

    /// Pickers use the cached inventory instead of reloading it
    #[arg(long, global = true)]
    use_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Choose the default region and write config.toml
    Init,

    /// List instances of the region
    #[command(name = "ec2list", visible_alias = "ls")]
    Ec2List {
        /// Reload from AWS instead of the cache
        #[arg(short, long)]
        force: bool,

        /// Tab separated output
        #[arg(short, long)]
        tsv: bool,
    },

    /// Start stopped instances
    #[command(name = "ec2start", visible_alias = "start")]
    Ec2Start {
        /// Target instance (skips the picker)
        #[arg(long)]
        instance_id: Option<String>,

        /// Confirm targets before starting
        #[arg(long)]
        confirm: bool,
    },

    /// Stop running instances
    #[command(name = "ec2stop", visible_alias = "stop")]
    Ec2Stop {
        /// Target instance (skips the picker)
        #[arg(long)]
        instance_id: Option<String>,

        /// Skip the confirmation
        #[arg(long)]
        without_confirm: bool,
    },

    /// Change the instance type of stopped instances
    #[command(name = "ec2type", visible_alias = "type")]
    Ec2Type {
        /// Target instance (skips the picker)
        #[arg(long)]
        instance_id: Option<String>,

        /// New instance type (skips the type picker)
        #[arg(short = 't', long = "type")]
        instance_type: Option<String>,

        /// Start the instances after the change
        #[arg(long)]
        start: bool,

        /// Confirm targets before changing
        #[arg(long)]
        confirm: bool,
    },

    /// Launch instances from launch specification files
    #[command(name = "ec2run", visible_alias = "run")]
    Ec2Run {
        /// Launch specification YAML files
        files: Vec<PathBuf>,

        /// Ask AWS to validate the launch without creating anything
        #[arg(long)]
        dry_run: bool,

        /// Write an example specification file and exit
        #[arg(long, value_name = "PATH")]
        skeleton: Option<PathBuf>,

        /// Override the image of every specification
        #[arg(long)]
        ami_id: Option<String>,

        /// Override the instance type of every launch
        #[arg(long = "type")]
        instance_type: Option<String>,

        /// Value of {{.Symbol}} in templates
        #[arg(long, default_value = "")]
        symbol: String,

        /// Only launch the specification with this name
        #[arg(long)]
        specify_name: Option<String>,
    },

    /// Terminate instances (dry run unless --execute)
    #[command(name = "ec2terminate", visible_alias = "terminate")]
    Ec2Terminate {
        /// Target instance (skips the picker)
        #[arg(long)]
        instance_id: Option<String>,

        /// Force a dry run even with --execute
        #[arg(long)]
        dry_run: bool,

        /// Really terminate
        #[arg(long)]
        execute: bool,

        /// Skip the confirmation
        #[arg(long)]
        without_confirm: bool,

        /// Offer instances in any state, not only stopped ones
        #[arg(long)]
        ec2_any_state: bool,
    },

    /// Add or delete instance tags
    #[command(name = "ec2tag", visible_alias = "tag")]
    Ec2Tag {
        /// Target instance (skips the picker)
        #[arg(long)]
        instance_id: Option<String>,

        /// Tags to set: Key1=Value1,Key2=Value2
        #[arg(long)]
        pairs: Option<String>,

        /// Tag keys to delete: Key1,Key2
        #[arg(long)]
        delete_keys: Option<String>,

        /// Offer instances in any state, not only running ones
        #[arg(long)]
        ec2_any_state: bool,
    },

    /// Associate an elastic address, allocating one if needed
    AttachEip {
        /// Target instance (skips the picker)
        #[arg(long)]
        instance_id: Option<String>,

        /// Reuse an unassociated address when there is one
        #[arg(long)]
        reuse: bool,

        /// Replaced by move-eip
        #[arg(long = "move", hide = true)]
        move_address: bool,
    },

    /// Move an elastic address to another instance
    MoveEip {
        /// Skip the confirmation
        #[arg(long)]
        without_confirm: bool,
    },

    /// Disassociate an instance's elastic address and release it
    DetachEip {
        /// Target instance (skips the picker)
        #[arg(long)]
        instance_id: Option<String>,

        /// Keep the address allocated
        #[arg(long)]
        without_release: bool,

        /// Skip the confirmation
        #[arg(long)]
        without_confirm: bool,
    },

    /// Show estimated charges (not real time)
    #[command(name = "billing-price", visible_alias = "price")]
    BillingPrice,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(Verbosity::from_flags(cli.silent, cli.verbose));

    let dir = config::data_dir()?;
    if let Err(e) = config::ensure_dir(&dir) {
        warn!("⚠️  Can not create {}: {}", dir.display(), e);
    }

    if let Commands::Init = cli.command {
        let existing = Ec2KitConfig::load(&dir).unwrap_or_else(|e| {
            warn!("⚠️  Ignoring unreadable config: {}", e);
            None
        });
        return commands::init(&dir, existing);
    }

    let settings = Ec2KitConfig::load(&dir).context("loading config.toml")?;
    let profile = settings
        .as_ref()
        .and_then(Ec2KitConfig::profile_name)
        .map(str::to_string);

    // Commands that do not need a region
    match &cli.command {
        Commands::BillingPrice => return commands::billing_price(profile.as_deref()).await,
        Commands::Ec2Run {
            skeleton: Some(path),
            ..
        } => return commands::write_skeleton(path),
        _ => {}
    }

    let region = config::resolve_region(cli.region.as_deref(), settings.as_ref())?;
    let ctx = Context {
        region,
        profile,
        dir,
        use_cache: cli.use_cache,
    };

    match cli.command {
        Commands::Ec2List { force, tsv } => commands::ec2list(&ctx, force, tsv).await,
        Commands::Ec2Start {
            instance_id,
            confirm,
        } => commands::ec2start(&ctx, instance_id, confirm).await,
        Commands::Ec2Stop {
            instance_id,
            without_confirm,
        } => commands::ec2stop(&ctx, instance_id, !without_confirm).await,
        Commands::Ec2Type {
            instance_id,
            instance_type,
            start,
            confirm,
        } => commands::ec2type(&ctx, instance_id, instance_type, start, confirm).await,
        Commands::Ec2Run {
            files,
            dry_run,
            ami_id,
            instance_type,
            symbol,
            specify_name,
            ..
        } => {
            let options = ec2kit::LaunchOptions {
                symbol,
                ami_override: ami_id,
                type_override: instance_type,
                only_name: specify_name,
                dry_run,
            };
            commands::ec2run(&ctx, &files, &options).await
        }
        Commands::Ec2Terminate {
            instance_id,
            dry_run,
            execute,
            without_confirm,
            ec2_any_state,
        } => {
            commands::ec2terminate(
                &ctx,
                instance_id,
                dry_run || !execute,
                !without_confirm,
                ec2_any_state,
            )
            .await
        }
        Commands::Ec2Tag {
            instance_id,
            pairs,
            delete_keys,
            ec2_any_state,
        } => commands::ec2tag(&ctx, instance_id, pairs, delete_keys, ec2_any_state).await,
        Commands::AttachEip {
            instance_id,
            reuse,
            move_address,
        } => {
            if move_address {
                anyhow::bail!("--move was replaced, please use the move-eip subcommand");
            }
            commands::attach_eip(&ctx, instance_id, reuse).await
        }
        Commands::MoveEip { without_confirm } => commands::move_eip(&ctx, !without_confirm).await,
        Commands::DetachEip {
            instance_id,
            without_release,
            without_confirm,
        } => commands::detach_eip(&ctx, instance_id, !without_release, !without_confirm).await,
        Commands::Init | Commands::BillingPrice => Ok(()),
    }
}

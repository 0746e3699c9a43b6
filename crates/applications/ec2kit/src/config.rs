//! Configuration and data directory
//!
//! The data directory (`$EC2KIT_DIR` or `~/.ec2kit`) holds `config.toml`
//! and the inventory snapshots. It is a flat namespace.

use aws_config::{BehaviorVersion, SdkConfig};
use aws_types::region::Region;
use ec2kit_core::{Ec2KitError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the data directory
pub const DIR_ENV: &str = "EC2KIT_DIR";
const DEFAULT_DIR_NAME: &str = ".ec2kit";
const CONFIG_FILE: &str = "config.toml";

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ec2KitConfig {
    pub default: Profile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Shared-credentials profile to use instead of the default chain entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
    #[serde(default)]
    pub aws_region: String,
}

impl Ec2KitConfig {
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(CONFIG_FILE)
    }

    /// Load `config.toml` from `dir`, `None` when it does not exist
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = Self::path(dir);
        if !path.exists() {
            debug!(path = %path.display(), "No config file");
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        let config = toml::from_str(&content)
            .map_err(|e| Ec2KitError::config(format!("{}: {e}", path.display())))?;
        Ok(Some(config))
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        ensure_dir(dir)?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| Ec2KitError::config(format!("serialize config: {e}")))?;
        std::fs::write(Self::path(dir), content)?;
        Ok(())
    }

    pub fn profile_name(&self) -> Option<&str> {
        self.default.profile_name.as_deref().filter(|p| !p.is_empty())
    }
}

/// Data directory from the environment, else `~/.ec2kit`
pub fn data_dir() -> Result<PathBuf> {
    data_dir_from(std::env::var(DIR_ENV).ok())
}

/// Data directory for an optional `EC2KIT_DIR` value
pub fn data_dir_from(env_value: Option<String>) -> Result<PathBuf> {
    let home = || {
        dirs::home_dir().ok_or_else(|| Ec2KitError::config("could not find home directory"))
    };

    match env_value.filter(|v| !v.is_empty()) {
        Some(value) => match value.strip_prefix('~') {
            Some(rest) => Ok(home()?.join(rest.trim_start_matches('/'))),
            None => Ok(PathBuf::from(value)),
        },
        None => Ok(home()?.join(DEFAULT_DIR_NAME)),
    }
}

/// Create the data directory, owner-only on unix
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(dir)?;
    }
    #[cfg(not(unix))]
    std::fs::create_dir_all(dir)?;

    debug!(dir = %dir.display(), "Created data directory");
    Ok(())
}

/// Region from the flag (or `AWS_REGION`), else the config default
pub fn resolve_region(flag: Option<&str>, config: Option<&Ec2KitConfig>) -> Result<String> {
    if let Some(region) = flag.filter(|r| !r.is_empty()) {
        return Ok(region.to_string());
    }

    config
        .map(|c| c.default.aws_region.as_str())
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            Ec2KitError::config(
                "no region: pass --region, set AWS_REGION, or run `ec2kit init`",
            )
        })
}

/// Load AWS SDK configuration for a region
pub async fn load_sdk_config(region: &str, profile: Option<&str>) -> SdkConfig {
    debug!(region, profile, "Loading AWS config");

    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    loader.load().await
}

/// Check an explicit instance id: `i-` and 8 or 17 hex digits
pub fn validate_instance_id(id: &str) -> Result<()> {
    let valid = id.strip_prefix("i-").is_some_and(|hex| {
        matches!(hex.len(), 8 | 17) && hex.chars().all(|c| c.is_ascii_hexdigit())
    });

    if valid {
        Ok(())
    } else {
        Err(Ec2KitError::InvalidInput(format!(
            "{id:?} is not an instance id"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_round_trip() {
        let dir = TempDir::new().unwrap();
        let config = Ec2KitConfig {
            default: Profile {
                profile_name: None,
                aws_region: "ap-northeast-1".to_string(),
            },
        };

        assert_eq!(Ec2KitConfig::load(dir.path()).unwrap(), None);
        config.save(dir.path()).unwrap();
        assert_eq!(Ec2KitConfig::load(dir.path()).unwrap(), Some(config));

        let raw = std::fs::read_to_string(Ec2KitConfig::path(dir.path())).unwrap();
        assert!(raw.contains("[default]"));
        assert!(raw.contains("aws_region = \"ap-northeast-1\""));
    }

    #[test]
    fn test_config_with_profile() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            Ec2KitConfig::path(dir.path()),
            "[default]\nprofile_name = \"ops\"\naws_region = \"us-west-2\"\n",
        )
        .unwrap();

        let config = Ec2KitConfig::load(dir.path()).unwrap().unwrap();
        assert_eq!(config.profile_name(), Some("ops"));
        assert_eq!(config.default.aws_region, "us-west-2");
    }

    #[test]
    fn test_broken_config_is_config_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(Ec2KitConfig::path(dir.path()), "[default\n").unwrap();

        let err = Ec2KitConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, Ec2KitError::Config(_)));
    }

    #[test]
    fn test_save_creates_missing_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested").join("ec2kit");

        Ec2KitConfig::default().save(&nested).unwrap();
        assert!(Ec2KitConfig::path(&nested).exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&nested).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }

    #[test]
    fn test_region_precedence() {
        let config = Ec2KitConfig {
            default: Profile {
                profile_name: None,
                aws_region: "eu-west-1".to_string(),
            },
        };

        assert_eq!(resolve_region(Some("us-east-1"), Some(&config)).unwrap(), "us-east-1");
        assert_eq!(resolve_region(None, Some(&config)).unwrap(), "eu-west-1");
        assert_eq!(resolve_region(Some(""), Some(&config)).unwrap(), "eu-west-1");
        assert!(matches!(
            resolve_region(None, Some(&Ec2KitConfig::default())),
            Err(Ec2KitError::Config(_))
        ));
        assert!(resolve_region(None, None).is_err());
    }

    #[test]
    fn test_data_dir_from_env_value() {
        assert_eq!(
            data_dir_from(Some("/var/lib/ec2kit".to_string())).unwrap(),
            PathBuf::from("/var/lib/ec2kit")
        );

        if let Some(home) = dirs::home_dir() {
            assert_eq!(data_dir_from(Some("~/ops".to_string())).unwrap(), home.join("ops"));
            assert_eq!(data_dir_from(None).unwrap(), home.join(".ec2kit"));
            assert_eq!(data_dir_from(Some(String::new())).unwrap(), home.join(".ec2kit"));
        }
    }

    #[test]
    fn test_validate_instance_id() {
        assert!(validate_instance_id("i-12345678").is_ok());
        assert!(validate_instance_id("i-0123456789abcdef0").is_ok());
        assert!(validate_instance_id("i-1234567").is_err());
        assert!(validate_instance_id("i-0123456789abcdefg").is_err());
        assert!(validate_instance_id("eipalloc-12345678").is_err());
        assert!(validate_instance_id("").is_err());
    }
}

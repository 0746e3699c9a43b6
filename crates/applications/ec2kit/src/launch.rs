//! Launch orchestrator
//!
//! Launches one instance per launch override of every selected
//! specification, sequentially:
//!
//! 1. **Name**: all name templates of a specification are rendered before
//!    its first run call. A bad template skips only its own override.
//! 2. **Run**: one RunInstances call per override, with a fresh client token.
//! 3. **Tag**: volumes are looked up with a bounded retry, then the instance
//!    and its volumes get the specification tags plus the Name tag.
//! 4. **Output**: one rendered line per instance.
//!
//! Run failures are recorded per override in the [`LaunchReport`]; tag and
//! output failures are only logged because the instance already exists.

use crate::template::{NameContext, OutputContext, Template, DEFAULT_OUTPUT_TEMPLATE};
use ec2kit_core::{
    ComputeGateway, EbsDevice, Ec2KitError, Instance, LaunchRequest, Result, Tag, NAME_TAG,
};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Declarative description of instances to launch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchSpecification {
    pub name: String,
    pub ami_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iam_role_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement_group_name: Option<String>,
    pub public_ip_enabled: bool,
    pub ipv6_enabled: bool,
    pub instance_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_pair: Option<String>,
    pub ebs_volumes: Vec<EbsVolume>,
    pub ebs_optimized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    pub tags: Vec<SpecTag>,
    pub security_group_ids: Vec<String>,
    pub launches: Vec<LaunchOverride>,
}

/// Block device of a [`LaunchSpecification`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EbsVolume {
    pub device_name: String,
    pub delete_on_termination: bool,
    /// Leave unset for a root volume whose size is changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
    /// 0 keeps the image's size
    pub size_gb: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecTag {
    pub key: String,
    pub value: String,
}

/// One launch of a specification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchOverride {
    pub name_tag_template: String,
    pub subnet_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

impl LaunchSpecification {
    fn tags_with_name(&self, name: &str) -> Vec<Tag> {
        self.tags
            .iter()
            .filter(|t| t.key != NAME_TAG)
            .map(|t| Tag::new(&t.key, &t.value))
            .chain(std::iter::once(Tag::new(NAME_TAG, name)))
            .collect()
    }

    /// RunInstances parameters for one override
    pub fn request(&self, launch: &LaunchOverride, image_id: &str, instance_type: &str) -> LaunchRequest {
        LaunchRequest {
            image_id: image_id.to_string(),
            instance_type: instance_type.to_string(),
            subnet_id: launch.subnet_id.clone(),
            count: 1,
            key_name: non_blank(&self.key_pair),
            security_group_ids: self.security_group_ids.clone(),
            public_ip_enabled: self.public_ip_enabled,
            ipv6_enabled: self.ipv6_enabled,
            iam_role_name: non_blank(&self.iam_role_name),
            ebs_devices: self
                .ebs_volumes
                .iter()
                .map(|v| EbsDevice {
                    device_name: v.device_name.clone(),
                    delete_on_termination: v.delete_on_termination,
                    encrypted: v.encrypted,
                    size_gb: (v.size_gb > 0).then_some(v.size_gb),
                    volume_type: non_blank(&v.volume_type),
                })
                .collect(),
            ebs_optimized: self.ebs_optimized,
            placement_group_name: non_blank(&self.placement_group_name),
            user_data: non_blank(&self.user_data),
            client_token: Some(Uuid::new_v4().to_string()),
        }
    }
}

/// Instance type precedence: command override > launch override > default
pub fn resolve_instance_type(command: Option<&str>, launch: Option<&str>, default: &str) -> String {
    command
        .filter(|t| !t.is_empty())
        .or(launch.filter(|t| !t.is_empty()))
        .unwrap_or(default)
        .to_string()
}

/// Load and concatenate specification lists from YAML files, in order
pub fn load_specifications(paths: &[PathBuf]) -> Result<Vec<LaunchSpecification>> {
    let mut specs = Vec::new();
    for path in paths {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Ec2KitError::config(format!("{}: {e}", path.display())))?;
        let mut loaded: Vec<LaunchSpecification> = serde_yaml::from_str(&content)
            .map_err(|e| Ec2KitError::config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), count = loaded.len(), "Loaded launch specifications");
        specs.append(&mut loaded);
    }
    Ok(specs)
}

/// Example specification written by `ec2run --skeleton`
pub fn skeleton() -> LaunchSpecification {
    LaunchSpecification {
        name: "example, replace the properties for your case".to_string(),
        ami_id: "ami-xxxxxxxx".to_string(),
        iam_role_name: Some("your_iam_role_name".to_string()),
        placement_group_name: Some("your_existing_placement_group".to_string()),
        public_ip_enabled: false,
        ipv6_enabled: false,
        instance_type: "t3.nano".to_string(),
        key_pair: Some("your_key_pair_name".to_string()),
        ebs_volumes: vec![EbsVolume {
            device_name: "/dev/xvda".to_string(),
            delete_on_termination: false,
            encrypted: Some(true),
            size_gb: 8,
            volume_type: Some("gp3".to_string()),
        }],
        ebs_optimized: false,
        user_data: Some("#!/bin/bash\ntouch /var/log/ec2kit_userdata_sample.touch".to_string()),
        tags: vec![SpecTag {
            key: "sample_key".to_string(),
            value: "sample_value".to_string(),
        }],
        security_group_ids: vec!["sg-xxxxxxxx".to_string(), "sg-yyyyyyyy".to_string()],
        launches: vec![LaunchOverride {
            name_tag_template: "instance {{.Symbol}} {{.Sequence}}".to_string(),
            subnet_id: "subnet-xxxxxxxx".to_string(),
            output_template: Some(
                "{{.InstanceId}},{{.Name}},{{.PublicIp}},{{.Symbol}},{{.Sequence}}".to_string(),
            ),
            instance_type: None,
        }],
    }
}

/// Write the example specification list to `path`
pub fn write_skeleton(path: &Path) -> Result<()> {
    let yaml = serde_yaml::to_string(&vec![skeleton()])
        .map_err(|e| Ec2KitError::config(format!("skeleton: {e}")))?;
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Command-line adjustments applied to every specification
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub symbol: String,
    pub ami_override: Option<String>,
    pub type_override: Option<String>,
    /// Only launch specifications with this name
    pub only_name: Option<String>,
    pub dry_run: bool,
}

/// Block-device visibility retry
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Pause before each attempt
    pub pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            pause: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedInstance {
    pub instance_id: String,
    pub name: String,
    pub specification: String,
    pub sequence: usize,
}

#[derive(Debug)]
pub struct LaunchFailure {
    pub specification: String,
    pub sequence: usize,
    pub error: Ec2KitError,
}

/// Outcome of a launch run
#[derive(Debug, Default)]
pub struct LaunchReport {
    pub launched: Vec<LaunchedInstance>,
    pub failures: Vec<LaunchFailure>,
}

impl LaunchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Drives launches through a [`ComputeGateway`]
pub struct Launcher<'a, G: ComputeGateway + ?Sized> {
    gateway: &'a G,
    retry: RetryPolicy,
}

impl<'a, G: ComputeGateway + ?Sized> Launcher<'a, G> {
    pub fn new(gateway: &'a G) -> Self {
        Self {
            gateway,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Launch every override of every selected specification
    ///
    /// Output lines go to `out`. Fails only when `only_name` matches no
    /// specification; per-override failures are in the report.
    pub async fn launch_all<W: Write>(
        &self,
        specs: &[LaunchSpecification],
        options: &LaunchOptions,
        out: &mut W,
    ) -> Result<LaunchReport> {
        let selected: Vec<&LaunchSpecification> = specs
            .iter()
            .filter(|s| options.only_name.as_ref().is_none_or(|n| *n == s.name))
            .collect();

        if selected.is_empty() {
            return Err(Ec2KitError::InvalidInput(match &options.only_name {
                Some(name) => format!("no launch specification named {name:?}"),
                None => "no launch specification given".to_string(),
            }));
        }

        let mut report = LaunchReport::default();
        for spec in selected {
            self.launch_specification(spec, options, out, &mut report).await;
        }

        info!(
            "🚀 Launched {} instance(s), {} launch(es) failed",
            report.launched.len(),
            report.failures.len()
        );
        Ok(report)
    }

    async fn launch_specification<W: Write>(
        &self,
        spec: &LaunchSpecification,
        options: &LaunchOptions,
        out: &mut W,
        report: &mut LaunchReport,
    ) {
        if spec.launches.is_empty() {
            warn!("⚠️  Launch specification {:?} has no launches", spec.name);
            return;
        }

        let image_id = options.ami_override.as_deref().unwrap_or(&spec.ami_id);

        // Rendered up front so no instance is created under a broken name
        let names: Vec<Result<String>> = spec
            .launches
            .iter()
            .enumerate()
            .map(|(i, launch)| render_name(&launch.name_tag_template, &options.symbol, i + 1))
            .collect();

        for (index, (launch, name)) in spec.launches.iter().zip(names).enumerate() {
            let sequence = index + 1;
            let mut fail = |error: Ec2KitError| {
                warn!("❌ {} #{}: {}", spec.name, sequence, error);
                report.failures.push(LaunchFailure {
                    specification: spec.name.clone(),
                    sequence,
                    error,
                });
            };

            let name = match name {
                Ok(name) => name,
                Err(e) => {
                    fail(e);
                    continue;
                }
            };

            let instance_type = resolve_instance_type(
                options.type_override.as_deref(),
                launch.instance_type.as_deref(),
                &spec.instance_type,
            );
            let request = spec.request(launch, image_id, &instance_type);

            info!(
                "🚀 Launching {} ({}, {}) in {}",
                name, instance_type, request.image_id, launch.subnet_id
            );

            let instances = match self.gateway.run_instances(&request, options.dry_run).await {
                Ok(instances) => instances,
                Err(e) => {
                    fail(e);
                    continue;
                }
            };

            let output_template = launch
                .output_template
                .as_deref()
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_OUTPUT_TEMPLATE);

            for instance in instances {
                self.tag_instance(spec, &instance, &name).await;

                match self
                    .render_output(output_template, &instance, &name, &options.symbol, sequence)
                    .await
                {
                    Ok(line) => {
                        if let Err(e) = writeln!(out, "{line}") {
                            warn!("⚠️  Failed to write output for {}: {}", instance.instance_id, e);
                        }
                    }
                    Err(e) => warn!(
                        "⚠️  {} failed rendering output template: {}",
                        instance.instance_id, e
                    ),
                }

                report.launched.push(LaunchedInstance {
                    instance_id: instance.instance_id.clone(),
                    name: name.clone(),
                    specification: spec.name.clone(),
                    sequence,
                });
            }
        }
    }

    /// Tag the instance and whatever volumes became visible
    async fn tag_instance(&self, spec: &LaunchSpecification, instance: &Instance, name: &str) {
        let mut resources = vec![instance.instance_id.clone()];
        resources.extend(self.collect_volumes(&instance.instance_id).await);

        let tags = spec.tags_with_name(name);
        if let Err(e) = self.gateway.create_tags(&resources, &tags).await {
            warn!("⚠️  Failed tagging so skipped {}: {}", instance.instance_id, e);
        }
    }

    /// Volume ids of a just-launched instance, empty if they never show up
    async fn collect_volumes(&self, instance_id: &str) -> Vec<String> {
        let ids = [instance_id.to_string()];
        let attempts = self.retry.attempts.max(1);

        for attempt in 1..=attempts {
            tokio::time::sleep(self.retry.pause).await;

            match self.gateway.describe_instances_by_id(&ids).await {
                Ok(found) => {
                    let volumes: Vec<String> = found.iter().flat_map(Instance::volume_ids).collect();
                    if !volumes.is_empty() {
                        debug!(instance_id, attempt, count = volumes.len(), "Found volumes");
                        return volumes;
                    }
                    debug!(instance_id, attempt, "Block device mappings not visible yet");
                }
                Err(e) => debug!(instance_id, attempt, "Failed to read block device mappings: {}", e),
            }
        }

        warn!(
            "⚠️  No volumes visible for {} after {} attempts, tagging the instance only",
            instance_id, attempts
        );
        Vec::new()
    }

    async fn render_output(
        &self,
        template: &str,
        instance: &Instance,
        name: &str,
        symbol: &str,
        sequence: usize,
    ) -> Result<String> {
        let template = Template::parse(template)?;

        let mut public_ip = instance.public_ip.clone();
        if public_ip.is_none() && template.references("PublicIp") {
            // Public address assignment can lag the run response
            match self
                .gateway
                .describe_instances_by_id(std::slice::from_ref(&instance.instance_id))
                .await
            {
                Ok(found) => public_ip = found.into_iter().find_map(|i| i.public_ip),
                Err(e) => warn!("⚠️  Failed to refresh {}: {}", instance.instance_id, e),
            }
        }

        template.render(&OutputContext {
            instance_id: instance.instance_id.clone(),
            name: name.to_string(),
            public_ip: public_ip.unwrap_or_default(),
            private_ip: instance.private_ip.clone().unwrap_or_default(),
            symbol: symbol.to_string(),
            sequence,
        })
    }
}

fn render_name(template: &str, symbol: &str, sequence: usize) -> Result<String> {
    Template::parse(template)?.render(&NameContext {
        symbol: symbol.to_string(),
        sequence,
    })
}

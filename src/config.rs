//! Stack configuration (`nimbus.toml`)
//!
//! Every field has a default, so an empty or missing file yields the stock
//! playground: one Ubuntu VM behind a security group that lets HTTP and SSH
//! in from the Internet. JSON is accepted too (`nimbus.json`).

use crate::paths;
use anyhow::{Context, Result, bail};
use azurekit::{Access, Allocation, Cidr, ImageReference, PrivateIp, Protocol, PublicIpSku};
use converge::{EngineOptions, RetryConfig};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file names searched in the config directory, in order
const CONFIG_FILES: &[&str] = &["nimbus.toml", "nimbus.json"];

/// Subnet host used for the VM when no address is configured
const DEFAULT_HOST_OFFSET: u32 = 10;

/// Where the network security group is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NsgAssociation {
    /// On the subnet, covering every interface in it
    #[default]
    Subnet,
    /// On the VM's network interface only
    Nic,
    /// On both
    Both,
    /// No security group at all
    None,
}

impl NsgAssociation {
    pub fn on_subnet(self) -> bool {
        matches!(self, Self::Subnet | Self::Both)
    }

    pub fn on_nic(self) -> bool {
        matches!(self, Self::Nic | Self::Both)
    }
}

/// An inbound rule on the VM's security group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub name: String,
    pub priority: u32,
    /// Destination port or range, e.g. `22` or `8000-8080`
    pub port: String,
    #[serde(default = "default_rule_source")]
    pub source: String,
    #[serde(default = "default_rule_protocol")]
    pub protocol: Protocol,
    #[serde(default = "default_rule_access")]
    pub access: Access,
}

fn default_rule_source() -> String {
    "Internet".to_string()
}

fn default_rule_protocol() -> Protocol {
    Protocol::Tcp
}

fn default_rule_access() -> Access {
    Access::Allow
}

fn default_rules() -> Vec<RuleConfig> {
    let rule = |name: &str, priority, port: &str| RuleConfig {
        name: name.to_string(),
        priority,
        port: port.to_string(),
        source: default_rule_source(),
        protocol: Protocol::Tcp,
        access: Access::Allow,
    };
    vec![
        rule("Allow-HTTP-From-Internet-To-VM", 100, "80"),
        rule("Allow-SSH-From-Internet-To-VM", 200, "22"),
    ]
}

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Provider calls in flight at once
    pub concurrency_limit: usize,
    /// Deadline for each provider call
    pub provider_timeout_secs: u64,
    /// Attempts per provider call, including the first
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each time
    pub retry_delay_ms: u64,
    /// Delete recorded resources that are no longer declared
    pub prune: bool,
    /// Artificial delay for every simulated provider call
    pub simulated_latency_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            provider_timeout_secs: 600,
            max_attempts: 4,
            retry_delay_ms: 2000,
            prune: true,
            simulated_latency_ms: 0,
        }
    }
}

impl EngineConfig {
    pub fn options(&self) -> EngineOptions {
        EngineOptions {
            concurrency_limit: self.concurrency_limit,
            provider_timeout: Duration::from_secs(self.provider_timeout_secs),
            retry: RetryConfig {
                max_attempts: self.max_attempts,
                base_delay: Duration::from_millis(self.retry_delay_ms),
                ..RetryConfig::default()
            },
            prune: self.prune,
        }
    }
}

/// The playground stack description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NimbusConfig {
    /// Stack name; also names the state files
    pub stack: String,
    pub subscription: String,
    pub location: String,
    pub resource_group: String,
    pub address_space: Vec<Cidr>,
    pub subnet_prefix: Cidr,
    /// Static address of the VM's interface; defaults to host 10 of the subnet
    pub private_ip: Option<PrivateIp>,
    pub nsg_association: NsgAssociation,
    pub public_ip_allocation: Allocation,
    pub public_ip_sku: PublicIpSku,
    /// DNS label for the public IP; empty for none
    pub domain_name_label: String,
    pub vm_name: String,
    pub vm_size: String,
    pub image: ImageReference,
    pub admin_username: String,
    /// OpenSSH public key file, `~` and `$VARS` expanded
    pub ssh_public_key_path: String,
    /// Tags applied to every taggable resource
    pub tags: BTreeMap<String, String>,
    pub rules: Vec<RuleConfig>,
    pub engine: EngineConfig,
}

impl Default for NimbusConfig {
    fn default() -> Self {
        Self {
            stack: "playground".to_string(),
            subscription: azurekit::DEFAULT_SUBSCRIPTION.to_string(),
            location: "westeurope".to_string(),
            resource_group: "playground".to_string(),
            address_space: vec![Cidr::containing(Ipv4Addr::new(10, 0, 0, 0), 16)],
            subnet_prefix: Cidr::containing(Ipv4Addr::new(10, 0, 1, 0), 24),
            private_ip: None,
            nsg_association: NsgAssociation::Subnet,
            public_ip_allocation: Allocation::Dynamic,
            public_ip_sku: PublicIpSku::Basic,
            domain_name_label: "vm-ubuntu".to_string(),
            vm_name: "ubuntu".to_string(),
            vm_size: "Standard_B2s".to_string(),
            image: ImageReference::default(),
            admin_username: "azureuser".to_string(),
            ssh_public_key_path: "~/.ssh/id_rsa.pub".to_string(),
            tags: BTreeMap::from([("created_by".to_string(), "nimbus".to_string())]),
            rules: default_rules(),
            engine: EngineConfig::default(),
        }
    }
}

impl NimbusConfig {
    /// Load from `explicit`, or from the first config file found in the
    /// config directory, or fall back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::find()? {
                Some(path) => path,
                None => {
                    log::info!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };
        Self::from_file(&path)
    }

    fn find() -> Result<Option<PathBuf>> {
        let dir = paths::config_dir()?;
        Ok(CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists()))
    }

    /// Parse a config file; `.json` is read as JSON, anything else as TOML
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?
        } else {
            toml::from_str(&content).with_context(|| format!("Invalid TOML in {}", path.display()))?
        };
        config
            .validate()
            .with_context(|| format!("Invalid config {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Cross-field checks; per-resource rules are checked again at declaration
    pub fn validate(&self) -> Result<()> {
        if self.stack.trim().is_empty() {
            bail!("stack name must not be empty");
        }
        if !self
            .address_space
            .iter()
            .any(|space| space.contains_block(&self.subnet_prefix))
        {
            bail!(
                "subnet_prefix {} is outside the address space",
                self.subnet_prefix
            );
        }
        let private_ip = self.private_ip()?;
        if !self.subnet_prefix.contains(private_ip.address()) {
            bail!(
                "private_ip {private_ip} is outside subnet {}",
                self.subnet_prefix
            );
        }
        if self.engine.concurrency_limit == 0 {
            bail!("engine.concurrency_limit must be at least 1");
        }
        if self.engine.max_attempts == 0 {
            bail!("engine.max_attempts must be at least 1");
        }

        let mut names = HashSet::new();
        let mut priorities = HashSet::new();
        for rule in &self.rules {
            if !names.insert(rule.name.as_str()) {
                bail!("duplicate rule name '{}'", rule.name);
            }
            if !priorities.insert(rule.priority) {
                bail!("rules '{}' and another share priority {}", rule.name, rule.priority);
            }
        }
        Ok(())
    }

    /// Configured interface address, or host 10 of the subnet
    pub fn private_ip(&self) -> Result<PrivateIp> {
        if let Some(ip) = self.private_ip {
            return Ok(ip);
        }
        let address = self
            .subnet_prefix
            .host(DEFAULT_HOST_OFFSET)
            .with_context(|| format!("subnet {} is too small", self.subnet_prefix))?;
        Ok(PrivateIp::new(address)?)
    }

    /// DNS label, if one is configured
    pub fn label(&self) -> Option<&str> {
        Some(self.domain_name_label.as_str()).filter(|l| !l.is_empty())
    }

    /// Read the SSH public key as a single line
    pub fn read_ssh_key(&self) -> Result<String> {
        let path = paths::expand(&self.ssh_public_key_path);
        let key = fs::read_to_string(&path)
            .with_context(|| format!("Could not read SSH public key: {}", path.display()))?;
        let key: String = key.lines().map(str::trim).collect::<Vec<_>>().join("");
        if key.is_empty() {
            bail!("SSH public key {} is empty", path.display());
        }
        Ok(key)
    }
}

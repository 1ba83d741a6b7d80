//! Typed arguments for the supported Azure resource types.
//!
//! Each `*Args` struct names its fields, carries the defaults the playground
//! topology relies on, and validates itself before it becomes a node. Fields
//! typed as [`Input`] take either a literal or another resource's output.

use crate::error::{Error, Result};
use crate::net::{Cidr, PrivateIp};
use converge::{Properties, Property, ResourceSpec};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::LazyLock;

/// A property that is either a literal or an output of another resource.
pub type Input = Property;

/// Resource type tokens.
pub mod kind {
    /// Resource group
    pub const RESOURCE_GROUP: &str = "azure-native:resources:ResourceGroup";
    /// Virtual network
    pub const VIRTUAL_NETWORK: &str = "azure-native:network:VirtualNetwork";
    /// Subnet of a virtual network
    pub const SUBNET: &str = "azure-native:network:Subnet";
    /// Network security group
    pub const NETWORK_SECURITY_GROUP: &str = "azure-native:network:NetworkSecurityGroup";
    /// Rule inside a network security group
    pub const SECURITY_RULE: &str = "azure-native:network:SecurityRule";
    /// Public IP address
    pub const PUBLIC_IP_ADDRESS: &str = "azure-native:network:PublicIPAddress";
    /// Network interface
    pub const NETWORK_INTERFACE: &str = "azure-native:network:NetworkInterface";
    /// Virtual machine
    pub const VIRTUAL_MACHINE: &str = "azure-native:compute:VirtualMachine";
}

static LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9]*$").expect("valid location pattern"));
static DNS_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]{1,61}[a-z0-9]$").expect("valid label pattern"));
static ADMIN_USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$").expect("valid username pattern"));

/// Usernames Azure refuses for Linux admin accounts
const RESERVED_USERNAMES: &[&str] = &[
    "admin", "administrator", "root", "user", "guest", "test", "sys", "support", "owner",
];

type Tags = BTreeMap<String, String>;

fn tags_property(tags: &Tags) -> Option<Property> {
    (!tags.is_empty()).then(|| Property::from(tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Properties>()))
}

fn reference(id: &Input) -> Property {
    Properties::new().with("id", id.clone()).into()
}

macro_rules! azure_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant),+
        }

        impl $name {
            /// Wire spelling
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<$name> for Property {
            fn from(value: $name) -> Self {
                Property::from(value.as_str())
            }
        }
    };
}

azure_enum!(
    /// Traffic direction a security rule applies to
    Direction {
        /// Incoming traffic
        Inbound => "Inbound",
        /// Outgoing traffic
        Outbound => "Outbound",
    }
);

azure_enum!(
    /// Whether matching traffic is let through
    Access {
        /// Permit traffic
        Allow => "Allow",
        /// Block traffic
        Deny => "Deny",
    }
);

azure_enum!(
    /// Transport protocol a security rule matches
    Protocol {
        /// TCP
        Tcp => "Tcp",
        /// UDP
        Udp => "Udp",
        /// ICMP
        Icmp => "Icmp",
        /// Any protocol
        Any => "*",
    }
);

azure_enum!(
    /// IP address allocation method
    Allocation {
        /// Address fixed at creation
        Static => "Static",
        /// Address assigned by the platform
        Dynamic => "Dynamic",
    }
);

azure_enum!(
    /// Public IP SKU
    PublicIpSku {
        /// Basic SKU, allows dynamic allocation
        Basic => "Basic",
        /// Standard SKU, static allocation only
        Standard => "Standard",
    }
);

azure_enum!(
    /// IP protocol version
    IpVersion {
        /// IPv4
        IPv4 => "IPv4",
        /// IPv6
        IPv6 => "IPv6",
    }
);

/// Resource group: the container every other resource lives in.
#[derive(Debug, Clone)]
pub struct ResourceGroupArgs {
    /// Azure region, e.g. `westeurope`
    pub location: String,
    /// Resource tags
    pub tags: Tags,
}

impl ResourceGroupArgs {
    /// Resource group in `location`
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            tags: Tags::new(),
        }
    }

    /// Validate field values
    pub fn check(&self) -> Result<()> {
        if !LOCATION.is_match(&self.location) {
            return Err(Error::field(
                "location",
                format!("'{}' is not a region name like 'westeurope'", self.location),
            ));
        }
        Ok(())
    }
}

impl ResourceSpec for ResourceGroupArgs {
    fn kind(&self) -> &'static str {
        kind::RESOURCE_GROUP
    }

    fn validate(&self) -> std::result::Result<(), String> {
        self.check().map_err(|e| e.to_string())
    }

    fn taggable(&self) -> bool {
        true
    }

    fn into_properties(self) -> Properties {
        let tags = tags_property(&self.tags);
        Properties::new()
            .with("location", self.location)
            .with_opt("tags", tags)
    }
}

/// Virtual network with one or more address ranges.
#[derive(Debug, Clone)]
pub struct VirtualNetworkArgs {
    /// Owning resource group name
    pub resource_group_name: Input,
    /// Azure region
    pub location: Input,
    /// Address ranges; must be non-empty and must not overlap
    pub address_space: Vec<Cidr>,
    /// Resource tags
    pub tags: Tags,
}

impl VirtualNetworkArgs {
    /// Virtual network covering `address_space`
    pub fn new(resource_group_name: impl Into<Input>, location: impl Into<Input>, address_space: Vec<Cidr>) -> Self {
        Self {
            resource_group_name: resource_group_name.into(),
            location: location.into(),
            address_space,
            tags: Tags::new(),
        }
    }

    /// Validate field values
    pub fn check(&self) -> Result<()> {
        if self.address_space.is_empty() {
            return Err(Error::field("address_space", "at least one range is required"));
        }
        for (i, a) in self.address_space.iter().enumerate() {
            if let Some(b) = self.address_space[i + 1..].iter().find(|b| a.overlaps(b)) {
                return Err(Error::field("address_space", format!("{a} overlaps {b}")));
            }
        }
        Ok(())
    }
}

impl ResourceSpec for VirtualNetworkArgs {
    fn kind(&self) -> &'static str {
        kind::VIRTUAL_NETWORK
    }

    fn validate(&self) -> std::result::Result<(), String> {
        self.check().map_err(|e| e.to_string())
    }

    fn taggable(&self) -> bool {
        true
    }

    fn into_properties(self) -> Properties {
        let tags = tags_property(&self.tags);
        let prefixes: Vec<String> = self.address_space.iter().map(ToString::to_string).collect();
        Properties::new()
            .with("resource_group_name", self.resource_group_name)
            .with("location", self.location)
            .with("address_space", Properties::new().with("address_prefixes", prefixes))
            .with_opt("tags", tags)
    }
}

/// Subnet inside a virtual network, optionally guarded by a security group.
#[derive(Debug, Clone)]
pub struct SubnetArgs {
    /// Owning resource group name
    pub resource_group_name: Input,
    /// Parent virtual network name
    pub virtual_network_name: Input,
    /// Range carved out of the virtual network
    pub address_prefix: Cidr,
    /// Security group associated at subnet level
    pub network_security_group_id: Option<Input>,
}

impl SubnetArgs {
    /// Subnet covering `address_prefix`, with no security group
    pub fn new(
        resource_group_name: impl Into<Input>,
        virtual_network_name: impl Into<Input>,
        address_prefix: Cidr,
    ) -> Self {
        Self {
            resource_group_name: resource_group_name.into(),
            virtual_network_name: virtual_network_name.into(),
            address_prefix,
            network_security_group_id: None,
        }
    }

    /// Associate a network security group with the subnet
    pub fn with_security_group(mut self, id: impl Into<Input>) -> Self {
        self.network_security_group_id = Some(id.into());
        self
    }

    /// Validate field values
    pub fn check(&self) -> Result<()> {
        // Azure reserves five addresses per subnet
        if self.address_prefix.prefix() > 29 {
            return Err(Error::field(
                "address_prefix",
                format!("{} is too small, subnets must be /29 or larger", self.address_prefix),
            ));
        }
        Ok(())
    }
}

impl ResourceSpec for SubnetArgs {
    fn kind(&self) -> &'static str {
        kind::SUBNET
    }

    fn validate(&self) -> std::result::Result<(), String> {
        self.check().map_err(|e| e.to_string())
    }

    fn into_properties(self) -> Properties {
        Properties::new()
            .with("resource_group_name", self.resource_group_name)
            .with("virtual_network_name", self.virtual_network_name)
            .with("address_prefix", self.address_prefix.to_string())
            .with_opt(
                "network_security_group",
                self.network_security_group_id.as_ref().map(reference),
            )
    }
}

/// Network security group. Rules are separate [`SecurityRuleArgs`] resources.
#[derive(Debug, Clone)]
pub struct NetworkSecurityGroupArgs {
    /// Owning resource group name
    pub resource_group_name: Input,
    /// Azure region
    pub location: Input,
    /// Resource tags
    pub tags: Tags,
}

impl NetworkSecurityGroupArgs {
    /// Empty security group
    pub fn new(resource_group_name: impl Into<Input>, location: impl Into<Input>) -> Self {
        Self {
            resource_group_name: resource_group_name.into(),
            location: location.into(),
            tags: Tags::new(),
        }
    }
}

impl ResourceSpec for NetworkSecurityGroupArgs {
    fn kind(&self) -> &'static str {
        kind::NETWORK_SECURITY_GROUP
    }

    fn taggable(&self) -> bool {
        true
    }

    fn into_properties(self) -> Properties {
        let tags = tags_property(&self.tags);
        Properties::new()
            .with("resource_group_name", self.resource_group_name)
            .with("location", self.location)
            .with_opt("tags", tags)
    }
}

/// One rule inside a network security group.
#[derive(Debug, Clone)]
pub struct SecurityRuleArgs {
    /// Owning resource group name
    pub resource_group_name: Input,
    /// Parent security group name
    pub network_security_group_name: Input,
    /// Evaluation order, 100 (first) to 4096 (last)
    pub priority: u32,
    /// Default `Inbound`
    pub direction: Direction,
    /// Default `Allow`
    pub access: Access,
    /// Default `Tcp`
    pub protocol: Protocol,
    /// Default `*`
    pub source_port_range: String,
    /// Default `22-80`
    pub destination_port_range: String,
    /// Default `*`; a CIDR, an address or a service tag such as `Internet`
    pub source_address_prefix: String,
    /// Default `*`
    pub destination_address_prefix: String,
}

impl SecurityRuleArgs {
    /// Inbound TCP allow rule at `priority`
    pub fn new(
        resource_group_name: impl Into<Input>,
        network_security_group_name: impl Into<Input>,
        priority: u32,
    ) -> Self {
        Self {
            resource_group_name: resource_group_name.into(),
            network_security_group_name: network_security_group_name.into(),
            priority,
            direction: Direction::Inbound,
            access: Access::Allow,
            protocol: Protocol::Tcp,
            source_port_range: "*".to_string(),
            destination_port_range: "22-80".to_string(),
            source_address_prefix: "*".to_string(),
            destination_address_prefix: "*".to_string(),
        }
    }

    /// Validate field values
    pub fn check(&self) -> Result<()> {
        if !(100..=4096).contains(&self.priority) {
            return Err(Error::field(
                "priority",
                format!("{} is outside 100..=4096", self.priority),
            ));
        }
        check_port_range("source_port_range", &self.source_port_range)?;
        check_port_range("destination_port_range", &self.destination_port_range)?;
        check_address_prefix("source_address_prefix", &self.source_address_prefix)?;
        check_address_prefix("destination_address_prefix", &self.destination_address_prefix)
    }
}

fn check_port_range(field: &'static str, range: &str) -> Result<()> {
    if range == "*" {
        return Ok(());
    }
    let port = |s: &str| {
        s.parse::<u16>()
            .map_err(|_| Error::field(field, format!("'{range}' is not a port, a range or '*'")))
    };
    match range.split_once('-') {
        None => port(range).map(|_| ()),
        Some((low, high)) => {
            if port(low)? > port(high)? {
                return Err(Error::field(field, format!("'{range}' runs backwards")));
            }
            Ok(())
        }
    }
}

fn check_address_prefix(field: &'static str, prefix: &str) -> Result<()> {
    if prefix == "*" {
        return Ok(());
    }
    if prefix.starts_with(|c: char| c.is_ascii_digit()) {
        if prefix.contains('/') {
            prefix.parse::<Cidr>()?;
        } else {
            prefix.parse::<Ipv4Addr>().map_err(|_| Error::InvalidAddress {
                value: prefix.to_string(),
                reason: "not an IPv4 address".to_string(),
            })?;
        }
        return Ok(());
    }
    // Service tags: Internet, VirtualNetwork, AzureLoadBalancer, ...
    if prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') {
        return Ok(());
    }
    Err(Error::field(
        field,
        format!("'{prefix}' is neither an address, a CIDR nor a service tag"),
    ))
}

impl ResourceSpec for SecurityRuleArgs {
    fn kind(&self) -> &'static str {
        kind::SECURITY_RULE
    }

    fn validate(&self) -> std::result::Result<(), String> {
        self.check().map_err(|e| e.to_string())
    }

    fn into_properties(self) -> Properties {
        Properties::new()
            .with("resource_group_name", self.resource_group_name)
            .with("network_security_group_name", self.network_security_group_name)
            .with("priority", self.priority)
            .with("direction", self.direction)
            .with("access", self.access)
            .with("protocol", self.protocol)
            .with("source_port_range", self.source_port_range)
            .with("destination_port_range", self.destination_port_range)
            .with("source_address_prefix", self.source_address_prefix)
            .with("destination_address_prefix", self.destination_address_prefix)
    }
}

/// Public IP address, optionally with a DNS label.
#[derive(Debug, Clone)]
pub struct PublicIpArgs {
    /// Owning resource group name
    pub resource_group_name: Input,
    /// Azure region
    pub location: Input,
    /// Default `Dynamic`
    pub allocation: Allocation,
    /// Default `Basic`
    pub sku: PublicIpSku,
    /// Default `IPv4`
    pub version: IpVersion,
    /// Label for `<label>.<region>.cloudapp.azure.com`
    pub domain_name_label: Option<String>,
    /// Resource tags
    pub tags: Tags,
}

impl PublicIpArgs {
    /// Dynamic Basic IPv4 address
    pub fn new(resource_group_name: impl Into<Input>, location: impl Into<Input>) -> Self {
        Self {
            resource_group_name: resource_group_name.into(),
            location: location.into(),
            allocation: Allocation::Dynamic,
            sku: PublicIpSku::Basic,
            version: IpVersion::IPv4,
            domain_name_label: None,
            tags: Tags::new(),
        }
    }

    /// Set the DNS label
    pub fn with_domain_name_label(mut self, label: impl Into<String>) -> Self {
        self.domain_name_label = Some(label.into());
        self
    }

    /// Validate field values
    pub fn check(&self) -> Result<()> {
        if self.sku == PublicIpSku::Standard && self.allocation == Allocation::Dynamic {
            return Err(Error::field("allocation", "Standard SKU addresses must be Static"));
        }
        if let Some(label) = &self.domain_name_label
            && !DNS_LABEL.is_match(label)
        {
            return Err(Error::field(
                "domain_name_label",
                format!("'{label}' must be 3-63 lowercase letters, digits or hyphens, starting with a letter"),
            ));
        }
        Ok(())
    }
}

impl ResourceSpec for PublicIpArgs {
    fn kind(&self) -> &'static str {
        kind::PUBLIC_IP_ADDRESS
    }

    fn validate(&self) -> std::result::Result<(), String> {
        self.check().map_err(|e| e.to_string())
    }

    fn taggable(&self) -> bool {
        true
    }

    fn into_properties(self) -> Properties {
        let tags = tags_property(&self.tags);
        let dns = self
            .domain_name_label
            .map(|label| Properties::new().with("domain_name_label", label));
        Properties::new()
            .with("resource_group_name", self.resource_group_name)
            .with("location", self.location)
            .with("public_ip_allocation_method", self.allocation)
            .with("sku", Properties::new().with("name", self.sku))
            .with("public_ip_address_version", self.version)
            .with_opt("dns_settings", dns)
            .with_opt("tags", tags)
    }
}

/// Network interface with a single IP configuration.
#[derive(Debug, Clone)]
pub struct NetworkInterfaceArgs {
    /// Owning resource group name
    pub resource_group_name: Input,
    /// Azure region
    pub location: Input,
    /// Subnet the interface is attached to
    pub subnet_id: Input,
    /// Default `Static`
    pub private_ip_allocation: Allocation,
    /// Required with `Static` allocation
    pub private_ip_address: Option<PrivateIp>,
    /// Public IP bound to the interface
    pub public_ip_address_id: Option<Input>,
    /// Security group associated at interface level
    pub network_security_group_id: Option<Input>,
    /// Resource tags
    pub tags: Tags,
}

impl NetworkInterfaceArgs {
    /// Interface in `subnet_id` with a static private address
    pub fn new(
        resource_group_name: impl Into<Input>,
        location: impl Into<Input>,
        subnet_id: impl Into<Input>,
        private_ip_address: PrivateIp,
    ) -> Self {
        Self {
            resource_group_name: resource_group_name.into(),
            location: location.into(),
            subnet_id: subnet_id.into(),
            private_ip_allocation: Allocation::Static,
            private_ip_address: Some(private_ip_address),
            public_ip_address_id: None,
            network_security_group_id: None,
            tags: Tags::new(),
        }
    }

    /// Bind a public IP
    pub fn with_public_ip(mut self, id: impl Into<Input>) -> Self {
        self.public_ip_address_id = Some(id.into());
        self
    }

    /// Associate a network security group with the interface
    pub fn with_security_group(mut self, id: impl Into<Input>) -> Self {
        self.network_security_group_id = Some(id.into());
        self
    }

    /// Validate field values
    pub fn check(&self) -> Result<()> {
        match (self.private_ip_allocation, &self.private_ip_address) {
            (Allocation::Static, None) => Err(Error::field(
                "private_ip_address",
                "required with Static allocation",
            )),
            (Allocation::Dynamic, Some(ip)) => Err(Error::field(
                "private_ip_address",
                format!("{ip} would be ignored with Dynamic allocation"),
            )),
            _ => Ok(()),
        }
    }
}

impl ResourceSpec for NetworkInterfaceArgs {
    fn kind(&self) -> &'static str {
        kind::NETWORK_INTERFACE
    }

    fn validate(&self) -> std::result::Result<(), String> {
        self.check().map_err(|e| e.to_string())
    }

    fn taggable(&self) -> bool {
        true
    }

    fn into_properties(self) -> Properties {
        let tags = tags_property(&self.tags);
        let ip_configuration = Properties::new()
            .with("name", "ipconfig")
            .with("subnet", reference(&self.subnet_id))
            .with("private_ip_allocation_method", self.private_ip_allocation)
            .with_opt(
                "private_ip_address",
                self.private_ip_address.map(|ip| ip.to_string()),
            )
            .with_opt("public_ip_address", self.public_ip_address_id.as_ref().map(reference));
        Properties::new()
            .with("resource_group_name", self.resource_group_name)
            .with("location", self.location)
            .with("ip_configurations", vec![ip_configuration])
            .with_opt(
                "network_security_group",
                self.network_security_group_id.as_ref().map(reference),
            )
            .with_opt("tags", tags)
    }
}

/// Marketplace image, written `publisher/offer/sku/version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageReference {
    /// e.g. `canonical`
    pub publisher: String,
    /// e.g. `0001-com-ubuntu-server-jammy`
    pub offer: String,
    /// e.g. `22_04-lts-gen2`
    pub sku: String,
    /// e.g. `latest`
    pub version: String,
}

impl Default for ImageReference {
    /// Ubuntu 22.04 LTS, gen2
    fn default() -> Self {
        Self {
            publisher: "canonical".to_string(),
            offer: "0001-com-ubuntu-server-jammy".to_string(),
            sku: "22_04-lts-gen2".to_string(),
            version: "latest".to_string(),
        }
    }
}

impl FromStr for ImageReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [publisher, offer, sku, version] if parts.iter().all(|p| !p.is_empty()) => Ok(Self {
                publisher: (*publisher).to_string(),
                offer: (*offer).to_string(),
                sku: (*sku).to_string(),
                version: (*version).to_string(),
            }),
            _ => Err(Error::field(
                "image",
                format!("'{s}' is not publisher/offer/sku/version"),
            )),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.publisher, self.offer, self.sku, self.version)
    }
}

impl TryFrom<String> for ImageReference {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ImageReference> for String {
    fn from(image: ImageReference) -> Self {
        image.to_string()
    }
}

/// Linux virtual machine with SSH-key login.
#[derive(Debug, Clone)]
pub struct VirtualMachineArgs {
    /// Owning resource group name
    pub resource_group_name: Input,
    /// Azure region
    pub location: Input,
    /// Interface the VM is attached to
    pub network_interface_id: Input,
    /// Hostname inside the guest; defaults to the resource name
    pub computer_name: Option<String>,
    /// Login user; password authentication is disabled
    pub admin_username: String,
    /// OpenSSH public key line
    pub ssh_public_key: String,
    /// Default `Standard_B2s`
    pub vm_size: String,
    /// Default Ubuntu 22.04 LTS
    pub image: ImageReference,
    /// Resource tags
    pub tags: Tags,
}

impl VirtualMachineArgs {
    /// `Standard_B2s` Ubuntu VM on `network_interface_id`
    pub fn new(
        resource_group_name: impl Into<Input>,
        location: impl Into<Input>,
        network_interface_id: impl Into<Input>,
        admin_username: impl Into<String>,
        ssh_public_key: impl Into<String>,
    ) -> Self {
        Self {
            resource_group_name: resource_group_name.into(),
            location: location.into(),
            network_interface_id: network_interface_id.into(),
            computer_name: None,
            admin_username: admin_username.into(),
            ssh_public_key: ssh_public_key.into(),
            vm_size: "Standard_B2s".to_string(),
            image: ImageReference::default(),
            tags: Tags::new(),
        }
    }

    /// Set the guest hostname
    pub fn with_computer_name(mut self, name: impl Into<String>) -> Self {
        self.computer_name = Some(name.into());
        self
    }

    /// Where the key lands inside the guest
    pub fn authorized_keys_path(&self) -> String {
        format!("/home/{}/.ssh/authorized_keys", self.admin_username)
    }

    /// Validate field values
    pub fn check(&self) -> Result<()> {
        if !ADMIN_USERNAME.is_match(&self.admin_username) {
            return Err(Error::field(
                "admin_username",
                format!("'{}' is not a valid Linux username", self.admin_username),
            ));
        }
        if RESERVED_USERNAMES.contains(&self.admin_username.as_str()) {
            return Err(Error::field(
                "admin_username",
                format!("'{}' is reserved", self.admin_username),
            ));
        }
        let key = self.ssh_public_key.as_str();
        if !["ssh-rsa ", "ssh-ed25519 ", "ecdsa-sha2-"]
            .iter()
            .any(|p| key.starts_with(p))
        {
            return Err(Error::field("ssh_public_key", "expected an OpenSSH public key line"));
        }
        if key.contains(['\n', '\r']) {
            return Err(Error::field("ssh_public_key", "must be a single line"));
        }
        if !self.vm_size.starts_with("Standard_") && !self.vm_size.starts_with("Basic_") {
            return Err(Error::field(
                "vm_size",
                format!("'{}' is not a VM size like Standard_B2s", self.vm_size),
            ));
        }
        Ok(())
    }
}

impl ResourceSpec for VirtualMachineArgs {
    fn kind(&self) -> &'static str {
        kind::VIRTUAL_MACHINE
    }

    fn validate(&self) -> std::result::Result<(), String> {
        self.check().map_err(|e| e.to_string())
    }

    fn taggable(&self) -> bool {
        true
    }

    fn into_properties(self) -> Properties {
        let tags = tags_property(&self.tags);
        let public_key = Properties::new()
            .with("path", self.authorized_keys_path())
            .with("key_data", self.ssh_public_key);
        let os_profile = Properties::new()
            .with_opt("computer_name", self.computer_name)
            .with("admin_username", self.admin_username)
            .with(
                "linux_configuration",
                Properties::new()
                    .with("disable_password_authentication", true)
                    .with("ssh", Properties::new().with("public_keys", vec![public_key])),
            );
        let image = Properties::new()
            .with("publisher", self.image.publisher)
            .with("offer", self.image.offer)
            .with("sku", self.image.sku)
            .with("version", self.image.version);

        Properties::new()
            .with("resource_group_name", self.resource_group_name)
            .with("location", self.location)
            .with("hardware_profile", Properties::new().with("vm_size", self.vm_size))
            .with(
                "network_profile",
                Properties::new().with("network_interfaces", vec![reference(&self.network_interface_id)]),
            )
            .with("os_profile", os_profile)
            .with("storage_profile", Properties::new().with("image_reference", image))
            .with_opt("tags", tags)
    }
}

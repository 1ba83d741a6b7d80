//! In-process simulation of the Azure control plane.
//!
//! [`SimulatedCloud`] implements [`Provider`] deterministically. It assigns
//! Azure-shaped resource ids, enforces the referential rules the real control
//! plane would (parents and referenced resources must exist, nothing is
//! deleted while something still points at it), allocates private and public
//! addresses, and can inject failures and latency for testing.

use crate::net::Cidr;
use crate::resources::kind;
use converge::{PropertyMap, Provider, ProviderError, ResourceKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// Subscription used when none is configured
pub const DEFAULT_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";

/// First address handed out to public IPs
const PUBLIC_POOL: Ipv4Addr = Ipv4Addr::new(20, 105, 0, 0);

/// Azure keeps the first four addresses of every subnet
const FIRST_USABLE_HOST: u32 = 4;

/// A resource as the simulated control plane stores it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimResource {
    /// Full Azure resource id
    pub id: String,
    /// Resource type token
    pub kind: String,
    /// Declared name
    pub name: String,
    /// Realized properties, including `id`
    pub properties: PropertyMap,
}

impl SimResource {
    fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.kind, &self.name)
    }
}

/// One call received by the simulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `create_or_update` for a logical resource
    CreateOrUpdate(ResourceKey),
    /// `delete` by remote id
    Delete(String),
}

#[derive(Debug, Default)]
struct Cloud {
    resources: BTreeMap<String, SimResource>,
    faults: HashMap<ResourceKey, (ProviderError, usize)>,
    calls: Vec<Call>,
}

/// Deterministic stand-in for the Azure Resource Manager.
#[derive(Debug)]
pub struct SimulatedCloud {
    subscription: String,
    latency: Duration,
    inner: Mutex<Cloud>,
}

impl Default for SimulatedCloud {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIPTION)
    }
}

impl SimulatedCloud {
    /// Empty cloud for `subscription`
    pub fn new(subscription: impl Into<String>) -> Self {
        Self::from_resources(subscription, [])
    }

    /// Cloud that already holds `resources`, e.g. loaded from disk
    pub fn from_resources(
        subscription: impl Into<String>,
        resources: impl IntoIterator<Item = SimResource>,
    ) -> Self {
        let cloud = Cloud {
            resources: resources.into_iter().map(|r| (r.id.clone(), r)).collect(),
            ..Cloud::default()
        };
        Self {
            subscription: subscription.into(),
            latency: Duration::ZERO,
            inner: Mutex::new(cloud),
        }
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Subscription id used in resource ids
    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    /// Every stored resource, ordered by id
    pub fn resources(&self) -> Vec<SimResource> {
        self.lock().resources.values().cloned().collect()
    }

    /// Look up a resource by id
    pub fn get(&self, id: &str) -> Option<SimResource> {
        self.lock().resources.get(id).cloned()
    }

    /// Look up a resource by logical key
    pub fn find(&self, key: &ResourceKey) -> Option<SimResource> {
        self.lock()
            .resources
            .values()
            .find(|r| r.kind == key.kind && r.name == key.name)
            .cloned()
    }

    /// Number of stored resources
    pub fn len(&self) -> usize {
        self.lock().resources.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.lock().resources.is_empty()
    }

    /// Make the next `times` calls touching `key` fail with `error`
    pub fn fail_next(&self, key: &ResourceKey, error: ProviderError, times: usize) {
        if times == 0 {
            return;
        }
        self.lock().faults.insert(key.clone(), (error, times));
    }

    /// Calls received so far, in arrival order
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Cloud> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log the call, apply injected faults, then wait out the latency
    fn begin(
        &self,
        call: Call,
        key: Option<&ResourceKey>,
        timeout: Duration,
    ) -> Result<(), ProviderError> {
        {
            let mut cloud = self.lock();
            cloud.calls.push(call);
            if let Some(key) = key
                && let Some(error) = cloud.take_fault(key)
            {
                log::debug!("Injected failure for {key}: {error}");
                return Err(error);
            }
        }
        if self.latency > timeout {
            thread::sleep(timeout);
            return Err(ProviderError::Timeout { after: timeout });
        }
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        Ok(())
    }

    fn group_id(&self, name: &str) -> String {
        format!("/subscriptions/{}/resourceGroups/{name}", self.subscription)
    }

    /// Resource id plus the id of the resource it must live under
    fn place(
        &self,
        key: &ResourceKey,
        desired: &PropertyMap,
    ) -> Result<(String, Option<String>), ProviderError> {
        let arm_type = arm_type(&key.kind).ok_or_else(|| {
            ProviderError::permanent(format!("unsupported resource type {}", key.kind))
        })?;
        if key.kind == kind::RESOURCE_GROUP {
            return Ok((self.group_id(&key.name), None));
        }

        let group = self.group_id(required_str(desired, "resource_group_name")?);
        let (parent, id) = match key.kind.as_str() {
            kind::SUBNET => {
                let vnet = required_str(desired, "virtual_network_name")?;
                let parent = format!("{group}/providers/Microsoft.Network/virtualNetworks/{vnet}");
                let id = format!("{parent}/subnets/{}", key.name);
                (parent, id)
            }
            kind::SECURITY_RULE => {
                let nsg = required_str(desired, "network_security_group_name")?;
                let parent =
                    format!("{group}/providers/Microsoft.Network/networkSecurityGroups/{nsg}");
                let id = format!("{parent}/securityRules/{}", key.name);
                (parent, id)
            }
            _ => {
                let id = format!("{group}/providers/{arm_type}/{}", key.name);
                (group, id)
            }
        };
        Ok((id, Some(parent)))
    }
}

impl Cloud {
    fn take_fault(&mut self, key: &ResourceKey) -> Option<ProviderError> {
        let (error, remaining) = self.faults.get_mut(key)?;
        let error = error.clone();
        *remaining -= 1;
        if *remaining == 0 {
            self.faults.remove(key);
        }
        Some(error)
    }

    fn address_prefix(&self, subnet_id: &str) -> Result<Cidr, ProviderError> {
        let subnet = self
            .resources
            .get(subnet_id)
            .ok_or_else(|| ProviderError::permanent(format!("subnet {subnet_id} not found")))?;
        parse_cidr(subnet.properties.get("address_prefix"))
    }

    /// Subnet must fit its network and not overlap a sibling
    fn check_subnet(&self, id: &str, vnet_id: &str, desired: &PropertyMap) -> Result<(), ProviderError> {
        let prefix = parse_cidr(desired.get("address_prefix"))?;
        let vnet = self
            .resources
            .get(vnet_id)
            .ok_or_else(|| ProviderError::permanent(format!("virtual network {vnet_id} not found")))?;
        let spaces = vnet
            .properties
            .get("address_space")
            .and_then(|s| s.get("address_prefixes"))
            .and_then(Value::as_array)
            .map(|items| items.iter().map(|v| parse_cidr(Some(v))).collect::<Result<Vec<_>, _>>())
            .transpose()?
            .unwrap_or_default();
        if !spaces.iter().any(|space| space.contains_block(&prefix)) {
            return Err(ProviderError::permanent(format!(
                "subnet prefix {prefix} is outside the address space of {}",
                vnet.name
            )));
        }

        let siblings = format!("{vnet_id}/subnets/");
        for sibling in self
            .resources
            .values()
            .filter(|r| r.id != id && r.id.starts_with(&siblings))
        {
            let other = parse_cidr(sibling.properties.get("address_prefix"))?;
            if other.overlaps(&prefix) {
                return Err(ProviderError::permanent(format!(
                    "subnet prefix {prefix} overlaps subnet {} ({other})",
                    sibling.name
                )));
            }
        }
        Ok(())
    }

    /// Validate a static NIC address or allocate a dynamic one
    fn assign_private_ip(&self, id: &str, realized: &mut PropertyMap) -> Result<(), ProviderError> {
        let Some(config) = realized
            .get_mut("ip_configurations")
            .and_then(Value::as_array_mut)
            .and_then(|configs| configs.first_mut())
            .and_then(Value::as_object_mut)
        else {
            return Err(ProviderError::permanent("network interface needs an ip configuration"));
        };
        let subnet_id = config
            .get("subnet")
            .and_then(|s| s.get("id"))
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::permanent("ip configuration has no subnet"))?
            .to_string();
        let prefix = self.address_prefix(&subnet_id)?;

        let in_use: Vec<Ipv4Addr> = self
            .resources
            .values()
            .filter(|r| r.kind == kind::NETWORK_INTERFACE && r.id != id)
            .filter_map(|r| private_ip_of(&r.properties, &subnet_id))
            .collect();
        let usable = |ip: Ipv4Addr| {
            let offset = u32::from(ip).wrapping_sub(u32::from(prefix.network()));
            prefix.contains(ip)
                && offset >= FIRST_USABLE_HOST
                && u64::from(offset) < prefix.size() - 1
        };

        let method = config
            .get("private_ip_allocation_method")
            .and_then(Value::as_str)
            .unwrap_or("Dynamic");
        let address = if method == "Static" {
            let ip: Ipv4Addr = config
                .get("private_ip_address")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ProviderError::permanent("Static allocation needs a private_ip_address"))?;
            if !usable(ip) {
                return Err(ProviderError::permanent(format!(
                    "{ip} is not a usable address in subnet {prefix}"
                )));
            }
            if in_use.contains(&ip) {
                return Err(ProviderError::permanent(format!("{ip} is already in use")));
            }
            ip
        } else {
            let current = self
                .resources
                .get(id)
                .and_then(|r| private_ip_of(&r.properties, &subnet_id));
            match current {
                Some(ip) => ip,
                None => (FIRST_USABLE_HOST..)
                    .map_while(|offset| prefix.host(offset))
                    .find(|ip| usable(*ip) && !in_use.contains(ip))
                    .ok_or_else(|| ProviderError::permanent(format!("subnet {prefix} is full")))?,
            }
        };
        config.insert("private_ip_address".into(), Value::String(address.to_string()));
        Ok(())
    }

    /// FQDN from the DNS label, plus an address for Static allocation
    fn assign_public_ip(&self, id: &str, realized: &mut PropertyMap) {
        let location = realized
            .get("location")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if let Some(dns) = realized.get_mut("dns_settings").and_then(Value::as_object_mut)
            && let Some(label) = dns.get("domain_name_label").and_then(Value::as_str)
        {
            let fqdn = format!("{label}.{location}.cloudapp.azure.com");
            dns.insert("fqdn".into(), Value::String(fqdn));
        }

        if realized.get("public_ip_allocation_method").and_then(Value::as_str) != Some("Static") {
            return;
        }
        let current = self
            .resources
            .get(id)
            .and_then(|r| r.properties.get("ip_address"))
            .cloned();
        let address = current.unwrap_or_else(|| {
            let taken: Vec<&str> = self
                .resources
                .values()
                .filter_map(|r| r.properties.get("ip_address").and_then(Value::as_str))
                .collect();
            let free = (FIRST_USABLE_HOST..)
                .map(|offset| Ipv4Addr::from(u32::from(PUBLIC_POOL) + offset).to_string())
                .find(|ip| !taken.contains(&ip.as_str()))
                .unwrap_or_default();
            Value::String(free)
        });
        realized.insert("ip_address".into(), address);
    }
}

impl Provider for SimulatedCloud {
    fn create_or_update(
        &self,
        key: &ResourceKey,
        desired: &PropertyMap,
        timeout: Duration,
    ) -> Result<PropertyMap, ProviderError> {
        self.begin(Call::CreateOrUpdate(key.clone()), Some(key), timeout)?;
        let (id, parent) = self.place(key, desired)?;

        let mut cloud = self.lock();
        if let Some(parent) = &parent
            && !cloud.resources.contains_key(parent)
        {
            return Err(ProviderError::permanent(format!(
                "parent resource {parent} does not exist"
            )));
        }
        let mut referenced = Vec::new();
        collect_references(desired, &mut referenced);
        if let Some(missing) = referenced.iter().find(|r| !cloud.resources.contains_key(*r)) {
            return Err(ProviderError::permanent(format!(
                "{key} references missing resource {missing}"
            )));
        }

        let mut realized = desired.clone();
        match key.kind.as_str() {
            kind::SUBNET => {
                if let Some(vnet_id) = &parent {
                    cloud.check_subnet(&id, vnet_id, desired)?;
                }
            }
            kind::NETWORK_INTERFACE => cloud.assign_private_ip(&id, &mut realized)?,
            kind::PUBLIC_IP_ADDRESS => cloud.assign_public_ip(&id, &mut realized),
            kind::VIRTUAL_MACHINE => {
                if let Some(profile) = realized.get_mut("os_profile").and_then(Value::as_object_mut) {
                    profile
                        .entry("computer_name")
                        .or_insert_with(|| Value::String(key.name.clone()));
                }
            }
            _ => {}
        }

        let existed = cloud.resources.contains_key(&id);
        realized.insert("id".into(), Value::String(id.clone()));
        realized.insert("name".into(), Value::String(key.name.clone()));
        if let Some(arm_type) = arm_type(&key.kind) {
            realized.insert("type".into(), Value::String(arm_type.to_string()));
        }
        realized.insert("provisioning_state".into(), Value::String("Succeeded".into()));

        log::info!("{} {id}", if existed { "Updated" } else { "Created" });
        cloud.resources.insert(
            id.clone(),
            SimResource {
                id,
                kind: key.kind.clone(),
                name: key.name.clone(),
                properties: realized.clone(),
            },
        );
        Ok(realized)
    }

    fn delete(&self, kind: &str, remote_id: &str, timeout: Duration) -> Result<(), ProviderError> {
        let key = self.lock().resources.get(remote_id).map(SimResource::key);
        self.begin(Call::Delete(remote_id.to_string()), key.as_ref(), timeout)?;

        let mut cloud = self.lock();
        let Some(resource) = cloud.resources.get(remote_id) else {
            log::debug!("{remote_id} is already gone");
            return Ok(());
        };
        if resource.kind != kind {
            return Err(ProviderError::permanent(format!(
                "{remote_id} is a {}, not a {kind}",
                resource.kind
            )));
        }

        let children = format!("{remote_id}/");
        if let Some(child) = cloud.resources.keys().find(|id| id.starts_with(&children)) {
            return Err(ProviderError::permanent(format!(
                "{remote_id} still contains {child}"
            )));
        }
        if let Some(user) = cloud.resources.values().find(|r| {
            let mut referenced = Vec::new();
            collect_references(&r.properties, &mut referenced);
            referenced.iter().any(|id| id == remote_id)
        }) {
            return Err(ProviderError::permanent(format!(
                "{remote_id} is in use by {}",
                user.id
            )));
        }

        cloud.resources.remove(remote_id);
        log::info!("Deleted {remote_id}");
        Ok(())
    }
}

fn arm_type(kind: &str) -> Option<&'static str> {
    Some(match kind {
        kind::RESOURCE_GROUP => "Microsoft.Resources/resourceGroups",
        kind::VIRTUAL_NETWORK => "Microsoft.Network/virtualNetworks",
        kind::SUBNET => "Microsoft.Network/virtualNetworks/subnets",
        kind::NETWORK_SECURITY_GROUP => "Microsoft.Network/networkSecurityGroups",
        kind::SECURITY_RULE => "Microsoft.Network/networkSecurityGroups/securityRules",
        kind::PUBLIC_IP_ADDRESS => "Microsoft.Network/publicIPAddresses",
        kind::NETWORK_INTERFACE => "Microsoft.Network/networkInterfaces",
        kind::VIRTUAL_MACHINE => "Microsoft.Compute/virtualMachines",
        _ => return None,
    })
}

fn required_str<'a>(desired: &'a PropertyMap, name: &str) -> Result<&'a str, ProviderError> {
    desired
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProviderError::permanent(format!("missing required property '{name}'")))
}

fn parse_cidr(value: Option<&Value>) -> Result<Cidr, ProviderError> {
    let text = value
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::permanent("missing address prefix"))?;
    text.parse()
        .map_err(|e: crate::Error| ProviderError::permanent(e.to_string()))
}

fn private_ip_of(properties: &PropertyMap, subnet_id: &str) -> Option<Ipv4Addr> {
    let config = properties.get("ip_configurations")?.as_array()?.first()?;
    if config.get("subnet")?.get("id")?.as_str()? != subnet_id {
        return None;
    }
    config.get("private_ip_address")?.as_str()?.parse().ok()
}

/// Ids in `{"id": ...}` reference objects anywhere below the top level
fn collect_references(properties: &PropertyMap, into: &mut Vec<String>) {
    fn walk(value: &Value, into: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                if map.len() == 1
                    && let Some(Value::String(id)) = map.get("id")
                {
                    into.push(id.clone());
                    return;
                }
                map.values().for_each(|v| walk(v, into));
            }
            Value::Array(items) => items.iter().for_each(|v| walk(v, into)),
            _ => {}
        }
    }
    properties.values().for_each(|v| walk(v, into));
}

//! The playground stack: resource group, network, security group and one
//! Ubuntu VM reachable through a public IP.

use crate::config::NimbusConfig;
use anyhow::Result;
use azurekit::{
    NetworkInterfaceArgs, NetworkSecurityGroupArgs, PublicIpArgs, ResourceGroupArgs,
    SecurityRuleArgs, SubnetArgs, VirtualMachineArgs, VirtualNetworkArgs,
};
use converge::{OutputError, Stack};

pub const NSG: &str = "nsg";
pub const VNET: &str = "vnet";
pub const SUBNET: &str = "snet";

/// Export holding the VM's public DNS name
pub const EXPORT_FQDN: &str = "vm_fqdn";
/// Export holding the VM's resource id
pub const EXPORT_VM_ID: &str = "vm_id";

/// Declare every resource described by `config`
pub fn declare(config: &NimbusConfig, ssh_public_key: &str) -> Result<Stack> {
    let mut stack = Stack::new(&config.stack).with_default_tags(config.tags.clone());

    let rg = stack.declare(&config.resource_group, ResourceGroupArgs::new(&config.location))?;
    let group = rg.name();
    let location = rg.output("location");
    let private_ip = config.private_ip()?;

    let nsg = if config.nsg_association == crate::config::NsgAssociation::None {
        None
    } else {
        let nsg = stack.declare(NSG, NetworkSecurityGroupArgs::new(&group, &location))?;
        for rule in &config.rules {
            let mut args = SecurityRuleArgs::new(&group, nsg.name(), rule.priority);
            args.protocol = rule.protocol;
            args.access = rule.access;
            args.destination_port_range = rule.port.clone();
            args.source_address_prefix = rule.source.clone();
            args.destination_address_prefix = private_ip.host_block().to_string();
            stack.declare(&rule.name, args)?;
        }
        Some(nsg)
    };

    let vnet = stack.declare(
        VNET,
        VirtualNetworkArgs::new(&group, &location, config.address_space.clone()),
    )?;

    let mut subnet_args = SubnetArgs::new(&group, vnet.name(), config.subnet_prefix);
    if let Some(nsg) = &nsg
        && config.nsg_association.on_subnet()
    {
        subnet_args = subnet_args.with_security_group(nsg.id());
    }
    let subnet = stack.declare(SUBNET, subnet_args)?;

    let mut pip_args = PublicIpArgs::new(&group, &location);
    pip_args.allocation = config.public_ip_allocation;
    pip_args.sku = config.public_ip_sku;
    pip_args.domain_name_label = config.label().map(str::to_string);
    let pip = stack.declare(&format!("pip-{}", config.vm_name), pip_args)?;

    let mut nic_args = NetworkInterfaceArgs::new(&group, &location, subnet.id(), private_ip)
        .with_public_ip(pip.id());
    if let Some(nsg) = &nsg
        && config.nsg_association.on_nic()
    {
        nic_args = nic_args.with_security_group(nsg.id());
    }
    let nic = stack.declare(&format!("nic_{}", config.vm_name), nic_args)?;

    let mut vm_args = VirtualMachineArgs::new(
        &group,
        &location,
        nic.id(),
        &config.admin_username,
        ssh_public_key,
    )
    .with_computer_name(&config.vm_name);
    vm_args.vm_size = config.vm_size.clone();
    vm_args.image = config.image.clone();
    let vm = stack.declare(&config.vm_name, vm_args)?;

    if config.label().is_some() {
        stack.export(
            EXPORT_FQDN,
            pip.output("dns_settings").and_then(|dns| {
                dns.get("fqdn")
                    .cloned()
                    .ok_or_else(|| OutputError::new("public IP has no fqdn"))
            }),
        );
    }
    stack.export(EXPORT_VM_ID, vm.id());

    log::debug!("Declared {} resource(s) in stack {}", stack.len(), stack.name());
    Ok(stack)
}

//! # azurekit
//!
//! Typed Azure resource arguments for the `converge` engine, plus an
//! in-process simulated control plane.
//!
//! This crate provides:
//! - `*Args` structs for resource groups, networks, security rules, public
//!   IPs, network interfaces and Linux VMs, with Azure's defaults and rules
//! - [`Cidr`] and [`PrivateIp`] parsing
//! - [`SimulatedCloud`], a deterministic [`converge::Provider`]
//!
//! ## Example
//!
//! ```no_run
//! use azurekit::{ResourceGroupArgs, SimulatedCloud, VirtualNetworkArgs};
//! use converge::{CancellationToken, Engine, MemoryStore, NoProgress, Stack};
//!
//! let mut stack = Stack::new("playground");
//! let rg = stack.declare("playground", ResourceGroupArgs::new("westeurope")).unwrap();
//! let cidr = "10.0.0.0/16".parse().unwrap();
//! stack
//!     .declare("vnet", VirtualNetworkArgs::new(rg.name(), rg.output("location"), vec![cidr]))
//!     .unwrap();
//!
//! let engine = Engine::new(SimulatedCloud::default(), MemoryStore::new());
//! let report = engine.apply(&stack, &mut NoProgress, &CancellationToken::new()).unwrap();
//! assert!(report.is_success());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod net;
pub mod resources;
pub mod sim;

pub use error::{Error, Result};
pub use net::{Cidr, PrivateIp};
pub use resources::{
    Access, Allocation, Direction, ImageReference, Input, IpVersion, NetworkInterfaceArgs,
    NetworkSecurityGroupArgs, Protocol, PublicIpArgs, PublicIpSku, ResourceGroupArgs,
    SecurityRuleArgs, SubnetArgs, VirtualMachineArgs, VirtualNetworkArgs, kind,
};
pub use sim::{Call, DEFAULT_SUBSCRIPTION, SimResource, SimulatedCloud};

//! IPv4 address blocks and private addresses.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 network in CIDR notation, e.g. `10.0.0.0/16`.
///
/// Host bits must be zero: `10.0.0.1/16` is rejected rather than silently
/// truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Cidr {
    /// Build a block from a network address and prefix length.
    pub fn new(network: Ipv4Addr, prefix: u8) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidCidr {
            value: format!("{network}/{prefix}"),
            reason,
        };
        if prefix > 32 {
            return Err(invalid("prefix length must be at most 32".to_string()));
        }
        let cidr = Self { network, prefix };
        let masked = Ipv4Addr::from(u32::from(network) & cidr.mask());
        if masked != network {
            return Err(invalid(format!("host bits are set, did you mean {masked}/{prefix}?")));
        }
        Ok(cidr)
    }

    /// First address of the block.
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Prefix length in bits.
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    fn mask(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix))
        }
    }

    /// Number of addresses in the block.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    /// Whether `address` falls inside this block.
    pub fn contains(&self, address: Ipv4Addr) -> bool {
        u32::from(address) & self.mask() == u32::from(self.network)
    }

    /// Whether `other` lies entirely inside this block.
    pub fn contains_block(&self, other: &Self) -> bool {
        other.prefix >= self.prefix && self.contains(other.network)
    }

    /// Whether the two blocks share any address.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.contains(other.network) || other.contains(self.network)
    }

    /// Address at `offset` from the network address, if it is inside the block.
    pub fn host(&self, offset: u32) -> Option<Ipv4Addr> {
        if u64::from(offset) >= self.size() {
            return None;
        }
        Some(Ipv4Addr::from(u32::from(self.network) + offset))
    }

    /// Block of length `prefix` that contains `address`, host bits cleared.
    ///
    /// Prefixes above 32 are clamped to 32.
    pub fn containing(address: Ipv4Addr, prefix: u8) -> Self {
        let mut cidr = Self {
            network: address,
            prefix: prefix.min(32),
        };
        cidr.network = Ipv4Addr::from(u32::from(address) & cidr.mask());
        cidr
    }

    /// Single-address block for `address`.
    pub fn single(address: Ipv4Addr) -> Self {
        Self {
            network: address,
            prefix: 32,
        }
    }
}

impl FromStr for Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidCidr {
            value: s.to_string(),
            reason: reason.to_string(),
        };
        let (address, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| invalid("expected <address>/<prefix>"))?;
        let address: Ipv4Addr = address
            .parse()
            .map_err(|_| invalid("not an IPv4 address"))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| invalid("prefix length must be a number"))?;
        Self::new(address, prefix)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl TryFrom<String> for Cidr {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Cidr> for String {
    fn from(cidr: Cidr) -> Self {
        cidr.to_string()
    }
}

/// An RFC 1918 private IPv4 address, as used for static NIC addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrivateIp(Ipv4Addr);

impl PrivateIp {
    /// Validate an address as private.
    pub fn new(address: Ipv4Addr) -> Result<Self> {
        if !address.is_private() {
            return Err(Error::InvalidAddress {
                value: address.to_string(),
                reason: "not in a private range (10/8, 172.16/12, 192.168/16)".to_string(),
            });
        }
        Ok(Self(address))
    }

    /// The underlying address.
    pub fn address(&self) -> Ipv4Addr {
        self.0
    }

    /// `/32` block for this address, e.g. for security rule destinations.
    pub fn host_block(&self) -> Cidr {
        Cidr::single(self.0)
    }
}

impl FromStr for PrivateIp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let address: Ipv4Addr = s.trim().parse().map_err(|_| Error::InvalidAddress {
            value: s.to_string(),
            reason: "not an IPv4 address".to_string(),
        })?;
        Self::new(address)
    }
}

impl fmt::Display for PrivateIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<String> for PrivateIp {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PrivateIp> for String {
    fn from(ip: PrivateIp) -> Self {
        ip.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let cidr: Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!(cidr.prefix(), 16);
        assert_eq!(cidr.size(), 65536);
        assert_eq!(cidr.to_string(), "10.0.0.0/16");
    }

    #[test]
    fn test_rejects_malformed_blocks() {
        for bad in ["10.0.0.0", "10.0.0/16", "10.0.0.0/33", "10.0.0.0/x"] {
            assert!(bad.parse::<Cidr>().is_err(), "{bad} should not parse");
        }
        let err = "10.0.0.1/16".parse::<Cidr>().unwrap_err();
        assert!(err.to_string().contains("did you mean 10.0.0.0/16"));
    }

    #[test]
    fn test_containment_and_overlap() {
        let vnet: Cidr = "10.0.0.0/16".parse().unwrap();
        let subnet: Cidr = "10.0.1.0/24".parse().unwrap();
        let other: Cidr = "10.1.0.0/16".parse().unwrap();
        assert!(vnet.contains_block(&subnet));
        assert!(!subnet.contains_block(&vnet));
        assert!(vnet.overlaps(&subnet));
        assert!(!vnet.overlaps(&other));
        assert!(subnet.contains("10.0.1.4".parse().unwrap()));
        assert_eq!(subnet.host(4), Some("10.0.1.4".parse().unwrap()));
        assert_eq!(subnet.host(256), None);
    }

    #[test]
    fn test_containing_clears_host_bits() {
        let cidr = Cidr::containing("10.0.1.77".parse().unwrap(), 24);
        assert_eq!(cidr.to_string(), "10.0.1.0/24");
        assert_eq!(Cidr::containing("10.0.1.77".parse().unwrap(), 40).prefix(), 32);
    }

    #[test]
    fn test_zero_prefix_covers_everything() {
        let all: Cidr = "0.0.0.0/0".parse().unwrap();
        assert!(all.contains("203.0.113.9".parse().unwrap()));
    }

    #[test]
    fn test_private_ip() {
        let ip: PrivateIp = "10.0.1.10".parse().unwrap();
        assert_eq!(ip.host_block().to_string(), "10.0.1.10/32");
        assert!("8.8.8.8".parse::<PrivateIp>().is_err());
        assert!("10.0.1".parse::<PrivateIp>().is_err());
    }

    #[test]
    fn test_serde_uses_text_form() {
        let cidr: Cidr = serde_json::from_str("\"192.168.0.0/24\"").unwrap();
        assert_eq!(serde_json::to_string(&cidr).unwrap(), "\"192.168.0.0/24\"");
        assert!(serde_json::from_str::<Cidr>("\"192.168.0.1/24\"").is_err());
    }
}

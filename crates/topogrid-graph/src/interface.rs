//! Network interfaces attached to a node.
//!
//! Interfaces are named `<prefix><index>` in NIC order. Control-network
//! interfaces always occupy index 0 so the management NIC is the first one
//! the guest sees.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use topo_core::RateUnit;

use crate::error::{GraphError, GraphResult};

pub const DEFAULT_INTERFACE_PREFIX: &str = "eth";

/// Link shaping parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Qos {
    /// Added latency, e.g. `"10ms"`.
    pub delay: Option<String>,
    pub rate: Option<u64>,
    pub unit: Option<RateUnit>,
    /// Packet loss percentage.
    pub loss: Option<f64>,
}

impl Qos {
    pub fn is_empty(&self) -> bool {
        self.delay.is_none() && self.rate.is_none() && self.loss.is_none()
    }

    /// Unit applied to `rate`.
    pub fn rate_unit(&self) -> RateUnit {
        self.unit.unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    /// Switch (segment) name this interface attaches to.
    pub segment: String,
    pub address: Option<Ipv4Addr>,
    pub prefix_len: Option<u8>,
    pub qos: Qos,
    pub is_control: bool,
    pub is_l2_only: bool,
    /// Backend interface type; filled with a default at translation.
    pub kind: Option<String>,
    pub driver: Option<String>,
    pub mac: Option<String>,
}

impl Interface {
    pub fn new(segment: &str) -> Self {
        Self {
            name: String::new(),
            segment: segment.to_string(),
            address: None,
            prefix_len: None,
            qos: Qos::default(),
            is_control: false,
            is_l2_only: false,
            kind: None,
            driver: None,
            mac: None,
        }
    }

    pub fn with_address(mut self, address: Ipv4Addr, prefix_len: u8) -> Self {
        self.address = Some(address);
        self.prefix_len = Some(prefix_len);
        self
    }

    pub fn with_qos(mut self, qos: Qos) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_mac(mut self, mac: &str) -> Self {
        self.mac = Some(mac.to_string());
        self
    }

    pub fn with_driver(mut self, driver: &str) -> Self {
        self.driver = Some(driver.to_string());
        self
    }

    pub fn l2_only(mut self) -> Self {
        self.is_l2_only = true;
        self
    }

    pub fn control(mut self) -> Self {
        self.is_control = true;
        self
    }

    pub fn netmask(&self) -> Option<Ipv4Addr> {
        self.prefix_len.map(prefix_to_mask)
    }

    /// Network address, e.g. `10.0.0.0/24`.
    pub fn network(&self) -> Option<(Ipv4Addr, u8)> {
        let (address, prefix) = (self.address?, self.prefix_len?);
        let mask = u32::from(prefix_to_mask(prefix));
        Some((Ipv4Addr::from(u32::from(address) & mask), prefix))
    }

    /// True if `other` lies inside this interface's network.
    pub fn network_contains(&self, other: Ipv4Addr) -> bool {
        match self.network() {
            Some((network, prefix)) => {
                let mask = u32::from(prefix_to_mask(prefix));
                u32::from(other) & mask == u32::from(network)
            }
            None => false,
        }
    }

    pub fn network_string(&self) -> Option<String> {
        self.network().map(|(net, prefix)| format!("{net}/{prefix}"))
    }
}

/// Ordered interface list of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interfaces {
    prefix: String,
    items: Vec<Interface>,
}

impl Default for Interfaces {
    fn default() -> Self {
        Self::new(DEFAULT_INTERFACE_PREFIX)
    }
}

impl Interfaces {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            items: Vec::new(),
        }
    }

    /// Add an interface and return its assigned name.
    pub fn add(&mut self, interface: Interface) -> String {
        let index = if interface.is_control {
            self.items.insert(0, interface);
            0
        } else {
            self.items.push(interface);
            self.items.len() - 1
        };
        self.rekey();
        self.items[index].name.clone()
    }

    pub fn remove(&mut self, name: &str) -> Option<Interface> {
        let position = self.items.iter().position(|i| i.name == name)?;
        let removed = self.items.remove(position);
        self.rekey();
        Some(removed)
    }

    /// Rename every interface after its position.
    pub fn rekey(&mut self) {
        for (index, interface) in self.items.iter_mut().enumerate() {
            interface.name = format!("{}{index}", self.prefix);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Interface> {
        self.items.iter().find(|i| i.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Interface> {
        self.items.iter_mut().find(|i| i.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Interface> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Interface> {
        self.items.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a> IntoIterator for &'a Interfaces {
    type Item = &'a Interface;
    type IntoIter = std::slice::Iter<'a, Interface>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

pub fn prefix_to_mask(prefix: u8) -> Ipv4Addr {
    let prefix = u32::from(prefix.min(32));
    let bits = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    };
    Ipv4Addr::from(bits)
}

/// Parse a netmask given as a prefix length (`24`) or dotted quad.
pub fn parse_netmask(value: &str) -> GraphResult<u8> {
    let value = value.trim().trim_start_matches('/');
    if let Ok(prefix) = value.parse::<u8>() {
        return if prefix <= 32 {
            Ok(prefix)
        } else {
            Err(GraphError::InvalidNetmask(value.to_string()))
        };
    }
    let mask: Ipv4Addr = value
        .parse()
        .map_err(|_| GraphError::InvalidNetmask(value.to_string()))?;
    let bits = u32::from(mask);
    let prefix = bits.leading_ones();
    if bits.checked_shl(prefix).unwrap_or(0) != 0 {
        return Err(GraphError::InvalidNetmask(value.to_string()));
    }
    Ok(prefix as u8)
}

pub fn parse_address(value: &str) -> GraphResult<Ipv4Addr> {
    value
        .trim()
        .parse()
        .map_err(|e: std::net::AddrParseError| GraphError::InvalidAddress {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

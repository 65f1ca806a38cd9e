//! Sequential MAC address allocation.

use std::collections::HashSet;

use crate::error::{GraphError, GraphResult};

const MAX_MAC: u64 = 0xFFFF_FFFF_FFFF;

/// Hands out unique MAC addresses counting up from a seed.
///
/// Addresses already in use are skipped. The counter wraps back to 1 after
/// `ff:ff:ff:ff:ff:ff`.
#[derive(Debug, Clone)]
pub struct MacAllocator {
    next: u64,
    used: HashSet<u64>,
}

impl Default for MacAllocator {
    fn default() -> Self {
        Self {
            next: 1,
            used: HashSet::new(),
        }
    }
}

impl MacAllocator {
    /// Start counting at `start`, which must be in `1..=0xFFFFFFFFFFFF`.
    pub fn starting_at(start: u64) -> GraphResult<Self> {
        if start == 0 || start > MAX_MAC {
            return Err(GraphError::InvalidMac(format!("{start:#x}")));
        }
        Ok(Self {
            next: start,
            used: HashSet::new(),
        })
    }

    /// Mark an existing address as taken.
    pub fn reserve(&mut self, mac: &str) -> GraphResult<()> {
        let value = parse_mac(mac).ok_or_else(|| GraphError::InvalidMac(mac.to_string()))?;
        self.used.insert(value);
        Ok(())
    }

    pub fn allocate(&mut self) -> GraphResult<String> {
        if self.used.len() as u64 >= MAX_MAC {
            return Err(GraphError::MacSpaceExhausted);
        }
        while self.used.contains(&self.next) {
            self.advance();
        }
        let value = self.next;
        self.used.insert(value);
        self.advance();
        Ok(format_mac(value))
    }

    fn advance(&mut self) {
        self.next += 1;
        if self.next > MAX_MAC {
            self.next = 1;
        }
    }
}

/// Format as `xx:xx:xx:xx:xx:xx`.
pub fn format_mac(value: u64) -> String {
    let bytes = value.to_be_bytes();
    bytes[2..]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parse `xx:xx:xx:xx:xx:xx` (also accepts `-` separators).
pub fn parse_mac(mac: &str) -> Option<u64> {
    let parts: Vec<&str> = mac.split([':', '-']).collect();
    if parts.len() != 6 {
        return None;
    }
    let mut value = 0u64;
    for part in parts {
        if part.len() != 2 {
            return None;
        }
        value = (value << 8) | u64::from(u8::from_str_radix(part, 16).ok()?);
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_sequentially_from_one() {
        let mut macs = MacAllocator::default();
        assert_eq!(macs.allocate().unwrap(), "00:00:00:00:00:01");
        assert_eq!(macs.allocate().unwrap(), "00:00:00:00:00:02");
    }

    #[test]
    fn skips_reserved_addresses() {
        let mut macs = MacAllocator::default();
        macs.reserve("00:00:00:00:00:01").unwrap();
        macs.reserve("00:00:00:00:00:02").unwrap();
        assert_eq!(macs.allocate().unwrap(), "00:00:00:00:00:03");
    }

    #[test]
    fn wraps_at_top_of_space() {
        let mut macs = MacAllocator::starting_at(MAX_MAC).unwrap();
        assert_eq!(macs.allocate().unwrap(), "ff:ff:ff:ff:ff:ff");
        assert_eq!(macs.allocate().unwrap(), "00:00:00:00:00:01");
    }

    #[test]
    fn parse_round_trip() {
        assert_eq!(parse_mac("de:ad:be:ef:00:01"), Some(0xdead_beef_0001));
        assert_eq!(format_mac(0xdead_beef_0001), "de:ad:be:ef:00:01");
        assert!(parse_mac("de:ad:be:ef:00").is_none());
        assert!(MacAllocator::starting_at(0).is_err());
    }
}

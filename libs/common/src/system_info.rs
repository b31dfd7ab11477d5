//! Host network information
//!
//! MES resolves the shop order assigned to a station by the hardware address
//! of the station PC, so the address has to be stable across calls.

use sysinfo::Networks;

/// Returned when no usable interface exists
pub const UNKNOWN_MAC: &str = "00:00:00:00:00:00";

/// First non-loopback interface MAC rendered as `AA:BB:CC:DD:EE:FF`
///
/// Interfaces are visited in name order. Loopback and all-zero addresses are
/// skipped, and [`UNKNOWN_MAC`] is returned when nothing qualifies.
pub fn local_mac_address() -> String {
    let networks = Networks::new_with_refreshed_list();
    let mut candidates: Vec<(&String, [u8; 6])> = networks
        .iter()
        .filter(|(name, _)| !is_loopback(name))
        .map(|(name, data)| (name, data.mac_address().0))
        .filter(|(_, mac)| mac.iter().any(|b| *b != 0))
        .collect();
    candidates.sort_by(|a, b| a.0.cmp(b.0));

    candidates
        .first()
        .map(|(_, mac)| format_mac(mac))
        .unwrap_or_else(|| UNKNOWN_MAC.to_string())
}

fn is_loopback(name: &str) -> bool {
    name == "lo" || name.starts_with("lo0") || name.to_ascii_lowercase().contains("loopback")
}

/// Render six octets as colon separated uppercase hex
pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

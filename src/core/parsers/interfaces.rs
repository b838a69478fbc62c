// src/core/parsers/interfaces.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::core::models::{Ipv4Entry, Ipv6Entry, LinkState, NetworkInterfaceRecord};

// `2: eth0: <BROADCAST,...> mtu 1500 ... state UP ...`, also `5: veth1@if4: ...`
static RE_IFACE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+:\s+([^\s:@]+)(?:@[^\s:]+)?:").unwrap());
static RE_STATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"state\s+(\w+)").unwrap());
static RE_MAC: Lazy<Regex> = Lazy::new(|| Regex::new(r"link/ether\s+([0-9a-fA-F:]+)").unwrap());
static RE_INET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"inet\s+([\d.]+)/(\d+)(?:\s+brd\s+([\d.]+))?").unwrap()
});
static RE_INET6: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"inet6\s+([0-9a-fA-F:]+)/(\d+)").unwrap());

/// Parses the output of `ip a` (iproute2) into one record per interface.
///
/// A line starting with `<index>: <name>:` opens a new interface; every following
/// line belongs to it until the next header. Lines seen before the first header are
/// ignored.
pub fn parse_ip_addr(output: &str) -> Vec<NetworkInterfaceRecord> {
    let mut interfaces: Vec<NetworkInterfaceRecord> = Vec::new();

    for raw_line in output.lines() {
        let line = raw_line.trim();

        if let Some(caps) = RE_IFACE_HEADER.captures(line) {
            let state = RE_STATE
                .captures(line)
                .map(|c| LinkState::from_token(&c[1]))
                .unwrap_or_default();
            interfaces.push(NetworkInterfaceRecord {
                name: caps[1].to_string(),
                state,
                ..Default::default()
            });
            continue;
        }

        let Some(current) = interfaces.last_mut() else {
            continue;
        };

        if let Some(caps) = RE_MAC.captures(line) {
            current.mac_address = caps[1].to_ascii_lowercase();
        }
        if let Some(caps) = RE_INET.captures(line) {
            current.ipv4_addresses.push(Ipv4Entry {
                address: caps[1].to_string(),
                cidr: caps[2].to_string(),
                broadcast: caps.get(3).map(|m| m.as_str().to_string()),
            });
        }
        if let Some(caps) = RE_INET6.captures(line) {
            current.ipv6_addresses.push(Ipv6Entry {
                address: caps[1].to_string(),
                cidr: caps[2].to_string(),
            });
        }
    }

    debug!(count = interfaces.len(), "Parsed network interfaces.");
    interfaces
}

/// Parses `hostname -I` output: whitespace separated addresses.
pub fn parse_short_ip_list(output: &str) -> Vec<String> {
    output.split_whitespace().map(str::to_string).collect()
}

/// Non-loopback IPv4 addresses of the given interfaces, in interface order.
pub fn primary_ipv4_addresses(interfaces: &[NetworkInterfaceRecord]) -> Vec<String> {
    interfaces
        .iter()
        .flat_map(|iface| iface.ipv4_addresses.iter())
        .map(|entry| entry.address.clone())
        .filter(|address| !address.starts_with("127."))
        .collect()
}

#[derive(Debug, Deserialize)]
struct NetIpAddress {
    #[serde(rename = "InterfaceAlias")]
    interface_alias: Option<String>,
    #[serde(rename = "IPAddress")]
    ip_address: Option<String>,
    #[serde(rename = "PrefixLength")]
    prefix_length: Option<u8>,
    #[serde(rename = "AddressFamily")]
    address_family: Option<serde_json::Value>,
}

/// Parses `Get-NetIPAddress | ConvertTo-Json` into interface records grouped by alias.
///
/// PowerShell emits a bare object when there is a single address, and the address
/// family either as its enum number (2 = IPv4) or as a string.
pub fn parse_net_ip_address_json(output: &str) -> Vec<NetworkInterfaceRecord> {
    let entries: Vec<NetIpAddress> = match super::json_list(output) {
        Some(entries) => entries,
        None => return Vec::new(),
    };

    let mut interfaces: Vec<NetworkInterfaceRecord> = Vec::new();
    for entry in entries {
        let (Some(alias), Some(address)) = (entry.interface_alias, entry.ip_address) else {
            continue;
        };
        let cidr = entry.prefix_length.map(|p| p.to_string()).unwrap_or_default();
        let is_ipv4 = match &entry.address_family {
            Some(serde_json::Value::Number(n)) => n.as_u64() == Some(2),
            Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("ipv4"),
            _ => address.contains('.'),
        };

        let index = match interfaces.iter().position(|i| i.name == alias) {
            Some(index) => index,
            None => {
                interfaces.push(NetworkInterfaceRecord {
                    name: alias,
                    ..Default::default()
                });
                interfaces.len() - 1
            }
        };
        let iface = &mut interfaces[index];
        if is_ipv4 {
            iface.ipv4_addresses.push(Ipv4Entry {
                address,
                cidr,
                broadcast: None,
            });
        } else {
            iface.ipv6_addresses.push(Ipv6Entry { address, cidr });
        }
    }
    interfaces
}

// src/core/parsers/sockets.rs

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::core::models::{SocketEndpoint, SocketRecord};

static RE_PID: Lazy<Regex> = Lazy::new(|| Regex::new(r"pid=(\d+)").unwrap());

/// Layout of the socket table a platform's tool prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketTableFormat {
    /// `ss -tanp`: one header row, then `State Recv-Q Send-Q Local Peer [Process]`.
    Linux,
    /// `netstat -ano`: four header lines, then `Proto Local Foreign State PID`.
    Windows,
}

impl SocketTableFormat {
    fn header_lines(self) -> usize {
        match self {
            Self::Linux => 1,
            Self::Windows => 4,
        }
    }

    fn min_columns(self) -> usize {
        5
    }
}

/// Parses a socket table. Header lines are always skipped and rows with fewer
/// columns than the format needs are dropped.
pub fn parse_socket_table(output: &str, format: SocketTableFormat) -> Vec<SocketRecord> {
    let mut dropped = 0usize;
    let records: Vec<SocketRecord> = output
        .lines()
        .skip(format.header_lines())
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() < format.min_columns() {
                dropped += 1;
                return None;
            }
            Some(match format {
                SocketTableFormat::Linux => linux_row(&columns),
                SocketTableFormat::Windows => windows_row(&columns),
            })
        })
        .collect();

    debug!(sockets = records.len(), dropped, ?format, "Parsed socket table.");
    records
}

fn linux_row(columns: &[&str]) -> SocketRecord {
    let process = columns[5..].join(" ");
    SocketRecord {
        protocol: "tcp".to_string(),
        state: columns[0].to_string(),
        local: split_endpoint(columns[3]),
        peer: split_endpoint(columns[4]),
        pid: RE_PID
            .captures(&process)
            .and_then(|c| c[1].parse().ok()),
    }
}

fn windows_row(columns: &[&str]) -> SocketRecord {
    SocketRecord {
        protocol: columns[0].to_ascii_lowercase(),
        state: columns[3].to_string(),
        local: split_endpoint(columns[1]),
        peer: split_endpoint(columns[2]),
        pid: columns[4].parse().ok(),
    }
}

/// Splits `addr:port` on the last colon, so `[::]:22` and `fe80::1%eth0:5353` work.
/// A `*` port means "any" and is kept as `None`.
fn split_endpoint(raw: &str) -> SocketEndpoint {
    match raw.rsplit_once(':') {
        Some((address, port)) => SocketEndpoint {
            address: address.to_string(),
            port: port.parse().ok(),
        },
        None => SocketEndpoint {
            address: raw.to_string(),
            port: None,
        },
    }
}

// src/core/parsers/ports.rs

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

use crate::core::models::{PortRecord, PortState};

/// Literal used for service fields the scanner could not identify.
pub const NOT_AVAILABLE: &str = "N/A";

/// Service names treated as web endpoints when their port is open.
pub const WEB_SERVICES: &[&str] = &["http", "https", "http-alt", "http-proxy"];

/// What we keep from an nmap XML report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NmapRun {
    /// First `<address>` of the first host, when the report has one.
    pub address: Option<String>,
    pub ports: Vec<PortRecord>,
}

#[derive(Debug, Default)]
struct PortBuilder {
    port: Option<u16>,
    protocol: String,
    state: Option<String>,
    service: Option<String>,
    product: Option<String>,
    version: Option<String>,
}

impl PortBuilder {
    fn from_element(e: &BytesStart<'_>) -> Self {
        let mut builder = Self::default();
        for attr in e.attributes().flatten() {
            let value = String::from_utf8_lossy(&attr.value);
            match attr.key.as_ref() {
                b"portid" => builder.port = value.parse().ok(),
                b"protocol" => builder.protocol = value.into_owned(),
                _ => {}
            }
        }
        builder
    }

    fn read_state(&mut self, e: &BytesStart<'_>) {
        self.state = attribute(e, b"state");
    }

    fn read_service(&mut self, e: &BytesStart<'_>) {
        self.service = attribute(e, b"name");
        self.product = attribute(e, b"product");
        self.version = attribute(e, b"version");
    }

    fn build(self) -> Option<PortRecord> {
        let or_na = |v: Option<String>| {
            v.filter(|s| !s.is_empty())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string())
        };
        Some(PortRecord {
            port: self.port?,
            protocol: self.protocol,
            state: self
                .state
                .as_deref()
                .map(PortState::from_nmap)
                .unwrap_or(PortState::Unknown),
            service: or_na(self.service),
            product: or_na(self.product),
            version: or_na(self.version),
        })
    }
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// Parses an nmap `-oX` document into port records.
///
/// Every `<port>` is reported whatever its state; elements missing a `portid` are
/// skipped. Only malformed XML is an error.
pub fn parse_nmap_xml(xml: &str) -> Result<NmapRun, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut run = NmapRun::default();
    let mut current: Option<PortBuilder> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"address" => {
                if run.address.is_none() {
                    run.address = attribute(&e, b"addr");
                }
            }
            Event::Start(e) if e.name().as_ref() == b"port" => {
                current = Some(PortBuilder::from_element(&e));
            }
            Event::Empty(e) if e.name().as_ref() == b"port" => {
                run.ports.extend(PortBuilder::from_element(&e).build());
            }
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"state" => {
                if let Some(builder) = current.as_mut() {
                    builder.read_state(&e);
                }
            }
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"service" => {
                if let Some(builder) = current.as_mut() {
                    builder.read_service(&e);
                }
            }
            Event::End(e) if e.name().as_ref() == b"port" => {
                if let Some(builder) = current.take() {
                    run.ports.extend(builder.build());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    debug!(ports = run.ports.len(), "Parsed nmap report.");
    Ok(run)
}

/// Whether a port should be handed to downstream web scanners.
pub fn is_web_like(port: &PortRecord) -> bool {
    port.state == PortState::Open && WEB_SERVICES.contains(&port.service.as_str())
}

/// Builds the downstream web target list: one URL per web-like port, then the bare
/// `host` appended unconditionally.
pub fn web_targets(ports: &[PortRecord], host: &str) -> Vec<String> {
    let mut targets: Vec<String> = ports
        .iter()
        .filter(|p| is_web_like(p))
        .map(|p| {
            let scheme = if p.service == "https" { "https" } else { "http" };
            format!("{scheme}://{host}:{}", p.port)
        })
        .collect();
    targets.push(host.to_string());
    targets
}

// src/core/parsers/mod.rs

// Pure text/XML/JSON parsers, one module per tool family. None of them do I/O and
// none of them fail on missing fields: absent data becomes an empty or default value.

pub mod hardening;
pub mod interfaces;
pub mod inventory;
pub mod ports;
pub mod sockets;

pub use inventory::json_list;

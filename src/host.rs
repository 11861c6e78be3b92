//! Boundary to the embedding host.
//!
//! Everything the runtime consumes from its host — debug knobs, file
//! lookup, the clock, interface link types, host/port result tables, and
//! the `log_write` sink — crosses this trait. The runtime never reaches
//! past it, so hosts control all of it, and tests can substitute the whole
//! environment.

use crate::cap::LinkType;

use std::collections::HashMap;
use std::ffi::CString;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// The two streams scripts may write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// Host descriptor passed opaquely through the port-state accessors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostRecord {
    pub ip: IpAddr,
}

/// Port descriptor passed opaquely through the port-state accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRecord {
    pub number: u16,
    pub protocol: String,
    pub state: String,
    pub version: Option<String>,
}

/// Services the embedding host provides to the runtime.
pub trait HostEnv {
    fn debugging(&self) -> u32;
    fn verbosity(&self) -> u32;
    fn timing_level(&self) -> u32;

    /// Resolves a data-file name against the host's search paths.
    fn fetch_file(&self, name: &str) -> Option<PathBuf>;

    /// Epoch milliseconds.
    fn clock_ms(&self) -> u64;

    /// Link-layer framing of a named interface, if it exists.
    fn link_type(&self, device: &str) -> Option<LinkType>;

    /// The only script-visible output primitive the runtime depends on.
    fn log_write(&self, stream: LogStream, text: &str);

    fn get_port_state(&self, host: &HostRecord, number: u16, protocol: &str)
    -> Option<PortRecord>;
    fn set_port_state(&self, host: &HostRecord, port: PortRecord);
    fn set_port_version(&self, host: &HostRecord, port: PortRecord);
}

/// Process-stdio host with an in-memory port table.
pub struct DefaultHost {
    pub debugging: u32,
    pub verbosity: u32,
    pub timing_level: u32,
    pub search_paths: Vec<PathBuf>,
    ports: Mutex<HashMap<(IpAddr, u16, String), PortRecord>>,
}

impl DefaultHost {
    pub fn new() -> Self {
        Self {
            debugging: 0,
            verbosity: 0,
            timing_level: 3,
            search_paths: Vec::new(),
            ports: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for DefaultHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostEnv for DefaultHost {
    fn debugging(&self) -> u32 {
        self.debugging
    }

    fn verbosity(&self) -> u32 {
        self.verbosity
    }

    fn timing_level(&self) -> u32 {
        self.timing_level
    }

    fn fetch_file(&self, name: &str) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    fn clock_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn link_type(&self, device: &str) -> Option<LinkType> {
        let name = CString::new(device).ok()?;
        let ifindex = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if ifindex == 0 {
            None
        } else {
            Some(LinkType::Ethernet)
        }
    }

    fn log_write(&self, stream: LogStream, text: &str) {
        match stream {
            LogStream::Stdout => println!("{text}"),
            LogStream::Stderr => eprintln!("{text}"),
        }
    }

    fn get_port_state(
        &self,
        host: &HostRecord,
        number: u16,
        protocol: &str,
    ) -> Option<PortRecord> {
        let ports = self.ports.lock().unwrap();
        ports.get(&(host.ip, number, protocol.to_string())).cloned()
    }

    fn set_port_state(&self, host: &HostRecord, port: PortRecord) {
        let mut ports = self.ports.lock().unwrap();
        ports.insert((host.ip, port.number, port.protocol.clone()), port);
    }

    fn set_port_version(&self, host: &HostRecord, port: PortRecord) {
        let mut ports = self.ports.lock().unwrap();
        let key = (host.ip, port.number, port.protocol.clone());
        match ports.get_mut(&key) {
            Some(existing) => existing.version = port.version,
            None => {
                ports.insert(key, port);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_table_round_trip() {
        let host_env = DefaultHost::new();
        let target = HostRecord {
            ip: "10.0.0.9".parse().unwrap(),
        };

        assert!(host_env.get_port_state(&target, 22, "tcp").is_none());

        host_env.set_port_state(
            &target,
            PortRecord {
                number: 22,
                protocol: String::from("tcp"),
                state: String::from("open"),
                version: None,
            },
        );

        host_env.set_port_version(
            &target,
            PortRecord {
                number: 22,
                protocol: String::from("tcp"),
                state: String::from("open"),
                version: Some(String::from("OpenSSH 9.6")),
            },
        );

        let port = host_env.get_port_state(&target, 22, "tcp").unwrap();
        assert_eq!(port.state, "open");
        assert_eq!(port.version.as_deref(), Some("OpenSSH 9.6"));
    }
}

//! Conjunctive capture-filter subset.
//!
//! Grammar: empty (pass everything), or clauses joined by `and`, each one
//! of `ip`, `arp`, `tcp`, `udp`, `icmp`, `port N`, `host A`. The filter
//! runs in userspace over the captured frame before the hash function is
//! consulted, so a handle never hashes traffic its expression excludes.

use crate::cap::LinkType;
use crate::error::{Failure, Status};

use std::net::IpAddr;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_ARP: u16 = 0x0806;
const ETHERTYPE_IPV6: u16 = 0x86DD;

const PROTO_ICMP: u8 = 1;
const PROTO_TCP: u8 = 6;
const PROTO_UDP: u8 = 17;
const PROTO_ICMPV6: u8 = 58;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Clause {
    Ip,
    Arp,
    Tcp,
    Udp,
    Icmp,
    Port(u16),
    Host(IpAddr),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub(crate) fn parse(expr: &str) -> Status<Filter> {
        let mut clauses = Vec::new();
        let tokens: Vec<&str> = expr.split_whitespace().collect();

        let mut i = 0;
        while i < tokens.len() {
            match tokens[i] {
                "and" if !clauses.is_empty() && i + 1 < tokens.len() => {}
                "ip" => clauses.push(Clause::Ip),
                "arp" => clauses.push(Clause::Arp),
                "tcp" => clauses.push(Clause::Tcp),
                "udp" => clauses.push(Clause::Udp),
                "icmp" => clauses.push(Clause::Icmp),
                "port" => {
                    i += 1;
                    let port = tokens
                        .get(i)
                        .and_then(|t| t.parse::<u16>().ok())
                        .ok_or_else(|| Failure::BadFilter(expr.to_string()))?;
                    clauses.push(Clause::Port(port));
                }
                "host" => {
                    i += 1;
                    let host = tokens
                        .get(i)
                        .and_then(|t| t.parse::<IpAddr>().ok())
                        .ok_or_else(|| Failure::BadFilter(expr.to_string()))?;
                    clauses.push(Clause::Host(host));
                }
                _ => return Err(Failure::BadFilter(expr.to_string())),
            }
            i += 1;
        }

        Ok(Filter { clauses })
    }

    pub(crate) fn matches(&self, frame: &[u8], link: LinkType) -> bool {
        if self.clauses.is_empty() {
            return true;
        }

        let view = match PacketView::parse(frame, link) {
            Some(view) => view,
            None => return false,
        };

        self.clauses.iter().all(|clause| view.satisfies(clause))
    }
}

/// Decoded header fields a clause can test.
struct PacketView {
    ethertype: u16,
    proto: Option<u8>,
    src: Option<IpAddr>,
    dst: Option<IpAddr>,
    sport: Option<u16>,
    dport: Option<u16>,
}

impl PacketView {
    fn parse(frame: &[u8], link: LinkType) -> Option<Self> {
        let (ethertype, net) = match link {
            LinkType::Ethernet => {
                let header = frame.get(..14)?;
                let ethertype = u16::from_be_bytes([header[12], header[13]]);
                (ethertype, frame.get(14..)?)
            }
            LinkType::Raw => {
                // Sniff the IP version nibble.
                let ethertype = match frame.first()? >> 4 {
                    4 => ETHERTYPE_IPV4,
                    6 => ETHERTYPE_IPV6,
                    _ => return None,
                };
                (ethertype, frame)
            }
        };

        let mut view = PacketView {
            ethertype,
            proto: None,
            src: None,
            dst: None,
            sport: None,
            dport: None,
        };

        match ethertype {
            ETHERTYPE_IPV4 => {
                let ihl = (net.first()? & 0x0f) as usize * 4;
                if ihl < 20 || net.len() < ihl {
                    return Some(view);
                }
                view.proto = Some(net[9]);
                view.src = Some(IpAddr::from([net[12], net[13], net[14], net[15]]));
                view.dst = Some(IpAddr::from([net[16], net[17], net[18], net[19]]));
                view.parse_ports(net.get(ihl..)?);
            }
            ETHERTYPE_IPV6 => {
                if net.len() < 40 {
                    return Some(view);
                }
                view.proto = Some(net[6]);
                let mut src = [0u8; 16];
                let mut dst = [0u8; 16];
                src.copy_from_slice(&net[8..24]);
                dst.copy_from_slice(&net[24..40]);
                view.src = Some(IpAddr::from(src));
                view.dst = Some(IpAddr::from(dst));
                view.parse_ports(&net[40..]);
            }
            _ => {}
        }

        Some(view)
    }

    fn parse_ports(&mut self, transport: &[u8]) {
        let ports = matches!(self.proto, Some(PROTO_TCP) | Some(PROTO_UDP));
        if ports && transport.len() >= 4 {
            self.sport = Some(u16::from_be_bytes([transport[0], transport[1]]));
            self.dport = Some(u16::from_be_bytes([transport[2], transport[3]]));
        }
    }

    fn satisfies(&self, clause: &Clause) -> bool {
        match clause {
            Clause::Ip => self.ethertype == ETHERTYPE_IPV4 || self.ethertype == ETHERTYPE_IPV6,
            Clause::Arp => self.ethertype == ETHERTYPE_ARP,
            Clause::Tcp => self.proto == Some(PROTO_TCP),
            Clause::Udp => self.proto == Some(PROTO_UDP),
            Clause::Icmp => {
                self.proto == Some(PROTO_ICMP) || self.proto == Some(PROTO_ICMPV6)
            }
            Clause::Port(port) => self.sport == Some(*port) || self.dport == Some(*port),
            Clause::Host(host) => self.src == Some(*host) || self.dst == Some(*host),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ethernet + IPv4 + TCP frame with the given addresses and ports.
    fn tcp_frame(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16) -> Vec<u8> {
        let mut frame = vec![0u8; 14];
        frame[12] = 0x08; // IPv4 ethertype
        frame[13] = 0x00;

        let mut ip = vec![0u8; 20];
        ip[0] = 0x45;
        ip[9] = PROTO_TCP;
        ip[12..16].copy_from_slice(&src);
        ip[16..20].copy_from_slice(&dst);
        frame.extend_from_slice(&ip);

        frame.extend_from_slice(&sport.to_be_bytes());
        frame.extend_from_slice(&dport.to_be_bytes());
        frame.extend_from_slice(&[0u8; 16]);
        frame
    }

    #[test]
    fn empty_filter_passes_everything() {
        let filter = Filter::parse("").unwrap();
        assert!(filter.matches(b"anything at all", LinkType::Ethernet));
    }

    #[test]
    fn conjunction_of_proto_port_and_host() {
        let filter = Filter::parse("tcp and port 80 and host 10.0.0.2").unwrap();
        let hit = tcp_frame([10, 0, 0, 1], [10, 0, 0, 2], 49152, 80);
        let wrong_port = tcp_frame([10, 0, 0, 1], [10, 0, 0, 2], 49152, 443);
        let wrong_host = tcp_frame([10, 0, 0, 1], [10, 0, 0, 3], 49152, 80);

        assert!(filter.matches(&hit, LinkType::Ethernet));
        assert!(!filter.matches(&wrong_port, LinkType::Ethernet));
        assert!(!filter.matches(&wrong_host, LinkType::Ethernet));
    }

    #[test]
    fn port_matches_either_direction() {
        let filter = Filter::parse("port 53").unwrap();
        let reply = tcp_frame([8, 8, 8, 8], [10, 0, 0, 2], 53, 40000);
        assert!(filter.matches(&reply, LinkType::Ethernet));
    }

    #[test]
    fn unknown_tokens_fail_to_parse() {
        assert!(matches!(
            Filter::parse("vlan 12"),
            Err(Failure::BadFilter(_))
        ));
        assert!(matches!(
            Filter::parse("port notanumber"),
            Err(Failure::BadFilter(_))
        ));
    }
}

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use byteorder::{BigEndian, ByteOrder, NativeEndian};

const AF_UNIX: u16 = libc::AF_UNIX as u16;
const AF_INET: u16 = libc::AF_INET as u16;
const AF_INET6: u16 = libc::AF_INET6 as u16;

/// Renders a raw `struct sockaddr` for audit output: `ip:port`, `[ip]:port`,
/// `unix:/path`, or `None` for families that are not decoded.
pub fn describe_sockaddr(data: &[u8]) -> Option<String> {
    if data.len() < 2 {
        return None;
    }
    let family = NativeEndian::read_u16(&data[0..2]);

    match family {
        AF_INET if data.len() >= 8 => {
            let port = BigEndian::read_u16(&data[2..4]);
            let ip = Ipv4Addr::new(data[4], data[5], data[6], data[7]);
            Some(SocketAddr::V4(SocketAddrV4::new(ip, port)).to_string())
        }
        AF_INET6 if data.len() >= 24 => {
            let port = BigEndian::read_u16(&data[2..4]);
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&data[8..24]);
            let ip = Ipv6Addr::from(octets);
            Some(SocketAddr::V6(SocketAddrV6::new(ip, port, 0, 0)).to_string())
        }
        AF_UNIX => {
            let raw = &data[2..];
            match raw.first() {
                None => Some("unix:(unnamed)".to_string()),
                Some(0) => {
                    let name = String::from_utf8_lossy(&raw[1..]);
                    Some(format!("unix:@{}", name.trim_end_matches('\0')))
                }
                Some(_) => {
                    let end = raw.iter().position(|byte| *byte == 0).unwrap_or(raw.len());
                    Some(format!("unix:{}", String::from_utf8_lossy(&raw[..end])))
                }
            }
        }
        _ => None,
    }
}

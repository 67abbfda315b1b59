//! Listening-port discovery
//!
//! `ss -tlnH` is tried first. When it is missing or fails, the kernel
//! tables under `/proc/net` are read directly. Only listeners reachable on
//! loopback count: explicit loopback binds and wildcard binds, since a
//! wildcard listener occupies the loopback port too.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use vc_core::traits::{PortScan, PortScanner};

/// TCP_LISTEN in `/proc/net/tcp*`
const TCP_LISTEN: &str = "0A";

/// Scans with `ss`, falling back to procfs
#[derive(Default)]
pub struct SsPortScanner;

#[async_trait]
impl PortScanner for SsPortScanner {
    async fn listening_ports(&self) -> PortScan {
        let ss_error = match run_ss().await {
            Ok(ports) => return PortScan::complete(ports),
            Err(e) => e,
        };
        tracing::debug!("ss unavailable ({}), reading /proc/net", ss_error);

        let mut ports = BTreeSet::new();
        let mut read_any = false;
        for (path, is_v6) in [("/proc/net/tcp", false), ("/proc/net/tcp6", true)] {
            match tokio::fs::read_to_string(path).await {
                Ok(content) => {
                    read_any = true;
                    ports.extend(parse_proc_net(&content, is_v6));
                }
                Err(e) => tracing::debug!("Cannot read {}: {}", path, e),
            }
        }

        if read_any {
            PortScan::complete(ports)
        } else {
            PortScan::unavailable(format!("ss failed ({}) and /proc/net is unreadable", ss_error))
        }
    }
}

async fn run_ss() -> Result<BTreeSet<u16>, String> {
    let output = tokio::process::Command::new("ss")
        .arg("-tlnH")
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| e.to_string())?;
    if !output.status.success() {
        return Err(format!("ss exited with {}", output.status));
    }
    Ok(parse_ss_listeners(&String::from_utf8_lossy(&output.stdout)))
}

/// Loopback-reachable ports from `ss -tlnH` output.
///
/// The local address is the fourth column, e.g. `127.0.0.1:8000`,
/// `[::1]:8000`, `*:22` or `0.0.0.0%lo:53`.
pub fn parse_ss_listeners(output: &str) -> BTreeSet<u16> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().nth(3))
        .filter_map(|local| {
            let (addr, port) = local.rsplit_once(':')?;
            let port = port.parse::<u16>().ok()?;
            let addr = addr.split('%').next().unwrap_or(addr);
            let addr = addr.trim_start_matches('[').trim_end_matches(']');
            reaches_loopback_str(addr).then_some(port)
        })
        .collect()
}

fn reaches_loopback_str(addr: &str) -> bool {
    addr == "*" || addr.parse::<IpAddr>().is_ok_and(reaches_loopback)
}

fn reaches_loopback(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_unspecified(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.is_loopback() || v4.is_unspecified(),
            None => v6.is_loopback() || v6.is_unspecified(),
        },
    }
}

/// Loopback-reachable listening ports from a `/proc/net/tcp{,6}` table
pub fn parse_proc_net(content: &str, is_v6: bool) -> BTreeSet<u16> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.get(3) != Some(&TCP_LISTEN) {
                return None;
            }
            let (addr_hex, port_hex) = fields.get(1)?.rsplit_once(':')?;
            let port = u16::from_str_radix(port_hex, 16).ok()?;
            let addr = if is_v6 {
                IpAddr::V6(parse_v6_hex(addr_hex)?)
            } else {
                IpAddr::V4(parse_v4_hex(addr_hex)?)
            };
            reaches_loopback(addr).then_some(port)
        })
        .collect()
}

/// The kernel prints the address as a native-endian `%08X`
fn parse_v4_hex(hex: &str) -> Option<Ipv4Addr> {
    if hex.len() != 8 {
        return None;
    }
    let word = u32::from_str_radix(hex, 16).ok()?;
    Some(Ipv4Addr::from(word.to_le_bytes()))
}

/// Four native-endian words, concatenated
fn parse_v6_hex(hex: &str) -> Option<Ipv6Addr> {
    if hex.len() != 32 {
        return None;
    }
    let mut octets = [0u8; 16];
    for (i, chunk) in octets.chunks_mut(4).enumerate() {
        let word = u32::from_str_radix(hex.get(i * 8..i * 8 + 8)?, 16).ok()?;
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    Some(Ipv6Addr::from(octets))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ss_filters_by_address() {
        let output = "\
LISTEN 0      4096       127.0.0.1:16100      0.0.0.0:*
LISTEN 0      4096         0.0.0.0:22         0.0.0.0:*
LISTEN 0      4096     192.168.1.5:5432       0.0.0.0:*
LISTEN 0      4096           [::1]:16101         [::]:*
LISTEN 0      4096               *:9090             *:*
LISTEN 0      4096   127.0.0.53%lo:53         0.0.0.0:*
LISTEN 0      4096 [fe80::1]%eth0:7000           [::]:*
";
        let ports = parse_ss_listeners(output);
        assert_eq!(
            ports.into_iter().collect::<Vec<_>>(),
            vec![22, 53, 9090, 16100, 16101]
        );
    }

    #[test]
    fn test_parse_ss_ignores_garbage() {
        assert!(parse_ss_listeners("").is_empty());
        assert!(parse_ss_listeners("LISTEN 0 4096\nnot a table\n").is_empty());
    }

    #[test]
    fn test_parse_proc_net_v4() {
        let content = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:3EE4 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 11111
   1: 00000000:0016 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 22222
   2: 0501A8C0:1538 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 33333
   3: 0100007F:3EE5 0100007F:9C40 01 00000000:00000000 00:00000000 00000000  1000        0 44444
";
        let ports = parse_proc_net(content, false);
        assert_eq!(ports.into_iter().collect::<Vec<_>>(), vec![22, 16100]);
    }

    #[test]
    fn test_parse_proc_net_v6() {
        let content = "\
  sl  local_address                         remote_address                        st
   0: 00000000000000000000000001000000:3EE5 00000000000000000000000000000000:0000 0A 00000000:00000000
   1: 000080FE00000000FF00000001000000:1B58 00000000000000000000000000000000:0000 0A 00000000:00000000
";
        let ports = parse_proc_net(content, true);
        assert_eq!(ports.into_iter().collect::<Vec<_>>(), vec![16101]);
    }

    #[test]
    fn test_mapped_v4_loopback_counts() {
        let mapped: Ipv6Addr = "::ffff:127.0.0.1".parse().unwrap();
        assert!(reaches_loopback(IpAddr::V6(mapped)));
        let remote: Ipv6Addr = "::ffff:10.0.0.1".parse().unwrap();
        assert!(!reaches_loopback(IpAddr::V6(remote)));
    }
}

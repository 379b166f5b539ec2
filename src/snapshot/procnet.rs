//! Socket tables from `/proc/net`
//!
//! Each line of `/proc/net/{tcp,tcp6,udp,udp6}` describes one socket with
//! hex-encoded addresses and the socket inode. Owners are found by matching
//! inodes against the `socket:[N]` links under `/proc/<pid>/fd`.

use std::collections::HashMap;
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::target::{ConnectionRef, Endpoint};

/// One parsed socket table row
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SocketEntry {
    pub local: Endpoint,
    pub remote: Option<Endpoint>,
    pub status: String,
    pub inode: u64,
}

const TABLES: &[(&str, bool)] = &[
    ("tcp", false),
    ("tcp6", false),
    ("udp", true),
    ("udp6", true),
];

/// All inet sockets of the host, with owners where they can be read
pub(crate) fn connections(root: &Path) -> Result<Vec<ConnectionRef>> {
    let mut entries = Vec::new();
    for (table, udp) in TABLES {
        let path = root.join("net").join(table);
        match fs::read_to_string(&path) {
            Ok(content) => entries.extend(parse_table(&content, *udp)),
            // a kernel without ipv6 has no tcp6/udp6
            Err(e) => debug!(path = %path.display(), error = %e, "socket table unavailable"),
        }
    }

    let owners = socket_owners(root);
    Ok(entries
        .into_iter()
        .map(|entry| {
            let pid = owners.get(&entry.inode).copied();
            ConnectionRef::new(pid, Some(entry.local), entry.remote).with_status(entry.status)
        })
        .collect())
}

/// Parse one socket table. Rows without a local port are skipped.
pub(crate) fn parse_table(content: &str, udp: bool) -> Vec<SocketEntry> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| parse_row(line, udp))
        .collect()
}

fn parse_row(line: &str, udp: bool) -> Option<SocketEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 10 {
        return None;
    }

    let local = parse_endpoint(fields[1])?;
    if local.port == 0 {
        return None;
    }
    let remote = parse_endpoint(fields[2]).filter(|e| e.port != 0);
    let status = if udp {
        "NONE".to_string()
    } else {
        tcp_state(fields[3]).to_string()
    };
    let inode = fields[9].parse().ok()?;

    Some(SocketEntry {
        local,
        remote,
        status,
        inode,
    })
}

/// `0100007F:1F90` -> 127.0.0.1:8080. Address words are in host byte order.
fn parse_endpoint(raw: &str) -> Option<Endpoint> {
    let (addr, port) = raw.split_once(':')?;
    let port = u16::from_str_radix(port, 16).ok()?;

    let ip = match addr.len() {
        8 => Ipv4Addr::from(u32::from_str_radix(addr, 16).ok()?.to_ne_bytes()).to_string(),
        32 => {
            let mut bytes = [0u8; 16];
            for (i, chunk) in bytes.chunks_mut(4).enumerate() {
                let word = u32::from_str_radix(addr.get(i * 8..i * 8 + 8)?, 16).ok()?;
                chunk.copy_from_slice(&word.to_ne_bytes());
            }
            Ipv6Addr::from(bytes).to_string()
        }
        _ => return None,
    };
    Some(Endpoint::new(ip, port))
}

fn tcp_state(hex: &str) -> &'static str {
    match u8::from_str_radix(hex, 16) {
        Ok(0x01) => "ESTABLISHED",
        Ok(0x02) => "SYN_SENT",
        Ok(0x03) => "SYN_RECV",
        Ok(0x04) => "FIN_WAIT1",
        Ok(0x05) => "FIN_WAIT2",
        Ok(0x06) => "TIME_WAIT",
        Ok(0x07) => "CLOSE",
        Ok(0x08) => "CLOSE_WAIT",
        Ok(0x09) => "LAST_ACK",
        Ok(0x0A) => "LISTEN",
        Ok(0x0B) => "CLOSING",
        _ => "UNKNOWN",
    }
}

/// Map socket inodes to the pid holding them. Processes whose fds cannot
/// be read (other users, already exited) are skipped.
fn socket_owners(root: &Path) -> HashMap<u64, u32> {
    let mut owners = HashMap::new();
    let Ok(procs) = fs::read_dir(root) else {
        return owners;
    };

    for entry in procs.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };
        let Ok(fds) = fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        for fd in fds.flatten() {
            if let Some(inode) = fs::read_link(fd.path())
                .ok()
                .and_then(|link| socket_inode(&link.to_string_lossy()))
            {
                owners.entry(inode).or_insert(pid);
            }
        }
    }
    owners
}

/// `socket:[12345]` -> 12345
fn socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?.strip_suffix(']')?.parse().ok()
}

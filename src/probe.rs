//! The platform probe: every kernel fact the server reports goes through
//! this trait, so handlers and samplers never touch the substrate
//! directly and tests can substitute canned snapshots.
//!
//! The production implementation leans on `sysinfo` for CPU, memory,
//! load, disks, processes and interface counters, and reads
//! `/proc/net/route` and `/etc/resolv.conf` for the networking tables.
//! Substrates without a CPU interface report zeroed usage rather than
//! failing the whole snapshot.

use parking_lot::Mutex;
use serde::Serialize;
use std::net::Ipv4Addr;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0} is not available on this platform")]
    Unavailable(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ProbeResult<T> = Result<T, ProbeError>;

// SNAPSHOT TYPES

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CpuSnapshot {
    pub used_pct: f32,
    pub cores: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MemorySnapshot {
    pub total_mb: u64,
    pub used_mb: u64,
    pub swap_total_mb: u64,
    pub swap_used_mb: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LoadSnapshot {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OsSnapshot {
    pub sysname: String,
    pub release: String,
    pub version: String,
    pub machine: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskSnapshot {
    pub filesystem: String,
    pub mount_point: String,
    pub total_mb: u64,
    pub available_mb: u64,
    pub used_pct: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: String,
    pub cpu_pct: f32,
    pub memory_mb: u64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteEntry {
    pub destination: String,
    pub gateway: String,
    pub flags: String,
    pub iface: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DnsConfig {
    pub nameservers: Vec<String>,
    pub search: Vec<String>,
    pub domain: Option<String>,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterfaceCounters {
    pub name: String,
    pub mac: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
}

/// Read-only access to kernel state. Every method is a fresh snapshot;
/// nothing here mutates server state.
pub trait PlatformProbe: Send + Sync {
    fn cpu(&self) -> ProbeResult<CpuSnapshot>;
    fn memory(&self) -> ProbeResult<MemorySnapshot>;
    fn load_average(&self) -> ProbeResult<LoadSnapshot>;
    fn os(&self) -> ProbeResult<OsSnapshot>;
    fn hostname(&self) -> String;
    fn uptime_seconds(&self) -> u64;
    fn disks(&self) -> ProbeResult<Vec<DiskSnapshot>>;
    fn processes(&self) -> ProbeResult<Vec<ProcessSnapshot>>;
    fn routes(&self) -> ProbeResult<Vec<RouteEntry>>;
    fn dns(&self) -> ProbeResult<DnsConfig>;
    fn interfaces(&self) -> ProbeResult<Vec<InterfaceCounters>>;
}

// PRODUCTION PROBE

pub struct SystemProbe {
    system: Mutex<sysinfo::System>,
    networks: Mutex<sysinfo::Networks>,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(sysinfo::System::new()),
            networks: Mutex::new(sysinfo::Networks::new_with_refreshed_list()),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

const MIB: u64 = 1024 * 1024;

impl PlatformProbe for SystemProbe {
    fn cpu(&self) -> ProbeResult<CpuSnapshot> {
        let mut sys = self.system.lock();
        sys.refresh_cpu_usage();
        Ok(CpuSnapshot {
            used_pct: sys.global_cpu_info().cpu_usage(),
            cores: sys.cpus().len(),
        })
    }

    fn memory(&self) -> ProbeResult<MemorySnapshot> {
        let mut sys = self.system.lock();
        sys.refresh_memory();
        Ok(MemorySnapshot {
            total_mb: sys.total_memory() / MIB,
            used_mb: sys.used_memory() / MIB,
            swap_total_mb: sys.total_swap() / MIB,
            swap_used_mb: sys.used_swap() / MIB,
        })
    }

    fn load_average(&self) -> ProbeResult<LoadSnapshot> {
        let load = sysinfo::System::load_average();
        Ok(LoadSnapshot {
            one: load.one,
            five: load.five,
            fifteen: load.fifteen,
        })
    }

    fn os(&self) -> ProbeResult<OsSnapshot> {
        Ok(OsSnapshot {
            sysname: sysinfo::System::name().unwrap_or_default(),
            release: sysinfo::System::kernel_version().unwrap_or_default(),
            version: sysinfo::System::os_version().unwrap_or_default(),
            machine: sysinfo::System::cpu_arch().unwrap_or_default(),
        })
    }

    fn hostname(&self) -> String {
        sysinfo::System::host_name().unwrap_or_default()
    }

    fn uptime_seconds(&self) -> u64 {
        sysinfo::System::uptime()
    }

    fn disks(&self) -> ProbeResult<Vec<DiskSnapshot>> {
        let disks = sysinfo::Disks::new_with_refreshed_list();
        Ok(disks
            .iter()
            .map(|disk| {
                let total = disk.total_space();
                let available = disk.available_space();
                let used_pct = if total > 0 {
                    ((total - available) as f64 / total as f64 * 100.0) as f32
                } else {
                    0.0
                };
                DiskSnapshot {
                    filesystem: disk.file_system().to_string_lossy().into_owned(),
                    mount_point: disk.mount_point().to_string_lossy().into_owned(),
                    total_mb: total / MIB,
                    available_mb: available / MIB,
                    used_pct,
                }
            })
            .collect())
    }

    fn processes(&self) -> ProbeResult<Vec<ProcessSnapshot>> {
        let mut sys = self.system.lock();
        sys.refresh_processes();
        Ok(sys
            .processes()
            .values()
            .map(|proc| ProcessSnapshot {
                pid: proc.pid().as_u32(),
                name: proc.name().to_string(),
                cpu_pct: proc.cpu_usage(),
                memory_mb: proc.memory() / MIB,
                status: proc.status().to_string(),
            })
            .collect())
    }

    fn routes(&self) -> ProbeResult<Vec<RouteEntry>> {
        match std::fs::read_to_string("/proc/net/route") {
            Ok(text) => Ok(parse_proc_routes(&text)),
            Err(e) => {
                warn!(error = %e, "routing table unavailable");
                Ok(Vec::new())
            }
        }
    }

    fn dns(&self) -> ProbeResult<DnsConfig> {
        match std::fs::read_to_string("/etc/resolv.conf") {
            Ok(text) => Ok(parse_resolv_conf(&text)),
            Err(e) => {
                warn!(error = %e, "resolver configuration unavailable");
                Ok(DnsConfig::default())
            }
        }
    }

    fn interfaces(&self) -> ProbeResult<Vec<InterfaceCounters>> {
        let mut networks = self.networks.lock();
        networks.refresh_list();
        Ok(networks
            .iter()
            .map(|(name, data)| InterfaceCounters {
                name: name.clone(),
                mac: data.mac_address().to_string(),
                rx_bytes: data.total_received(),
                tx_bytes: data.total_transmitted(),
                rx_packets: data.total_packets_received(),
                tx_packets: data.total_packets_transmitted(),
            })
            .collect())
    }
}

// KERNEL TABLE PARSERS

/// `/proc/net/route`: one header line, then whitespace-separated columns
/// with little-endian hex addresses.
fn parse_proc_routes(text: &str) -> Vec<RouteEntry> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            Some(RouteEntry {
                destination: hex_ipv4(fields[1])?,
                gateway: hex_ipv4(fields[2])?,
                flags: route_flags(u16::from_str_radix(fields[3], 16).ok()?),
                iface: fields[0].to_string(),
            })
        })
        .collect()
}

fn hex_ipv4(hex: &str) -> Option<String> {
    let raw = u32::from_str_radix(hex, 16).ok()?;
    Some(Ipv4Addr::from(raw.swap_bytes()).to_string())
}

fn route_flags(bits: u16) -> String {
    let mut flags = String::new();
    if bits & 0x1 != 0 {
        flags.push('U');
    }
    if bits & 0x2 != 0 {
        flags.push('G');
    }
    if bits & 0x4 != 0 {
        flags.push('H');
    }
    flags
}

fn parse_resolv_conf(text: &str) -> DnsConfig {
    let mut dns = DnsConfig::default();
    for raw_line in text.lines() {
        let line = match raw_line.find(['#', ';']) {
            Some(pos) => &raw_line[..pos],
            None => raw_line,
        }
        .trim();

        let Some((key, value)) = line.split_once(char::is_whitespace) else {
            continue;
        };
        let value = value.trim();

        match key {
            "nameserver" => dns.nameservers.push(value.to_string()),
            "search" => dns
                .search
                .extend(value.split_whitespace().map(str::to_string)),
            "domain" => dns.domain = Some(value.to_string()),
            "options" => dns
                .options
                .extend(value.split_whitespace().map(str::to_string)),
            _ => {}
        }
    }
    dns
}

// TEST FIXTURE


#[cfg(test)]
mod route_parser_tests {
    use super::*;

    const SAMPLE: &str = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
eth0\t00000000\t0101A8C0\t0003\t0\t0\t100\t00000000\t0\t0\t0
eth0\t0001A8C0\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0
";

    #[test]
    fn parses_default_and_link_routes() {
        let routes = parse_proc_routes(SAMPLE);
        assert_eq!(
            routes,
            vec![
                RouteEntry {
                    destination: "0.0.0.0".into(),
                    gateway: "192.168.1.1".into(),
                    flags: "UG".into(),
                    iface: "eth0".into(),
                },
                RouteEntry {
                    destination: "192.168.1.0".into(),
                    gateway: "0.0.0.0".into(),
                    flags: "U".into(),
                    iface: "eth0".into(),
                },
            ]
        );
    }

    #[test]
    fn short_and_garbage_lines_are_skipped() {
        assert!(parse_proc_routes("header\nnot enough\n").is_empty());
        assert!(parse_proc_routes("header\neth0\tZZZZ\t00000000\t0001\n").is_empty());
        assert!(parse_proc_routes("").is_empty());
    }

    #[test]
    fn host_route_flag() {
        let text = "h\neth1\t0101A8C0\t00000000\t0005\t0\t0\t0\t00000000\n";
        let routes = parse_proc_routes(text);
        assert_eq!(routes[0].flags, "UH");
    }
}

#[cfg(test)]
mod resolv_parser_tests {
    use super::*;

    #[test]
    fn full_configuration() {
        let dns = parse_resolv_conf(
            "# generated by dhclient\n\
             nameserver 192.168.1.1\n\
             nameserver 9.9.9.9 ; backup\n\
             search example.org lan.example.org\n\
             domain example.org\n\
             options timeout:2 attempts:3\n",
        );

        assert_eq!(dns.nameservers, vec!["192.168.1.1", "9.9.9.9"]);
        assert_eq!(dns.search, vec!["example.org", "lan.example.org"]);
        assert_eq!(dns.domain.as_deref(), Some("example.org"));
        assert_eq!(dns.options, vec!["timeout:2", "attempts:3"]);
    }

    #[test]
    fn empty_and_comment_only() {
        assert_eq!(parse_resolv_conf(""), DnsConfig::default());
        assert_eq!(parse_resolv_conf("# nothing\n; here\n"), DnsConfig::default());
    }
}

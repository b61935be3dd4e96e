//! Background samplers: one task per domain (metrics, networking) pushing
//! a composite sample into a bounded ring every second. Readers copy out
//! the most recent entries under a single mutex acquisition and never
//! block the writer longer than that.

use crate::probe::{DnsConfig, InterfaceCounters, PlatformProbe, RouteEntry};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::warn;

/// Samples served by the history endpoints.
pub(crate) const HISTORY_LEN: usize = 120;
/// Byte budget a ring may grow to.
const RING_BUDGET: usize = 1024 * 1024;
/// Upper bound on ring capacity regardless of sample size.
const RING_MAX_CAPACITY: usize = 4096;
/// Sampling cadence.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Nominal per-sample footprint of a networking sample (route and
/// interface rows are heap-allocated, so `size_of` understates it).
const NET_SAMPLE_NOMINAL_BYTES: usize = 4096;

pub(crate) const MAX_ROUTES_PER_SAMPLE: usize = 50;
pub(crate) const MAX_IFACES_PER_SAMPLE: usize = 10;

// RING

/// Fixed-capacity ring. `push` overwrites the oldest entry once full;
/// the count saturates at capacity.
#[derive(Debug)]
pub(crate) struct Ring<T> {
    buf: Vec<T>,
    head: usize,
    cap: usize,
}

impl<T: Clone> Ring<T> {
    pub(crate) fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::new(),
            head: 0,
            cap: cap.max(1),
        }
    }

    pub(crate) fn push(&mut self, value: T) {
        if self.buf.len() < self.cap {
            self.buf.push(value);
        } else {
            self.buf[self.head] = value;
            self.head = (self.head + 1) % self.cap;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    /// The most recent `min(n, len)` entries in chronological order.
    pub(crate) fn last(&self, n: usize) -> Vec<T> {
        let len = self.buf.len();
        let take = n.min(len);
        (0..take)
            .map(|i| self.buf[(self.head + len - take + i) % len].clone())
            .collect()
    }

    pub(crate) fn latest(&self) -> Option<T> {
        self.last(1).pop()
    }
}

fn ring_capacity(sample_bytes: usize) -> usize {
    (RING_BUDGET / sample_bytes.max(1)).clamp(HISTORY_LEN, RING_MAX_CAPACITY)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// METRICS

#[derive(Debug, Clone, Copy, Serialize)]
pub(crate) struct MetricSample {
    pub timestamp: u64,
    pub cpu_used_pct: f32,
    pub mem_used_mb: u64,
    pub mem_total_mb: u64,
    pub swap_used_mb: u64,
    pub net_rx: u64,
    pub net_tx: u64,
}

pub(crate) struct MetricSampler {
    ring: Mutex<Ring<MetricSample>>,
}

impl MetricSampler {
    pub(crate) fn new() -> Self {
        Self {
            ring: Mutex::new(Ring::with_capacity(ring_capacity(
                std::mem::size_of::<MetricSample>(),
            ))),
        }
    }

    pub(crate) fn push(&self, sample: MetricSample) {
        self.ring.lock().push(sample);
    }

    pub(crate) fn last(&self, n: usize) -> Vec<MetricSample> {
        self.ring.lock().last(n)
    }

    /// Starts the 1 Hz collection task; it runs for the process lifetime.
    pub(crate) fn spawn(self: &Arc<Self>, probe: Arc<dyn PlatformProbe>) {
        let sampler = self.clone();
        tokio::spawn(async move {
            loop {
                match collect_metric(probe.as_ref()) {
                    Some(sample) => sampler.push(sample),
                    // Collection failed; the previous sample stays current.
                    None => warn!("metric collection failed, sample skipped"),
                }
                tokio::time::sleep(SAMPLE_INTERVAL).await;
            }
        });
    }
}

pub(crate) fn collect_metric(probe: &dyn PlatformProbe) -> Option<MetricSample> {
    let cpu = probe.cpu().ok()?;
    let memory = probe.memory().ok()?;
    let (net_rx, net_tx) = probe
        .interfaces()
        .ok()?
        .iter()
        .fold((0, 0), |(rx, tx), iface| {
            (rx + iface.rx_bytes, tx + iface.tx_bytes)
        });

    Some(MetricSample {
        timestamp: unix_now(),
        cpu_used_pct: cpu.used_pct,
        mem_used_mb: memory.used_mb,
        mem_total_mb: memory.total_mb,
        swap_used_mb: memory.swap_used_mb,
        net_rx,
        net_tx,
    })
}

// NETWORKING

#[derive(Debug, Clone, Serialize)]
pub(crate) struct NetworkingSample {
    pub timestamp: u64,
    pub routes: Vec<RouteEntry>,
    pub dns: DnsConfig,
    pub interfaces: Vec<InterfaceCounters>,
}

pub(crate) struct NetworkSampler {
    ring: Mutex<Ring<NetworkingSample>>,
}

impl NetworkSampler {
    pub(crate) fn new() -> Self {
        Self {
            ring: Mutex::new(Ring::with_capacity(ring_capacity(NET_SAMPLE_NOMINAL_BYTES))),
        }
    }

    pub(crate) fn push(&self, sample: NetworkingSample) {
        self.ring.lock().push(sample);
    }

    pub(crate) fn last(&self, n: usize) -> Vec<NetworkingSample> {
        self.ring.lock().last(n)
    }

    pub(crate) fn latest(&self) -> Option<NetworkingSample> {
        self.ring.lock().latest()
    }

    pub(crate) fn spawn(self: &Arc<Self>, probe: Arc<dyn PlatformProbe>) {
        let sampler = self.clone();
        tokio::spawn(async move {
            loop {
                match collect_networking(probe.as_ref()) {
                    Some(sample) => sampler.push(sample),
                    None => warn!("networking collection failed, sample skipped"),
                }
                tokio::time::sleep(SAMPLE_INTERVAL).await;
            }
        });
    }
}

pub(crate) fn collect_networking(probe: &dyn PlatformProbe) -> Option<NetworkingSample> {
    let mut routes = probe.routes().ok()?;
    routes.truncate(MAX_ROUTES_PER_SAMPLE);
    let dns = probe.dns().ok()?;
    let mut interfaces = probe.interfaces().ok()?;
    interfaces.truncate(MAX_IFACES_PER_SAMPLE);

    Some(NetworkingSample {
        timestamp: unix_now(),
        routes,
        dns,
        interfaces,
    })
}

#[cfg(test)]
mod ring_tests {
    use super::*;

    #[test]
    fn last_returns_min_of_n_len_capacity() {
        let mut ring = Ring::with_capacity(8);
        for i in 0..5u64 {
            ring.push(i);
        }

        assert_eq!(ring.len(), 5);
        assert_eq!(ring.last(3), vec![2, 3, 4]);
        assert_eq!(ring.last(5), vec![0, 1, 2, 3, 4]);
        assert_eq!(ring.last(100), vec![0, 1, 2, 3, 4]);
        assert_eq!(ring.last(0), Vec::<u64>::new());
    }

    #[test]
    fn count_saturates_at_capacity() {
        let mut ring = Ring::with_capacity(4);
        for i in 0..10u64 {
            ring.push(i);
        }

        assert_eq!(ring.len(), 4);
        assert_eq!(ring.last(10), vec![6, 7, 8, 9]);
        assert_eq!(ring.latest(), Some(9));
    }

    #[test]
    fn chronological_order_across_wraparound() {
        let mut ring = Ring::with_capacity(3);
        for i in 0..7u64 {
            ring.push(i);
            let out = ring.last(3);
            for pair in out.windows(2) {
                assert!(pair[0] < pair[1], "out of order: {out:?}");
            }
        }
    }

    #[test]
    fn empty_ring() {
        let ring: Ring<u64> = Ring::with_capacity(4);
        assert_eq!(ring.len(), 0);
        assert!(ring.last(5).is_empty());
    }
}

//! The `/api/metrics` document: one JSON snapshot of the whole host plus
//! the sampler history.

use crate::{
    errors::ServeError,
    http::{request::Request, response::Response, types::APPLICATION_JSON},
    probe::ProcessSnapshot,
    router::RouteHandler,
    sampler::HISTORY_LEN,
    AppState,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::SystemTime;

/// Rows in the per-process top lists.
const TOP_N: usize = 10;

pub(crate) struct MetricsHandler;

#[async_trait]
impl RouteHandler for MetricsHandler {
    async fn call(
        &self,
        state: &AppState,
        _request: &Request<'_>,
        response: &mut Response,
    ) -> Result<(), ServeError> {
        let doc = build_document(state)?;
        response
            .status(200)
            .content_type(APPLICATION_JSON)
            .header("access-control-allow-origin", "*")
            .header("cache-control", "no-cache, no-store, must-revalidate")
            .body(doc.to_string());
        Ok(())
    }
}

fn build_document(state: &AppState) -> Result<Value, ServeError> {
    let probe = state.probe.as_ref();
    let snapshot_failed = |_| ServeError::Internal("snapshot assembly failed");

    let cpu = probe.cpu().map_err(snapshot_failed)?;
    let memory = probe.memory().map_err(snapshot_failed)?;
    let load = probe.load_average().map_err(snapshot_failed)?;
    let os = probe.os().map_err(snapshot_failed)?;
    let disks = probe.disks().map_err(snapshot_failed)?;
    // One process snapshot feeds both top lists and the aggregate stats.
    let processes = probe.processes().map_err(snapshot_failed)?;

    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Ok(json!({
        "timestamp": timestamp,
        "hostname": probe.hostname(),
        "cpu": cpu,
        "memory": { "total_mb": memory.total_mb, "used_mb": memory.used_mb },
        "swap": { "total_mb": memory.swap_total_mb, "used_mb": memory.swap_used_mb },
        "load": load,
        "os": os,
        "uptime": probe.uptime_seconds(),
        "disks": disks,
        "ports": [],
        "top_cpu_processes": top_by_cpu(&processes),
        "top_memory_processes": top_by_memory(&processes),
        "process_stats": process_stats(&processes),
        "history": state.metrics.last(HISTORY_LEN),
    }))
}

fn top_by_cpu(processes: &[ProcessSnapshot]) -> Vec<&ProcessSnapshot> {
    let mut sorted: Vec<&ProcessSnapshot> = processes.iter().collect();
    sorted.sort_by(|a, b| b.cpu_pct.total_cmp(&a.cpu_pct));
    sorted.truncate(TOP_N);
    sorted
}

fn top_by_memory(processes: &[ProcessSnapshot]) -> Vec<&ProcessSnapshot> {
    let mut sorted: Vec<&ProcessSnapshot> = processes.iter().collect();
    sorted.sort_by(|a, b| b.memory_mb.cmp(&a.memory_mb));
    sorted.truncate(TOP_N);
    sorted
}

fn process_stats(processes: &[ProcessSnapshot]) -> Value {
    let mut running = 0u64;
    let mut sleeping = 0u64;
    let mut idle = 0u64;
    let mut other = 0u64;
    for proc in processes {
        match proc.status.as_str() {
            s if s.starts_with("Run") => running += 1,
            s if s.starts_with("Sleep") => sleeping += 1,
            s if s.starts_with("Idle") => idle += 1,
            _ => other += 1,
        }
    }

    json!({
        "total": processes.len(),
        "running": running,
        "sleeping": sleeping,
        "idle": idle,
        "other": other,
    })
}

#[cfg(test)]
mod metrics_tests {
    use super::*;
    use crate::http::request::testutil::parse;
    use crate::sampler::MetricSample;
    use crate::testutil::state_with_templates;

    #[tokio::test]
    async fn document_has_the_full_key_set() {
        let (state, _dirs) = state_with_templates(&[("base.html", "x")]);

        let request = parse(b"GET /api/metrics HTTP/1.1\r\n\r\n").unwrap();
        let mut response = Response::new();
        MetricsHandler
            .call(&state, &request, &mut response)
            .await
            .unwrap();

        assert_eq!(response.status_code(), 200);
        let doc: Value = serde_json::from_slice(response.body_bytes()).unwrap();
        for key in [
            "timestamp",
            "hostname",
            "cpu",
            "memory",
            "swap",
            "load",
            "os",
            "uptime",
            "disks",
            "ports",
            "top_cpu_processes",
            "top_memory_processes",
            "process_stats",
            "history",
        ] {
            assert!(doc.get(key).is_some(), "missing {key}");
        }

        assert_eq!(doc["hostname"], "testhost");
        assert_eq!(doc["memory"]["total_mb"], 2048);
        assert_eq!(doc["swap"]["used_mb"], 64);
        assert_eq!(doc["uptime"], 4242);
    }

    #[tokio::test]
    async fn history_reflects_pushed_samples() {
        let (state, _dirs) = state_with_templates(&[("base.html", "x")]);
        for i in 0..3 {
            state.metrics.push(MetricSample {
                timestamp: 1000 + i,
                cpu_used_pct: 1.0,
                mem_used_mb: 1,
                mem_total_mb: 2,
                swap_used_mb: 0,
                net_rx: 0,
                net_tx: 0,
            });
        }

        let doc = build_document(&state).unwrap();
        let history = doc["history"].as_array().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0]["timestamp"], 1000);
        assert_eq!(history[2]["timestamp"], 1002);
    }

    #[test]
    fn top_lists_are_sorted_and_capped() {
        let processes: Vec<ProcessSnapshot> = (0..25)
            .map(|i| ProcessSnapshot {
                pid: i,
                name: format!("p{i}"),
                cpu_pct: i as f32,
                memory_mb: (100 - i) as u64,
                status: "Run".into(),
            })
            .collect();

        let by_cpu = top_by_cpu(&processes);
        assert_eq!(by_cpu.len(), TOP_N);
        assert_eq!(by_cpu[0].cpu_pct, 24.0);
        assert!(by_cpu.windows(2).all(|w| w[0].cpu_pct >= w[1].cpu_pct));

        let by_mem = top_by_memory(&processes);
        assert_eq!(by_mem.len(), TOP_N);
        assert_eq!(by_mem[0].memory_mb, 100);
        assert!(by_mem.windows(2).all(|w| w[0].memory_mb >= w[1].memory_mb));
    }

    #[test]
    fn aggregate_stats_bucket_by_status() {
        let mk = |status: &str| ProcessSnapshot {
            pid: 1,
            name: "p".into(),
            cpu_pct: 0.0,
            memory_mb: 0,
            status: status.into(),
        };
        let processes = vec![
            mk("Run"),
            mk("Runnable"),
            mk("Sleep"),
            mk("Sleeping"),
            mk("Idle"),
            mk("Zombie"),
        ];

        let stats = process_stats(&processes);
        assert_eq!(stats["total"], 6);
        assert_eq!(stats["running"], 2);
        assert_eq!(stats["sleeping"], 2);
        assert_eq!(stats["idle"], 1);
        assert_eq!(stats["other"], 1);
    }
}

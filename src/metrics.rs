//! Command/error counters plus the textual render backing INFO and
//! METRICS (§4.13). The exact output format is a thin collaborator per
//! spec — what matters is that the counters themselves are accurate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::time::Instant;

use crate::util::unix_secs;
use crate::zmalloc::MemCounter;

#[derive(Default)]
pub struct Metrics {
    pub commands_processed: AtomicU64,
    pub connections_received: AtomicU64,
    pub expired_keys: AtomicU64,
    pub keyspace_hits: AtomicU64,
    pub keyspace_misses: AtomicU64,
    pub errors: AtomicU64,
    per_command: std::sync::Mutex<HashMap<&'static str, u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_command(&self, name: &'static str) {
        self.commands_processed.fetch_add(1, Relaxed);
        let mut counts = self.per_command.lock().expect("metrics mutex poisoned");
        *counts.entry(name).or_insert(0) += 1;
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Relaxed);
    }

    pub fn record_hit(&self) {
        self.keyspace_hits.fetch_add(1, Relaxed);
    }

    pub fn record_miss(&self) {
        self.keyspace_misses.fetch_add(1, Relaxed);
    }

    pub fn record_expired(&self, n: u64) {
        if n > 0 {
            self.expired_keys.fetch_add(n, Relaxed);
        }
    }

    pub fn record_connection(&self) {
        self.connections_received.fetch_add(1, Relaxed);
    }

    /// Human-readable `INFO` sections.
    pub fn render_info(&self, section: Option<&str>, start_time: Instant, port: u16, dbsize: usize, role: &str, replicas: usize) -> String {
        let mut out = String::new();
        let want = |s: &str| section.map(|sec| sec.eq_ignore_ascii_case(s)).unwrap_or(true);

        if want("server") {
            out.push_str("# Server\r\n");
            out.push_str("redis_version:7.0.0-emberdb\r\n");
            out.push_str(&format!("tcp_port:{port}\r\n"));
            out.push_str(&format!("uptime_in_seconds:{}\r\n", start_time.elapsed().as_secs()));
            out.push_str(&format!("run_id:emberdb-{}\r\n\r\n", unix_secs()));
        }
        if want("clients") {
            out.push_str("# Clients\r\n\r\n");
        }
        if want("memory") {
            out.push_str("# Memory\r\n");
            out.push_str(&format!("used_memory:{}\r\n\r\n", MemCounter::used_memory()));
        }
        if want("stats") {
            out.push_str("# Stats\r\n");
            out.push_str(&format!("total_commands_processed:{}\r\n", self.commands_processed.load(Relaxed)));
            out.push_str(&format!("total_connections_received:{}\r\n", self.connections_received.load(Relaxed)));
            out.push_str(&format!("expired_keys:{}\r\n", self.expired_keys.load(Relaxed)));
            out.push_str(&format!("keyspace_hits:{}\r\n", self.keyspace_hits.load(Relaxed)));
            out.push_str(&format!("keyspace_misses:{}\r\n\r\n", self.keyspace_misses.load(Relaxed)));
        }
        if want("replication") {
            out.push_str("# Replication\r\n");
            out.push_str(&format!("role:{role}\r\n"));
            out.push_str(&format!("connected_slaves:{replicas}\r\n\r\n"));
        }
        if want("keyspace") {
            out.push_str("# Keyspace\r\n");
            if dbsize > 0 {
                out.push_str(&format!("db0:keys={dbsize},expires=0,avg_ttl=0\r\n"));
            }
            out.push_str("\r\n");
        }
        out
    }

    /// `METRICS info` (same shape as a slice of INFO) or `METRICS
    /// prometheus` (one `name value` pair per line — not exposition
    /// format, §6 Out of scope).
    pub fn render_metrics(&self, prometheus: bool) -> String {
        let counts = self.per_command.lock().expect("metrics mutex poisoned");
        if prometheus {
            let mut out = String::new();
            out.push_str(&format!("emberdb_commands_total {}\n", self.commands_processed.load(Relaxed)));
            out.push_str(&format!("emberdb_errors_total {}\n", self.errors.load(Relaxed)));
            out.push_str(&format!("emberdb_expired_keys_total {}\n", self.expired_keys.load(Relaxed)));
            for (name, count) in counts.iter() {
                out.push_str(&format!("emberdb_command_total{{name=\"{}\"}} {}\n", name.to_ascii_lowercase(), count));
            }
            out
        } else {
            let mut out = format!(
                "commands_processed:{}\r\nerrors:{}\r\nexpired_keys:{}\r\n",
                self.commands_processed.load(Relaxed),
                self.errors.load(Relaxed),
                self.expired_keys.load(Relaxed),
            );
            for (name, count) in counts.iter() {
                out.push_str(&format!("cmd_{}:{}\r\n", name.to_ascii_lowercase(), count));
            }
            out
        }
    }
}

//! Worker identity and host information
//!
//! Captured once when an engine starts and served unchanged afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::version::BuildInfo;

// ─────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────

/// What makes a worker distinguishable from its peers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub worker_id: String,
    pub hostname: String,
}

/// Generate a fresh worker id
pub fn generate_worker_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("w-{}", &id[..12])
}

// ─────────────────────────────────────────────────────────────────
// Info Block
// ─────────────────────────────────────────────────────────────────

/// Host and runtime details of a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub worker_id: String,

    pub hostname: String,

    /// Operating system family (e.g. "linux")
    pub os: String,

    /// Distribution or release name
    pub os_release: String,

    /// CPU architecture
    pub arch: String,

    /// Number of logical CPUs
    pub cpu_count: usize,

    /// Runtime name; always "nsworker"
    pub runtime: String,

    pub runtime_version: String,

    /// Compiler used to build the worker
    pub rustc_version: String,

    pub started_at: DateTime<Utc>,
}

impl WorkerInfo {
    /// Collect information about the current host
    pub fn collect(worker_id: impl Into<String>) -> Self {
        let build = BuildInfo::current();
        Self {
            worker_id: worker_id.into(),
            hostname: get_hostname(),
            os: std::env::consts::OS.to_string(),
            os_release: get_os_release(),
            arch: std::env::consts::ARCH.to_string(),
            cpu_count: num_cpus::get(),
            runtime: build.name.to_string(),
            runtime_version: build.version.to_string(),
            rustc_version: build.rustc_version.to_string(),
            started_at: Utc::now(),
        }
    }

    pub fn identity(&self) -> WorkerIdentity {
        WorkerIdentity {
            worker_id: self.worker_id.clone(),
            hostname: self.hostname.clone(),
        }
    }

    /// One-line summary, e.g. "linux x86_64 (Ubuntu 22.04)"
    pub fn system(&self) -> String {
        format!("{} {} ({})", self.os, self.arch, self.os_release)
    }
}

fn get_os_release() -> String {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|l| l.starts_with("PRETTY_NAME="))
                    .map(|l| l.trim_start_matches("PRETTY_NAME=").trim_matches('"').to_string())
            })
            .unwrap_or_else(|| "Linux".to_string())
    }

    #[cfg(target_os = "windows")]
    {
        "Windows".to_string()
    }

    #[cfg(target_os = "macos")]
    {
        "macOS".to_string()
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        "Unknown".to_string()
    }
}

fn get_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

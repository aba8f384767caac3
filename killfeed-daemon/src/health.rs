//! Aggregated health reporting.
//!
//! Combines the ingest service's own health with the state of the event
//! writer and the per-source connection health into one [`DaemonHealth`]
//! report. The overall daemon status is the worst status among all enabled
//! components.
//!
//! # Aggregation Rule
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use chrono::{DateTime, Utc};
use serde::Serialize;

use killfeed_core::pipeline::HealthStatus;
use killfeed_core::types::SourceId;
use killfeed_ingest::SourceHealth;

/// Aggregated health report for the entire daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Overall daemon health status (worst of all components).
    pub status: HealthStatus,
    /// Daemon uptime in seconds since start.
    pub uptime_secs: u64,
    /// Per-component health reports.
    pub components: Vec<ComponentHealth>,
    /// Per-source connection health, sorted by source id.
    pub sources: Vec<SourceHealthReport>,
}

/// Health status for a single daemon component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    /// Component name (e.g., "ingest", "event-writer").
    pub name: String,
    /// Whether the component is enabled in configuration.
    pub enabled: bool,
    /// Current health status of the component.
    pub status: HealthStatus,
}

/// Serializable view of one source's health.
#[derive(Debug, Clone, Serialize)]
pub struct SourceHealthReport {
    pub source_id: String,
    pub status: &'static str,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_success: Option<DateTime<Utc>>,
}

impl SourceHealthReport {
    pub fn new(id: &SourceId, health: &SourceHealth) -> Self {
        Self {
            source_id: id.to_string(),
            status: health.status.as_str(),
            consecutive_failures: health.consecutive_failures,
            last_error: health.last_error.clone(),
            last_success: health.last_success,
        }
    }
}

/// Aggregate multiple component health statuses into a single status.
///
/// Returns the worst status found: Unhealthy > Degraded > Healthy.
/// Only considers enabled components.
pub fn aggregate_status(components: &[ComponentHealth]) -> HealthStatus {
    let mut worst = HealthStatus::Healthy;
    let mut reasons = Vec::new();

    for component in components.iter().filter(|c| c.enabled) {
        match &component.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                if !worst.is_unhealthy() {
                    worst = HealthStatus::Degraded(String::new());
                }
                reasons.push(format!("{}: {}", component.name, reason));
            }
            HealthStatus::Unhealthy(reason) => {
                reasons.push(format!("{}: {}", component.name, reason));
                worst = HealthStatus::Unhealthy(String::new());
            }
        }
    }

    match worst {
        HealthStatus::Healthy => HealthStatus::Healthy,
        HealthStatus::Degraded(_) => HealthStatus::Degraded(reasons.join("; ")),
        HealthStatus::Unhealthy(_) => HealthStatus::Unhealthy(reasons.join("; ")),
    }
}

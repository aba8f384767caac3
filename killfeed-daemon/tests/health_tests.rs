//! Aggregated health report tests.

use killfeed_core::pipeline::HealthStatus;
use killfeed_daemon::health::{ComponentHealth, DaemonHealth, aggregate_status};

fn component(name: &str, status: HealthStatus) -> ComponentHealth {
    ComponentHealth {
        name: name.to_owned(),
        enabled: true,
        status,
    }
}

#[test]
fn test_all_healthy() {
    let components = [
        component("ingest", HealthStatus::Healthy),
        component("event-writer", HealthStatus::Healthy),
    ];

    assert_eq!(aggregate_status(&components), HealthStatus::Healthy);
}

#[test]
fn test_degraded_source_degrades_daemon() {
    let components = [
        component("ingest", HealthStatus::Degraded("us-1: degraded".to_owned())),
        component("event-writer", HealthStatus::Healthy),
    ];

    assert_eq!(
        aggregate_status(&components),
        HealthStatus::Degraded("ingest: us-1: degraded".to_owned())
    );
}

#[test]
fn test_empty_component_list_is_healthy() {
    assert_eq!(aggregate_status(&[]), HealthStatus::Healthy);
}

#[test]
fn test_report_serializes_for_operators() {
    // Given
    let components = vec![component(
        "event-writer",
        HealthStatus::Unhealthy("event output stopped".to_owned()),
    )];
    let health = DaemonHealth {
        status: aggregate_status(&components),
        uptime_secs: 42,
        components,
        sources: Vec::new(),
    };

    // When
    let json = serde_json::to_value(&health).unwrap();

    // Then
    assert_eq!(json["status"]["status"], "unhealthy");
    assert_eq!(json["status"]["reason"], "event-writer: event output stopped");
    assert_eq!(json["uptime_secs"], 42);
    assert_eq!(json["components"][0]["name"], "event-writer");
}

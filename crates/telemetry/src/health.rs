//! Component and job health tracking.
//!
//! Jobs report one of three states: healthy, degraded (still running but
//! retries were exhausted or records are being rejected at an unusual
//! rate), or failed.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Health status for a component or job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Failed,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Degraded components keep serving; failed ones do not.
    pub fn is_serving(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Healthy,
            1 => Self::Degraded,
            _ => Self::Failed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Degraded => 1,
            Self::Failed => 2,
        }
    }
}

/// Health state for one component or job.
#[derive(Debug)]
pub struct ComponentHealth {
    name: &'static str,
    status: AtomicU8,
    message: RwLock<Option<String>>,
}

impl ComponentHealth {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            status: AtomicU8::new(0),
            message: RwLock::new(None),
        }
    }

    pub fn set_healthy(&self) {
        self.status.store(HealthStatus::Healthy.as_u8(), Ordering::Relaxed);
        *self.message.write() = None;
    }

    pub fn set_degraded(&self, msg: impl Into<String>) {
        self.status.store(HealthStatus::Degraded.as_u8(), Ordering::Relaxed);
        *self.message.write() = Some(msg.into());
    }

    pub fn set_failed(&self, msg: impl Into<String>) {
        self.status.store(HealthStatus::Failed.as_u8(), Ordering::Relaxed);
        *self.message.write() = Some(msg.into());
    }

    pub fn status(&self) -> HealthStatus {
        HealthStatus::from_u8(self.status.load(Ordering::Relaxed))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn message(&self) -> Option<String> {
        self.message.read().clone()
    }
}

/// Aggregated health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealthReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealthReport {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
}

/// Global health registry: the two storage collaborators plus one entry per
/// job.
pub struct HealthRegistry {
    pub object_source: ComponentHealth,
    pub event_store: ComponentHealth,
    pub ingest: ComponentHealth,
    pub rollup_refresh: ComponentHealth,
    pub flatten_write: ComponentHealth,
    pub uptime_write: ComponentHealth,
}

impl HealthRegistry {
    pub const fn new() -> Self {
        Self {
            object_source: ComponentHealth::new("object_source"),
            event_store: ComponentHealth::new("event_store"),
            ingest: ComponentHealth::new("ingest"),
            rollup_refresh: ComponentHealth::new("rollup_refresh"),
            flatten_write: ComponentHealth::new("flatten_write"),
            uptime_write: ComponentHealth::new("uptime_write"),
        }
    }

    fn components(&self) -> [&ComponentHealth; 6] {
        [
            &self.object_source,
            &self.event_store,
            &self.ingest,
            &self.rollup_refresh,
            &self.flatten_write,
            &self.uptime_write,
        ]
    }

    /// Worst status across all components.
    pub fn overall(&self) -> HealthStatus {
        let mut overall = HealthStatus::Healthy;
        for component in self.components() {
            let status = component.status();
            if status == HealthStatus::Failed {
                return HealthStatus::Failed;
            }
            if status == HealthStatus::Degraded {
                overall = HealthStatus::Degraded;
            }
        }
        overall
    }

    pub fn report(&self) -> HealthReport {
        HealthReport {
            status: self.overall(),
            components: self
                .components()
                .iter()
                .map(|c| ComponentHealthReport {
                    name: c.name().to_string(),
                    status: c.status(),
                    message: c.message(),
                })
                .collect(),
        }
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global health registry.
pub static HEALTH: HealthRegistry = HealthRegistry::new();

/// Get the global health registry.
pub fn health() -> &'static HealthRegistry {
    &HEALTH
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub intake: bool,
    pub coordinator: bool,
    pub reputation_ledger: bool,
    pub ledger_submitter: bool,
    #[serde(flatten)]
    pub extra: HashMap<String, bool>,
}

impl ComponentHealth {
    pub fn get(&self, key: &str) -> Option<bool> {
        match key {
            "intake" => Some(self.intake),
            "coordinator" => Some(self.coordinator),
            "reputation_ledger" => Some(self.reputation_ledger),
            "ledger_submitter" => Some(self.ledger_submitter),
            _ => self.extra.get(key).copied(),
        }
    }
}

#[derive(Clone)]
pub struct HealthChecker {
    start_time: std::time::Instant,
    status: Arc<RwLock<ComponentHealth>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            start_time: std::time::Instant::now(),
            status: Arc::new(RwLock::new(ComponentHealth {
                intake: false,
                coordinator: false,
                reputation_ledger: false,
                ledger_submitter: false,
                extra: HashMap::new(),
            })),
        }
    }

    pub async fn get_status(&self) -> HealthStatus {
        let components = self.status.read().await.clone();

        HealthStatus {
            status: if components.coordinator && components.intake {
                "healthy".to_string()
            } else {
                "degraded".to_string()
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            components,
        }
    }

    pub async fn update_component(&self, component: &str, healthy: bool) {
        let mut status = self.status.write().await;
        match component {
            "intake" => status.intake = healthy,
            "coordinator" => status.coordinator = healthy,
            "reputation_ledger" => status.reputation_ledger = healthy,
            "ledger_submitter" => status.ledger_submitter = healthy,
            _ => {
                status.extra.insert(component.to_string(), healthy);
            }
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_degraded_until_core_components_up() {
        let checker = HealthChecker::new();
        assert_eq!(checker.get_status().await.status, "degraded");

        checker.update_component("coordinator", true).await;
        checker.update_component("intake", true).await;
        assert_eq!(checker.get_status().await.status, "healthy");
    }

    #[tokio::test]
    async fn test_extra_components_tracked() {
        let checker = HealthChecker::new();
        checker.update_component("reputation_store", false).await;

        let status = checker.get_status().await;
        assert_eq!(status.components.get("reputation_store"), Some(false));
    }
}

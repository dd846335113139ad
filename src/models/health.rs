use serde::Serialize;

use crate::models::status::ConnectionState;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResponse {
    pub status: HealthStatus,
    pub timestamp: String,
    pub broker: BrokerHealth,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrokerHealth {
    pub state: ConnectionState,
    pub retry_backlog: usize,
}

impl HealthCheckResponse {
    /// A disconnected broker is unhealthy; a connected one with a retry
    /// backlog is degraded.
    pub fn from_broker(broker: BrokerHealth, timestamp: String) -> Self {
        let status = match broker.state {
            ConnectionState::Connected if broker.retry_backlog == 0 => HealthStatus::Healthy,
            ConnectionState::Connected => HealthStatus::Degraded,
            ConnectionState::Connecting | ConnectionState::Disconnected => {
                HealthStatus::Unhealthy
            }
        };

        Self {
            status,
            timestamp,
            broker,
        }
    }
}

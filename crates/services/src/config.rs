use std::time::Duration;

use orch_core::compute::ServiceKind;

/// Downstream service endpoints loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServicesConfig {
    pub revenue_url: String,
    pub rebates_url: String,
    pub specialty_url: String,
    /// Per-call timeout in seconds (default: `30`).
    pub timeout_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            revenue_url: "http://revenue-service:8001/revenue".into(),
            rebates_url: "http://rebates-service:8002/rebates".into(),
            specialty_url: "http://specialty-service:8003/specialty".into(),
            timeout_secs: 30,
        }
    }
}

impl ServicesConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                                   |
    /// |-------------------------|-------------------------------------------|
    /// | `REVENUE_SERVICE_URL`   | `http://revenue-service:8001/revenue`     |
    /// | `REBATES_SERVICE_URL`   | `http://rebates-service:8002/rebates`     |
    /// | `SPECIALTY_SERVICE_URL` | `http://specialty-service:8003/specialty` |
    /// | `SERVICE_TIMEOUT_SECS`  | `30`                                      |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let timeout_secs: u64 = std::env::var("SERVICE_TIMEOUT_SECS")
            .unwrap_or_else(|_| defaults.timeout_secs.to_string())
            .parse()
            .expect("SERVICE_TIMEOUT_SECS must be a valid u64");

        Self {
            revenue_url: std::env::var("REVENUE_SERVICE_URL").unwrap_or(defaults.revenue_url),
            rebates_url: std::env::var("REBATES_SERVICE_URL").unwrap_or(defaults.rebates_url),
            specialty_url: std::env::var("SPECIALTY_SERVICE_URL")
                .unwrap_or(defaults.specialty_url),
            timeout_secs,
        }
    }

    pub fn url(&self, kind: ServiceKind) -> &str {
        match kind {
            ServiceKind::Revenue => &self.revenue_url,
            ServiceKind::Rebates => &self.rebates_url,
            ServiceKind::Specialty => &self.specialty_url,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

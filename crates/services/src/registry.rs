//! Closed-set dispatch table from [`ServiceKind`] to endpoint.

use orch_core::compute::ServiceKind;

use crate::config::ServicesConfig;

/// Endpoint of one downstream service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub kind: ServiceKind,
    pub url: String,
}

/// One endpoint per [`ServiceKind`], fixed at construction.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    endpoints: [ServiceEndpoint; 3],
}

impl ServiceRegistry {
    pub fn new(config: &ServicesConfig) -> Self {
        Self {
            endpoints: ServiceKind::ALL.map(|kind| ServiceEndpoint {
                kind,
                url: config.url(kind).trim_end_matches('/').to_string(),
            }),
        }
    }

    pub fn endpoint(&self, kind: ServiceKind) -> &ServiceEndpoint {
        let index = ServiceKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or_default();
        &self.endpoints[index]
    }

    pub fn endpoints(&self) -> &[ServiceEndpoint] {
        &self.endpoints
    }
}

//! The [`ServiceClient`] seam and its HTTP implementation.

use async_trait::async_trait;
use orch_core::compute::ServiceKind;

use crate::config::ServicesConfig;
use crate::error::ServiceCallError;
use crate::registry::ServiceRegistry;

/// Performs one downstream call. Implementations do not retry; the executor
/// owns the retry loop.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    async fn call(
        &self,
        service: ServiceKind,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, ServiceCallError>;
}

/// Calls each service with `POST <url>` and a JSON body.
pub struct HttpServiceClient {
    client: reqwest::Client,
    registry: ServiceRegistry,
}

impl HttpServiceClient {
    /// Build a client with the configured per-call timeout.
    pub fn new(config: &ServicesConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self::with_client(client, ServiceRegistry::new(config)))
    }

    /// Reuse an existing [`reqwest::Client`] (shared connection pool).
    pub fn with_client(client: reqwest::Client, registry: ServiceRegistry) -> Self {
        Self { client, registry }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Map a non-2xx response to a classified error, keeping the body text.
    async fn ensure_success(
        service: ServiceKind,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ServiceCallError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ServiceCallError::from_status(service, status.as_u16(), &body));
        }
        Ok(response)
    }
}

#[async_trait]
impl ServiceClient for HttpServiceClient {
    async fn call(
        &self,
        service: ServiceKind,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, ServiceCallError> {
        let endpoint = self.registry.endpoint(service);
        tracing::debug!(service = %service, url = %endpoint.url, "Calling downstream service");

        let response = self
            .client
            .post(&endpoint.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| ServiceCallError::from_reqwest(service, &e))?;

        let response = Self::ensure_success(service, response).await?;
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ServiceCallError::from_reqwest(service, &e))
    }
}

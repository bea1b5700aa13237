use async_trait::async_trait;

use crate::core::error::ProviderError;
use crate::core::types::{
    AdapterContext, ChatRequest, ChatResponse, DiscoveryOptions, ModelInfo, OutboundRequest,
    ProviderCapabilities, RawResponse,
};

/// Provider adapter contract consumed by the host application's model manager.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Display name used in model records and diagnostics.
    fn name(&self) -> &'static str;

    /// Declares provider support flags used by host capability checks.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Executes a single non-streaming canonical chat request.
    async fn run(
        &self,
        req: &ChatRequest,
        ctx: &AdapterContext,
    ) -> Result<ChatResponse, ProviderError>;

    /// Lists models available to the resolved credentials.
    async fn discover_models(
        &self,
        opts: &DiscoveryOptions,
        ctx: &AdapterContext,
    ) -> Result<Vec<ModelInfo>, ProviderError>;
}

/// Bearer token retrieval for an API key.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a bearer token that is valid at the time of the call.
    async fn get_token(&self, api_key: &str) -> Result<String, ProviderError>;
}

/// Custom fetch hook handed to a generic OpenAI-compatible client.
///
/// Implementations may rewrite the request before it leaves the process, or
/// answer it without touching the network. Non-success upstream responses are
/// returned as `Ok` so the caller's own error handling sees them unmodified.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: OutboundRequest) -> Result<RawResponse, ProviderError>;
}

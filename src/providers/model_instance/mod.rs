//! Callable model handles backed by a custom fetch.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;

use crate::auth::IamTokenClient;
use crate::core::error::ProviderError;
use crate::core::traits::Fetch;
use crate::core::types::{AdapterContext, OutboundRequest, RawResponse, TenantScope};
use crate::providers::watsonx_translate::{
    CHAT_COMPLETIONS_PATH, invalid_configuration_body, openai_compatible_base_url,
    rewrite_chat_url, translate_chat_body,
};
use crate::transport::http::{HttpTransport, bearer_header};

/// Fetch that authenticates and rewrites generic requests for the vendor API.
pub struct WatsonxFetch {
    transport: HttpTransport,
    tokens: Arc<IamTokenClient>,
    api_key: String,
    base_url: String,
    scope: TenantScope,
    ctx: AdapterContext,
}

impl WatsonxFetch {
    pub fn new(
        transport: HttpTransport,
        tokens: Arc<IamTokenClient>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        scope: TenantScope,
    ) -> Self {
        Self {
            transport,
            tokens,
            api_key: api_key.into(),
            base_url: base_url.into(),
            scope,
            ctx: AdapterContext::default(),
        }
    }

    /// Host context whose transport metadata (custom headers, request id
    /// header) applies to every request this fetch sends.
    pub fn with_context(mut self, ctx: AdapterContext) -> Self {
        self.ctx = ctx;
        self
    }

    fn translate(&self, mut request: OutboundRequest) -> OutboundRequest {
        let Some(url) = rewrite_chat_url(&request.url, &self.base_url) else {
            return request;
        };

        tracing::debug!(
            target: "watsonx_provider::fetch",
            from = %request.url,
            to = %url,
            "rewriting chat request"
        );
        request.url = url;

        if let Some(body) = request.body.take() {
            request.body = Some(match translate_chat_body(&body, &self.scope) {
                Ok(translated) => translated,
                Err(error) => {
                    tracing::warn!(
                        target: "watsonx_provider::fetch",
                        error = %error,
                        "chat body is not valid JSON; sending it untranslated"
                    );
                    body
                }
            });
        }

        request
    }
}

#[async_trait]
impl Fetch for WatsonxFetch {
    async fn fetch(&self, request: OutboundRequest) -> Result<RawResponse, ProviderError> {
        let token = self.tokens.token(&self.api_key).await?;

        let mut request = self.translate(request);
        request
            .headers
            .insert(AUTHORIZATION, bearer_header(&token, None)?);

        let url = request.url.clone();
        let response = self
            .transport
            .send(request, &self.ctx)
            .await?;

        if !response.is_success() {
            tracing::warn!(
                target: "watsonx_provider::fetch",
                url = %url,
                status = response.status,
                "watsonx request failed; passing response through"
            );
        }

        Ok(response)
    }
}

/// Fetch used when no project, space or instance is configured.
///
/// Answers every request with a 400 `invalid_configuration` error and never
/// touches the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredFetch;

#[async_trait]
impl Fetch for UnconfiguredFetch {
    async fn fetch(&self, request: OutboundRequest) -> Result<RawResponse, ProviderError> {
        tracing::warn!(
            target: "watsonx_provider::fetch",
            url = %request.url,
            "watsonx project, space or instance not configured; returning configuration error"
        );

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = serde_json::to_vec(&invalid_configuration_body()).map_err(|error| {
            ProviderError::Serialization {
                model: None,
                request_id: None,
                message: error.to_string(),
            }
        })?;

        Ok(RawResponse {
            status: 400,
            headers,
            body,
        })
    }
}

/// A model bound to a fetch, shaped like an OpenAI-compatible client handle.
#[derive(Clone)]
pub struct ModelInstance {
    model_id: String,
    base_url: String,
    fetch: Arc<dyn Fetch>,
}

impl std::fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInstance")
            .field("model_id", &self.model_id)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ModelInstance {
    pub fn new(model_id: impl Into<String>, base_url: &str, fetch: Arc<dyn Fetch>) -> Self {
        Self {
            model_id: model_id.into(),
            base_url: openai_compatible_base_url(base_url),
            fetch,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Base URL the generic client addresses; chat calls under it get rewritten.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}{CHAT_COMPLETIONS_PATH}", self.base_url)
    }

    /// Sends a generic chat-completions body, filling in `model` when absent.
    pub async fn chat_completions(&self, mut body: Value) -> Result<RawResponse, ProviderError> {
        if let Some(object) = body.as_object_mut() {
            object
                .entry("model")
                .or_insert_with(|| Value::String(self.model_id.clone()));
        }

        let payload = serde_json::to_vec(&body).map_err(|error| ProviderError::Serialization {
            model: Some(self.model_id.clone()),
            request_id: None,
            message: error.to_string(),
        })?;

        let mut request =
            OutboundRequest::new(Method::POST, self.chat_completions_url()).with_body(payload);
        request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        self.fetch(request).await
    }

    pub async fn fetch(&self, request: OutboundRequest) -> Result<RawResponse, ProviderError> {
        self.fetch.fetch(request).await
    }
}

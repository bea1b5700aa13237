use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::IamTokenClient;
use crate::catalog::{self, PROVIDER_NAME};
use crate::core::error::{ConfigError, ProviderError};
use crate::core::traits::{Fetch, ProviderAdapter};
use crate::core::types::{
    AdapterContext, ChatRequest, ChatResponse, Credentials, DiscoveryOptions, ModelInfo,
    ProviderCapabilities,
};
use crate::providers::model_instance::{ModelInstance, UnconfiguredFetch, WatsonxFetch};
use crate::providers::translator_contract::ProviderTranslator;
use crate::providers::watsonx_translate::{
    FoundationModelSpecs, LegacyModels, WatsonxDecodeEnvelope, WatsonxTranslator,
    decode_foundation_model_specs, decode_legacy_models, foundation_model_specs_url,
    legacy_models_url,
};
use crate::settings::{CallSettings, SettingKey, SettingsContext};
use crate::transport::http::{
    AUTH_BEARER_TOKEN_KEY, DEFAULT_TIMEOUT_MS, HttpTransport, response_request_id,
};

pub struct WatsonxAdapter {
    transport: HttpTransport,
    tokens: Arc<IamTokenClient>,
    settings: SettingsContext,
    translator: WatsonxTranslator,
}

impl WatsonxAdapter {
    pub fn new(settings: SettingsContext) -> Result<Self, ConfigError> {
        let transport = HttpTransport::new(DEFAULT_TIMEOUT_MS)?;
        let tokens = Arc::new(IamTokenClient::new(transport.clone()));
        Ok(Self::with_token_client(settings, transport, tokens))
    }

    /// Builds an adapter around an existing transport and token client.
    pub fn with_token_client(
        settings: SettingsContext,
        transport: HttpTransport,
        tokens: Arc<IamTokenClient>,
    ) -> Self {
        Self {
            transport,
            tokens,
            settings,
            translator: WatsonxTranslator,
        }
    }

    pub fn token_client(&self) -> &Arc<IamTokenClient> {
        &self.tokens
    }

    pub fn resolve_credentials(&self, call: &CallSettings) -> Result<Credentials, ConfigError> {
        self.settings.resolve_credentials(call)
    }

    pub fn static_models(&self) -> Vec<ModelInfo> {
        catalog::static_models()
    }

    /// Lists models from the vendor catalog, excluding the static ones.
    ///
    /// Only a missing API key is reported as an error; any failure after that
    /// point yields an empty list.
    pub async fn dynamic_models(&self, call: &CallSettings) -> Result<Vec<ModelInfo>, ProviderError> {
        let credentials = self.resolve_credentials(call)?;
        let api_key = require_api_key(&credentials)?;

        if credentials.scope.is_empty() {
            tracing::warn!(
                target: "watsonx_provider::catalog",
                "no watsonx project, space or instance configured; model listing may be empty"
            );
        }

        match self.fetch_dynamic_models(&credentials, api_key).await {
            Ok(models) => {
                tracing::info!(
                    target: "watsonx_provider::catalog",
                    count = models.len(),
                    "listed watsonx models"
                );
                Ok(models)
            }
            Err(error) => {
                tracing::error!(
                    target: "watsonx_provider::catalog",
                    error = %error,
                    "failed to list watsonx models"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Static models followed by dynamic ones.
    pub async fn list_models(&self, call: &CallSettings) -> Result<Vec<ModelInfo>, ProviderError> {
        let static_models = self.static_models();
        let dynamic = self.dynamic_models(call).await?;
        Ok(catalog::merge_static_and_dynamic(&static_models, dynamic))
    }

    /// Creates a callable handle for `model_id`.
    ///
    /// Without a project, space or instance the handle answers every request
    /// with a 400 `invalid_configuration` response instead of failing here.
    pub fn model_instance(
        &self,
        model_id: &str,
        call: &CallSettings,
    ) -> Result<ModelInstance, ProviderError> {
        self.build_model_instance(model_id, call, AdapterContext::default())
    }

    /// Like [`Self::model_instance`], with settings overrides and transport
    /// metadata (custom headers, request id header) taken from `ctx`.
    pub fn model_instance_for_context(
        &self,
        model_id: &str,
        ctx: &AdapterContext,
    ) -> Result<ModelInstance, ProviderError> {
        self.build_model_instance(model_id, &CallSettings::from_context(ctx), ctx.clone())
    }

    fn build_model_instance(
        &self,
        model_id: &str,
        call: &CallSettings,
        ctx: AdapterContext,
    ) -> Result<ModelInstance, ProviderError> {
        let credentials = self.resolve_credentials(call)?;
        let api_key = require_api_key(&credentials)?;

        let fetch: Arc<dyn Fetch> = if credentials.scope.is_empty() {
            tracing::warn!(
                target: "watsonx_provider::model",
                model = model_id,
                "no watsonx project, space or instance configured; requests will be rejected"
            );
            Arc::new(UnconfiguredFetch)
        } else {
            Arc::new(
                WatsonxFetch::new(
                    self.transport.clone(),
                    Arc::clone(&self.tokens),
                    api_key,
                    credentials.base_url.clone(),
                    credentials.scope.clone(),
                )
                .with_context(ctx),
            )
        };

        Ok(ModelInstance::new(model_id, &credentials.base_url, fetch))
    }

    async fn fetch_dynamic_models(
        &self,
        credentials: &Credentials,
        api_key: &str,
    ) -> Result<Vec<ModelInfo>, ProviderError> {
        let token = self.tokens.token(api_key).await?;
        let mut ctx = AdapterContext::default();
        ctx.metadata
            .insert(AUTH_BEARER_TOKEN_KEY.to_string(), token);

        let static_models = self.static_models();
        let specs_url = foundation_model_specs_url(&credentials.base_url);

        match self
            .transport
            .get_json::<FoundationModelSpecs>(None, &specs_url, &ctx)
            .await
        {
            Ok(specs) => Ok(decode_foundation_model_specs(specs, &static_models)),
            Err(ProviderError::Status { status_code, .. }) => {
                tracing::warn!(
                    target: "watsonx_provider::catalog",
                    status = status_code,
                    "foundation model specs unavailable; falling back to models endpoint"
                );
                let legacy: LegacyModels = self
                    .transport
                    .get_json(None, &legacy_models_url(&credentials.base_url), &ctx)
                    .await?;
                Ok(decode_legacy_models(legacy, &static_models))
            }
            Err(error) => Err(error),
        }
    }
}

#[async_trait]
impl ProviderAdapter for WatsonxAdapter {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_tools: false,
            supports_streaming: false,
            supports_remote_discovery: true,
        }
    }

    async fn run(
        &self,
        req: &ChatRequest,
        ctx: &AdapterContext,
    ) -> Result<ChatResponse, ProviderError> {
        let body = self.translator.encode_request(req)?;
        let instance = self.model_instance_for_context(&req.model, ctx)?;

        let response = instance.chat_completions(body).await?;
        let request_id = response_request_id(&response.headers, ctx);

        if !response.is_success() {
            return Err(ProviderError::Status {
                model: Some(req.model.clone()),
                status_code: response.status,
                request_id,
                message: response.text(),
            });
        }

        let body: Value = response
            .json()
            .map_err(|error| ProviderError::Serialization {
                model: Some(req.model.clone()),
                request_id,
                message: error.to_string(),
            })?;

        self.translator.decode_response(&WatsonxDecodeEnvelope {
            body,
            requested_model: req.model.clone(),
        })
    }

    async fn discover_models(
        &self,
        opts: &DiscoveryOptions,
        ctx: &AdapterContext,
    ) -> Result<Vec<ModelInfo>, ProviderError> {
        if !opts.remote {
            return Ok(self.static_models());
        }

        self.list_models(&CallSettings::from_context(ctx)).await
    }
}

fn require_api_key(credentials: &Credentials) -> Result<&str, ProviderError> {
    credentials.api_key.as_deref().ok_or_else(|| {
        ConfigError::credential_missing(
            "api_key",
            vec![SettingKey::ApiKey.env_name().to_string()],
        )
        .into()
    })
}

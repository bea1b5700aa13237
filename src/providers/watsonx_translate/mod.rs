use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::catalog::{self, DEFAULT_CONTEXT_WINDOW, PROVIDER_NAME};
use crate::core::error::ProviderError;
use crate::core::types::{
    ChatRequest, ChatResponse, FinishReason, ModelInfo, ModelMetadata, TenantScope, Usage,
};
use crate::providers::translator_contract::ProviderTranslator;

pub const API_VERSION: &str = "2024-05-31";
pub const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

const FOUNDATION_MODEL_SPECS_LIMIT: u32 = 200;
const SOURCE_FOUNDATION_MODEL_SPECS: &str = "foundation_model_specs";
const SOURCE_LEGACY_MODELS: &str = "models";
const TEXT_GENERATION_TASK_IDS: [&str; 2] = ["text_generation", "generation"];
const TRANSLATED_CHAT_FIELDS: [&str; 8] = [
    "model",
    "model_id",
    "messages",
    "temperature",
    "max_tokens",
    "top_p",
    "stop",
    "stream",
];

/// Base URL handed to a generic OpenAI-compatible client.
pub fn openai_compatible_base_url(base_url: &str) -> String {
    format!("{base_url}/ml/v1")
}

pub fn chat_url(base_url: &str) -> String {
    format!("{base_url}/ml/v1/text/chat?version={API_VERSION}")
}

pub fn foundation_model_specs_url(base_url: &str) -> String {
    format!(
        "{base_url}/ml/v1/foundation_model_specs?version={API_VERSION}&limit={FOUNDATION_MODEL_SPECS_LIMIT}"
    )
}

pub fn legacy_models_url(base_url: &str) -> String {
    format!("{base_url}/ml/v1/models?version={API_VERSION}")
}

/// Redirects generic chat-completions requests to the vendor chat endpoint.
pub fn rewrite_chat_url(url: &str, base_url: &str) -> Option<String> {
    url.contains(CHAT_COMPLETIONS_PATH)
        .then(|| chat_url(base_url))
}

/// Reshapes a generic chat-completions body into the vendor chat schema.
///
/// Non-object input is returned unchanged.
pub fn reshape_chat_body(generic: &Value, scope: &TenantScope) -> Value {
    let Some(source) = generic.as_object() else {
        return generic.clone();
    };

    let dropped = untranslated_fields(source);
    if !dropped.is_empty() {
        tracing::debug!(
            target: "watsonx_provider::translate",
            fields = ?dropped,
            "dropping chat fields the vendor schema does not take"
        );
    }

    let mut body = Map::new();

    if let Some(model) = source.get("model_id").or_else(|| source.get("model")) {
        body.insert("model_id".to_string(), model.clone());
    }

    if let Some(messages) = source.get("messages") {
        body.insert("messages".to_string(), wrap_message_contents(messages));
    }

    for (field, value) in scope.body_fields() {
        body.insert(field.to_string(), Value::String(value.to_string()));
    }

    let parameters = sampling_parameters(source);
    if !parameters.is_empty() {
        body.insert("parameters".to_string(), Value::Object(parameters));
    }

    if let Some(stream) = source.get("stream") {
        body.insert("stream".to_string(), stream.clone());
    }

    Value::Object(body)
}

/// Byte-level form of [`reshape_chat_body`].
pub fn translate_chat_body(body: &[u8], scope: &TenantScope) -> Result<Vec<u8>, serde_json::Error> {
    let generic: Value = serde_json::from_slice(body)?;
    serde_json::to_vec(&reshape_chat_body(&generic, scope))
}

/// Generic chat fields that [`reshape_chat_body`] does not carry over.
fn untranslated_fields(source: &Map<String, Value>) -> Vec<&str> {
    source
        .keys()
        .map(String::as_str)
        .filter(|field| !TRANSLATED_CHAT_FIELDS.contains(field))
        .collect()
}

fn wrap_message_contents(messages: &Value) -> Value {
    let Some(messages) = messages.as_array() else {
        return messages.clone();
    };

    Value::Array(
        messages
            .iter()
            .map(|message| {
                let mut message = message.clone();
                if let Some(object) = message.as_object_mut()
                    && let Some(Value::String(text)) = object.get("content")
                {
                    let parts = json!([{ "type": "text", "text": text }]);
                    object.insert("content".to_string(), parts);
                }
                message
            })
            .collect(),
    )
}

fn sampling_parameters(source: &Map<String, Value>) -> Map<String, Value> {
    let mut parameters = Map::new();

    let mappings = [
        ("temperature", "temperature"),
        ("max_tokens", "max_new_tokens"),
        ("top_p", "top_p"),
        ("stop", "stop_sequences"),
    ];
    for (generic_field, vendor_field) in mappings {
        if let Some(value) = source.get(generic_field)
            && !value.is_null()
        {
            parameters.insert(vendor_field.to_string(), value.clone());
        }
    }

    parameters
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WatsonxDecodeEnvelope {
    pub body: Value,
    pub requested_model: String,
}

/// Canonical requests to generic bodies and vendor chat responses back.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct WatsonxTranslator;

impl ProviderTranslator for WatsonxTranslator {
    type RequestPayload = Value;
    type ResponsePayload = WatsonxDecodeEnvelope;

    fn encode_request(&self, req: &ChatRequest) -> Result<Self::RequestPayload, ProviderError> {
        if req.model.trim().is_empty() {
            return Err(protocol_error(None, "model must not be empty"));
        }
        if req.messages.is_empty() {
            return Err(protocol_error(
                Some(&req.model),
                "chat request must contain at least one message",
            ));
        }

        serde_json::to_value(req).map_err(|error| ProviderError::Serialization {
            model: Some(req.model.clone()),
            request_id: None,
            message: error.to_string(),
        })
    }

    fn decode_response(
        &self,
        payload: &Self::ResponsePayload,
    ) -> Result<ChatResponse, ProviderError> {
        let model = payload.requested_model.as_str();
        let root = payload
            .body
            .as_object()
            .ok_or_else(|| protocol_error(Some(model), "chat response must be a JSON object"))?;

        let choice = root
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .ok_or_else(|| protocol_error(Some(model), "chat response missing choices"))?;

        let content = match choice.pointer("/message/content") {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Array(parts)) => parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(""),
            Some(Value::Null) | None => String::new(),
            Some(_) => {
                return Err(protocol_error(
                    Some(model),
                    "chat response message content has unexpected type",
                ));
            }
        };

        let usage = root
            .get("usage")
            .map(|usage| Usage {
                input_tokens: usage.get("prompt_tokens").and_then(Value::as_u64),
                output_tokens: usage.get("completion_tokens").and_then(Value::as_u64),
                total_tokens: usage.get("total_tokens").and_then(Value::as_u64),
            })
            .unwrap_or_default();

        Ok(ChatResponse {
            id: root.get("id").and_then(Value::as_str).map(str::to_string),
            model: root
                .get("model_id")
                .or_else(|| root.get("model"))
                .and_then(Value::as_str)
                .unwrap_or(model)
                .to_string(),
            content,
            usage,
            finish_reason: FinishReason::from_vendor(
                choice.get("finish_reason").and_then(Value::as_str),
            ),
            raw_provider_response: Some(payload.body.clone()),
        })
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct FoundationModelSpecs {
    #[serde(default)]
    pub resources: Vec<FoundationModelSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FoundationModelSpec {
    pub model_id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub number_params: Option<String>,
    #[serde(default)]
    pub tasks: Vec<TaskTag>,
}

/// The listing arrives under `resources` or `models`; both are read when present.
#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct LegacyModels {
    #[serde(default)]
    pub resources: Vec<LegacyModel>,
    #[serde(default)]
    pub models: Vec<LegacyModel>,
}

impl LegacyModels {
    fn into_records(self) -> impl Iterator<Item = LegacyModel> {
        self.resources.into_iter().chain(self.models)
    }
}

/// Ids and labels come under either of two keys, sometimes both.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LegacyModel {
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub available: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tasks: Vec<TaskTag>,
    #[serde(default)]
    pub metadata: Option<LegacyModelMetadata>,
}

impl LegacyModel {
    fn is_available(&self) -> bool {
        self.available.unwrap_or(false)
            || self
                .status
                .as_deref()
                .is_some_and(|status| status.eq_ignore_ascii_case("available"))
    }

    /// `model_id` wins over `id`; blank values count as missing.
    fn resolved_id(&self) -> Option<String> {
        non_blank(self.model_id.as_deref()).or_else(|| non_blank(self.id.as_deref()))
    }

    fn resolved_label(&self) -> Option<String> {
        non_blank(self.label.as_deref()).or_else(|| non_blank(self.name.as_deref()))
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct LegacyModelMetadata {
    #[serde(default)]
    pub context_length: Option<u32>,
}

/// Task tags arrive either as bare ids or as `{ "id": ... }` objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum TaskTag {
    Id(String),
    Ref { id: String },
}

impl TaskTag {
    fn id(&self) -> &str {
        match self {
            Self::Id(id) | Self::Ref { id } => id,
        }
    }
}

fn task_ids(tasks: &[TaskTag]) -> Vec<String> {
    tasks.iter().map(|task| task.id().to_string()).collect()
}

pub(crate) fn decode_foundation_model_specs(
    specs: FoundationModelSpecs,
    static_models: &[ModelInfo],
) -> Vec<ModelInfo> {
    let models = specs
        .resources
        .into_iter()
        .filter(|spec| !spec.model_id.trim().is_empty())
        .map(|spec| {
            let tasks = task_ids(&spec.tasks);
            ModelInfo {
                label: spec.label.unwrap_or_else(|| spec.model_id.clone()),
                provider: PROVIDER_NAME.to_string(),
                max_token_allowed: catalog::estimate_max_tokens(&spec.model_id, &tasks),
                metadata: Some(ModelMetadata {
                    provider: spec.provider,
                    source: SOURCE_FOUNDATION_MODEL_SPECS.to_string(),
                    description: spec.short_description,
                    parameter_size: spec.number_params,
                    tasks,
                }),
                name: spec.model_id,
            }
        })
        .collect();

    catalog::exclude_static(models, static_models)
}

pub(crate) fn decode_legacy_models(
    models: LegacyModels,
    static_models: &[ModelInfo],
) -> Vec<ModelInfo> {
    let models = models
        .into_records()
        .filter(|model| model.is_available())
        .filter(|model| {
            model
                .tasks
                .iter()
                .any(|task| TEXT_GENERATION_TASK_IDS.contains(&task.id()))
        })
        .filter_map(|model| {
            let name = model.resolved_id()?;
            let max_token_allowed = model
                .metadata
                .as_ref()
                .and_then(|metadata| metadata.context_length)
                .unwrap_or(DEFAULT_CONTEXT_WINDOW);
            Some(ModelInfo {
                label: model.resolved_label().unwrap_or_else(|| name.clone()),
                provider: PROVIDER_NAME.to_string(),
                max_token_allowed,
                metadata: Some(ModelMetadata {
                    provider: model.provider,
                    source: SOURCE_LEGACY_MODELS.to_string(),
                    description: None,
                    parameter_size: None,
                    tasks: task_ids(&model.tasks),
                }),
                name,
            })
        })
        .collect();

    catalog::exclude_static(models, static_models)
}

/// Body of the synthetic response returned when no tenant scope is configured.
pub fn invalid_configuration_body() -> Value {
    json!({
        "error": {
            "message": "watsonx requires a project id, space id or instance CRN; set WATSONX_PROJECT_ID, WATSONX_SPACE_ID or WATSONX_INSTANCE_CRN",
            "type": "invalid_request_error",
            "code": "invalid_configuration",
        }
    })
}

fn protocol_error(model: Option<&str>, message: impl Into<String>) -> ProviderError {
    ProviderError::Protocol {
        model: model.map(str::to_string),
        request_id: None,
        message: message.into(),
    }
}

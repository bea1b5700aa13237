use indexmap::IndexMap;

use crate::core::error::ProviderError;
use crate::core::types::ModelInfo;

pub const PROVIDER_NAME: &str = "Watsonx";

pub const DEFAULT_CONTEXT_WINDOW: u32 = 8_192;
pub const LARGE_MODEL_CONTEXT_WINDOW: u32 = 32_768;
pub const CODE_MODEL_CONTEXT_FLOOR: u32 = 16_384;

const LARGE_PARAMETER_HINTS: [&str; 3] = ["70b", "90b", "405b"];
const CODE_TASK_ID: &str = "code";

/// Models offered regardless of what the catalog endpoints return.
pub fn static_models() -> Vec<ModelInfo> {
    [
        ("ibm/granite-3-8b-instruct", "Granite 3 8B Instruct", 8_192),
        ("ibm/granite-3-2b-instruct", "Granite 3 2B Instruct", 8_192),
        (
            "meta-llama/llama-3-3-70b-instruct",
            "Llama 3.3 70B Instruct",
            32_768,
        ),
        ("mistralai/mistral-large", "Mistral Large", 32_768),
    ]
    .into_iter()
    .map(|(name, label, max_token_allowed)| ModelInfo {
        name: name.to_string(),
        label: label.to_string(),
        provider: PROVIDER_NAME.to_string(),
        max_token_allowed,
        metadata: None,
    })
    .collect()
}

/// Best-effort context allowance from the model id and its task tags.
///
/// Parameter-count substrings are matched case-insensitively; this is a
/// heuristic over vendor naming, not a vendor guarantee.
pub fn estimate_max_tokens<S: AsRef<str>>(model_id: &str, tasks: &[S]) -> u32 {
    let id = model_id.to_ascii_lowercase();
    let mut max_tokens = if LARGE_PARAMETER_HINTS.iter().any(|hint| id.contains(hint)) {
        LARGE_MODEL_CONTEXT_WINDOW
    } else {
        DEFAULT_CONTEXT_WINDOW
    };

    if tasks.iter().any(|task| task.as_ref() == CODE_TASK_ID) {
        max_tokens = max_tokens.max(CODE_MODEL_CONTEXT_FLOOR);
    }

    max_tokens
}

pub fn is_static_model(static_models: &[ModelInfo], name: &str) -> bool {
    static_models.iter().any(|model| model.name == name)
}

/// Drops models already in the static list and repeated names, keeping first-seen order.
pub fn exclude_static(models: Vec<ModelInfo>, static_models: &[ModelInfo]) -> Vec<ModelInfo> {
    let mut unique: IndexMap<String, ModelInfo> = IndexMap::new();

    for model in models {
        if is_static_model(static_models, &model.name) || unique.contains_key(&model.name) {
            continue;
        }
        unique.insert(model.name.clone(), model);
    }

    unique.into_values().collect()
}

/// Static models first, then dynamic models not already listed.
pub fn merge_static_and_dynamic(
    static_models: &[ModelInfo],
    dynamic_models: Vec<ModelInfo>,
) -> Vec<ModelInfo> {
    let mut merged = static_models.to_vec();
    merged.extend(exclude_static(dynamic_models, static_models));
    merged
}

pub fn export_models_json(models: &[ModelInfo]) -> Result<String, ProviderError> {
    serde_json::to_string_pretty(models).map_err(|error| ProviderError::Serialization {
        model: None,
        request_id: None,
        message: error.to_string(),
    })
}

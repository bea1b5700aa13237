//! Layered credential resolution.
//!
//! Each setting is looked up, in order, in the per-call overrides, the
//! per-provider settings, the server environment, the process environment and
//! finally the fallback values carried by [`SettingsContext`]. The first
//! non-empty value wins. Nothing here is cached; every call resolves afresh.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::error::ConfigError;
use crate::core::types::{AdapterContext, Credentials, TenantScope};

pub const DEFAULT_BASE_URL: &str = "https://us-south.ml.cloud.ibm.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SettingKey {
    BaseUrl,
    ApiKey,
    ProjectId,
    SpaceId,
    InstanceCrn,
}

impl SettingKey {
    pub const ALL: [SettingKey; 5] = [
        SettingKey::BaseUrl,
        SettingKey::ApiKey,
        SettingKey::ProjectId,
        SettingKey::SpaceId,
        SettingKey::InstanceCrn,
    ];

    /// Environment variable name, also used as the override key.
    pub fn env_name(self) -> &'static str {
        match self {
            Self::BaseUrl => "WATSONX_URL",
            Self::ApiKey => "WATSONX_API_KEY",
            Self::ProjectId => "WATSONX_PROJECT_ID",
            Self::SpaceId => "WATSONX_SPACE_ID",
            Self::InstanceCrn => "WATSONX_INSTANCE_CRN",
        }
    }

    /// Key under which an [`AdapterContext`] carries a per-call override.
    pub fn metadata_key(self) -> &'static str {
        match self {
            Self::BaseUrl => "watsonx.base_url",
            Self::ApiKey => "watsonx.api_key",
            Self::ProjectId => "watsonx.project_id",
            Self::SpaceId => "watsonx.space_id",
            Self::InstanceCrn => "watsonx.instance_crn",
        }
    }
}

/// Read-only view of an environment.
pub trait EnvSource: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for BTreeMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Settings the host stores for this provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderSettings {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub space_id: Option<String>,
    pub instance_crn: Option<String>,
}

impl ProviderSettings {
    fn get(&self, key: SettingKey) -> Option<&str> {
        let value = match key {
            SettingKey::BaseUrl => &self.base_url,
            SettingKey::ApiKey => &self.api_key,
            SettingKey::ProjectId => &self.project_id,
            SettingKey::SpaceId => &self.space_id,
            SettingKey::InstanceCrn => &self.instance_crn,
        };
        value.as_deref()
    }
}

/// Per-call inputs to resolution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallSettings {
    /// Explicit overrides keyed by [`SettingKey::env_name`].
    pub overrides: BTreeMap<String, String>,
    pub provider: ProviderSettings,
    /// Environment of the serving host, when it differs from the process's.
    pub server_env: BTreeMap<String, String>,
}

impl CallSettings {
    pub fn with_override(mut self, key: SettingKey, value: impl Into<String>) -> Self {
        self.overrides.insert(key.env_name().to_string(), value.into());
        self
    }

    /// Collects overrides carried in adapter context metadata.
    pub fn from_context(ctx: &AdapterContext) -> Self {
        let overrides = SettingKey::ALL
            .iter()
            .filter_map(|key| {
                ctx.metadata
                    .get(key.metadata_key())
                    .map(|value| (key.env_name().to_string(), value.clone()))
            })
            .collect();

        Self {
            overrides,
            ..Self::default()
        }
    }
}

/// Process-wide resolution state, passed explicitly rather than held globally.
#[derive(Clone)]
pub struct SettingsContext {
    process_env: Arc<dyn EnvSource>,
    fallback: BTreeMap<String, String>,
}

impl Default for SettingsContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SettingsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsContext")
            .field("fallback_keys", &self.fallback.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl SettingsContext {
    pub fn new() -> Self {
        Self::with_env(ProcessEnv)
    }

    pub fn with_env(env: impl EnvSource + 'static) -> Self {
        Self {
            process_env: Arc::new(env),
            fallback: BTreeMap::new(),
        }
    }

    pub fn with_fallback(mut self, key: SettingKey, value: impl Into<String>) -> Self {
        self.fallback
            .insert(key.env_name().to_string(), value.into());
        self
    }

    pub fn resolve(&self, key: SettingKey, call: &CallSettings) -> Option<String> {
        let name = key.env_name();

        let layers = [
            ("override", call.overrides.get(name).cloned()),
            ("provider", call.provider.get(key).map(str::to_string)),
            ("server_env", call.server_env.get(name).cloned()),
            ("process_env", self.process_env.var(name)),
            ("fallback", self.fallback.get(name).cloned()),
        ];

        for (layer, value) in layers {
            if let Some(value) = non_empty(value) {
                tracing::trace!(target: "watsonx_provider::settings", setting = name, layer, "setting resolved");
                return Some(value);
            }
        }

        None
    }

    /// Fails only when the resolved base URL is not an absolute http(s) URL.
    pub fn resolve_credentials(&self, call: &CallSettings) -> Result<Credentials, ConfigError> {
        let base_url = match self.resolve(SettingKey::BaseUrl, call) {
            Some(value) => validate_base_url(normalize_base_url(value))?,
            None => DEFAULT_BASE_URL.to_string(),
        };

        Ok(Credentials {
            base_url,
            api_key: self.resolve(SettingKey::ApiKey, call),
            scope: TenantScope {
                project_id: self.resolve(SettingKey::ProjectId, call),
                space_id: self.resolve(SettingKey::SpaceId, call),
                instance_crn: self.resolve(SettingKey::InstanceCrn, call),
            },
        })
    }
}

pub fn normalize_base_url(base_url: impl Into<String>) -> String {
    let value = base_url.into();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return DEFAULT_BASE_URL.to_string();
    }

    trimmed.trim_end_matches('/').to_string()
}

fn validate_base_url(base_url: String) -> Result<String, ConfigError> {
    let parsed = reqwest::Url::parse(&base_url).map_err(|error| ConfigError::InvalidBaseUrl {
        url: base_url.clone(),
        reason: error.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(base_url),
        scheme => Err(ConfigError::InvalidBaseUrl {
            url: base_url,
            reason: format!("unsupported scheme {scheme}"),
        }),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

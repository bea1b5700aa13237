use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error(
        "credential missing [setting={setting}{env_candidates}]",
        env_candidates = format_env_candidates(.env_candidates)
    )]
    CredentialMissing {
        setting: String,
        env_candidates: Vec<String>,
    },
    #[error("invalid timeout: {timeout_ms} ms")]
    InvalidTimeout { timeout_ms: u64 },
    #[error("invalid base url {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl ConfigError {
    pub fn credential_missing(setting: impl Into<String>, mut env_candidates: Vec<String>) -> Self {
        env_candidates.retain(|candidate| !candidate.is_empty());
        env_candidates.sort_unstable();
        env_candidates.dedup();

        Self::CredentialMissing {
            setting: setting.into(),
            env_candidates,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(
        "watsonx authentication failed{context}: {message}",
        context = format_context(None, .request_id.as_deref(), None)
    )]
    AuthenticationFailed {
        request_id: Option<String>,
        message: String,
    },
    #[error(
        "watsonx transport error{context}: {message}",
        context = format_context(None, .request_id.as_deref(), None)
    )]
    Transport {
        request_id: Option<String>,
        message: String,
    },
    #[error(
        "watsonx status error{context}: {message}",
        context = format_context(.model.as_deref(), .request_id.as_deref(), Some(*.status_code))
    )]
    Status {
        model: Option<String>,
        status_code: u16,
        request_id: Option<String>,
        message: String,
    },
    #[error(
        "watsonx protocol error{context}: {message}",
        context = format_context(.model.as_deref(), .request_id.as_deref(), None)
    )]
    Protocol {
        model: Option<String>,
        request_id: Option<String>,
        message: String,
    },
    #[error(
        "watsonx serialization error{context}: {message}",
        context = format_context(.model.as_deref(), .request_id.as_deref(), None)
    )]
    Serialization {
        model: Option<String>,
        request_id: Option<String>,
        message: String,
    },
}

impl ProviderError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Config(_) => None,
            Self::AuthenticationFailed { request_id, .. }
            | Self::Transport { request_id, .. }
            | Self::Status { request_id, .. }
            | Self::Protocol { request_id, .. }
            | Self::Serialization { request_id, .. } => request_id.as_deref(),
        }
    }
}

fn format_env_candidates(env_candidates: &[String]) -> String {
    if env_candidates.is_empty() {
        String::new()
    } else {
        format!(", env_candidates={}", env_candidates.join(", "))
    }
}

fn format_context(
    model: Option<&str>,
    request_id: Option<&str>,
    status_code: Option<u16>,
) -> String {
    let mut context = Vec::new();

    if let Some(model) = model {
        context.push(format!("model={model}"));
    }
    if let Some(request_id) = request_id {
        context.push(format!("request_id={request_id}"));
    }
    if let Some(status_code) = status_code {
        context.push(format!("status_code={status_code}"));
    }

    if context.is_empty() {
        String::new()
    } else {
        format!(" [{}]", context.join(", "))
    }
}

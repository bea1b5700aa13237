//! IAM token exchange with a lazily refreshed in-memory cache.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::error::ProviderError;
use crate::core::traits::TokenProvider;
use crate::core::types::AdapterContext;
use crate::transport::http::HttpTransport;

pub const IAM_TOKEN_URL: &str = "https://iam.cloud.ibm.com/identity/token";
pub const IAM_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// Subtracted from the advertised lifetime so a token never expires mid-request.
pub const TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(300);

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    apikey: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: Instant,
}

impl CachedToken {
    /// Lifetimes shorter than the safety margin yield an already-expired token.
    pub fn issued(token: impl Into<String>, expires_in_secs: u64, acquired_at: Instant) -> Self {
        let lifetime = Duration::from_secs(expires_in_secs).saturating_sub(TOKEN_SAFETY_MARGIN);

        Self {
            token: token.into(),
            expires_at: acquired_at + lifetime,
        }
    }

    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug)]
struct CacheSlot {
    key_fingerprint: u64,
    token: CachedToken,
}

fn key_fingerprint(api_key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    api_key.hash(&mut hasher);
    hasher.finish()
}

/// Exchanges API keys for IAM bearer tokens.
///
/// One cache slot per client, tagged with a fingerprint of the key that minted
/// it; a lookup with a different key treats the slot as empty. Two callers that
/// both find the slot expired each perform an exchange and the later write wins.
#[derive(Debug)]
pub struct IamTokenClient {
    transport: HttpTransport,
    token_url: String,
    cache: RwLock<Option<CacheSlot>>,
}

impl IamTokenClient {
    pub fn new(transport: HttpTransport) -> Self {
        Self::with_token_url(transport, IAM_TOKEN_URL)
    }

    pub fn with_token_url(transport: HttpTransport, token_url: impl Into<String>) -> Self {
        Self {
            transport,
            token_url: token_url.into(),
            cache: RwLock::new(None),
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    pub async fn token(&self, api_key: &str) -> Result<String, ProviderError> {
        let fingerprint = key_fingerprint(api_key);
        if let Some(slot) = self.cache.read().await.as_ref()
            && slot.key_fingerprint == fingerprint
            && slot.token.is_valid_at(Instant::now())
        {
            return Ok(slot.token.token.clone());
        }

        let acquired_at = Instant::now();
        let response = self.exchange(api_key).await?;
        let cached = CachedToken::issued(response.access_token, response.expires_in, acquired_at);
        let token = cached.token.clone();

        tracing::debug!(
            target: "watsonx_provider::auth",
            expires_in = response.expires_in,
            "iam token refreshed"
        );
        *self.cache.write().await = Some(CacheSlot {
            key_fingerprint: fingerprint,
            token: cached,
        });

        Ok(token)
    }

    /// Snapshot of the cache slot, expired or not.
    pub async fn cached(&self) -> Option<CachedToken> {
        self.cache
            .read()
            .await
            .as_ref()
            .map(|slot| slot.token.clone())
    }

    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    async fn exchange(&self, api_key: &str) -> Result<TokenResponse, ProviderError> {
        let form = TokenRequest {
            grant_type: IAM_GRANT_TYPE,
            apikey: api_key,
        };

        self.transport
            .post_form::<_, TokenResponse>(&self.token_url, &form, &AdapterContext::default())
            .await
            .map_err(|error| {
                tracing::error!(
                    target: "watsonx_provider::auth",
                    status = ?error.status_code(),
                    "iam token exchange failed"
                );
                ProviderError::AuthenticationFailed {
                    request_id: error.request_id().map(str::to_string),
                    message: "failed to obtain IAM token".to_string(),
                }
            })
    }
}

#[async_trait]
impl TokenProvider for IamTokenClient {
    async fn get_token(&self, api_key: &str) -> Result<String, ProviderError> {
        self.token(api_key).await
    }
}

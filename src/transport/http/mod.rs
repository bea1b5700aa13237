use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::error::{ConfigError, ProviderError};
use crate::core::types::{AdapterContext, OutboundRequest, RawResponse};

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub(crate) const AUTH_BEARER_TOKEN_KEY: &str = "transport.auth.bearer_token";
const CUSTOM_HEADER_PREFIX: &str = "transport.header.";
const REQUEST_ID_HEADER_KEY: &str = "transport.request_id_header";
const DEFAULT_REQUEST_ID_HEADER: &str = "x-global-transaction-id";

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout_ms: u64,
}

impl HttpTransport {
    pub fn new(timeout_ms: u64) -> Result<Self, ConfigError> {
        Self::with_client(reqwest::Client::new(), timeout_ms)
    }

    pub fn with_client(client: reqwest::Client, timeout_ms: u64) -> Result<Self, ConfigError> {
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout { timeout_ms });
        }

        Ok(Self { client, timeout_ms })
    }

    pub async fn get_json<TResp>(
        &self,
        model: Option<&str>,
        url: &str,
        ctx: &AdapterContext,
    ) -> Result<TResp, ProviderError>
    where
        TResp: DeserializeOwned,
    {
        let header_config = build_header_config(model, ctx)?;
        let builder = self.request(Method::GET, url, &header_config);
        self.execute_json(builder, model, &header_config).await
    }

    /// Posts a form-encoded body and decodes a JSON response.
    pub async fn post_form<TForm, TResp>(
        &self,
        url: &str,
        form: &TForm,
        ctx: &AdapterContext,
    ) -> Result<TResp, ProviderError>
    where
        TForm: Serialize + ?Sized,
        TResp: DeserializeOwned,
    {
        let header_config = build_header_config(None, ctx)?;
        let builder = self.request(Method::POST, url, &header_config).form(form);
        self.execute_json(builder, None, &header_config).await
    }

    /// Sends a request verbatim and returns the response whatever its status.
    ///
    /// Only connection-level failures are reported as errors.
    pub async fn send(
        &self,
        request: OutboundRequest,
        ctx: &AdapterContext,
    ) -> Result<RawResponse, ProviderError> {
        let header_config = build_header_config(None, ctx)?;
        let method = request.method.clone();
        let url = request.url.clone();

        let mut builder = self
            .client
            .request(request.method, &request.url)
            .timeout(Duration::from_millis(self.timeout_ms))
            .headers(header_config.headers)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|error| ProviderError::Transport {
                request_id: None,
                message: error.to_string(),
            })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let request_id = extract_request_id(&headers, &header_config.request_id_header);
        tracing::debug!(
            target: "watsonx_provider::transport",
            method = %method,
            url = %url,
            status,
            request_id = request_id.as_deref().unwrap_or(""),
            "http response"
        );
        let body = response
            .bytes()
            .await
            .map_err(|error| ProviderError::Transport {
                request_id,
                message: format!("failed to read response body: {error}"),
            })?;

        Ok(RawResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }

    fn request(&self, method: Method, url: &str, header_config: &HeaderConfig) -> RequestBuilder {
        self.client
            .request(method, url)
            .timeout(Duration::from_millis(self.timeout_ms))
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .headers(header_config.headers.clone())
    }

    async fn execute_json<TResp>(
        &self,
        builder: RequestBuilder,
        model: Option<&str>,
        header_config: &HeaderConfig,
    ) -> Result<TResp, ProviderError>
    where
        TResp: DeserializeOwned,
    {
        let response = builder
            .send()
            .await
            .map_err(|error| ProviderError::Transport {
                request_id: None,
                message: error.to_string(),
            })?;

        let status_code = response.status().as_u16();
        let request_id = extract_request_id(response.headers(), &header_config.request_id_header);

        if !response.status().is_success() {
            return Err(build_status_error(model, status_code, request_id, response).await);
        }

        response
            .json::<TResp>()
            .await
            .map_err(|error| ProviderError::Serialization {
                model: model.map(str::to_string),
                request_id,
                message: error.to_string(),
            })
    }
}

struct HeaderConfig {
    headers: HeaderMap,
    request_id_header: HeaderName,
}

async fn build_status_error(
    model: Option<&str>,
    status_code: u16,
    request_id: Option<String>,
    response: Response,
) -> ProviderError {
    let message = match response.text().await {
        Ok(body) if !body.trim().is_empty() => body,
        Ok(_) => format!("http status {status_code}"),
        Err(error) => {
            format!("http status {status_code}; failed to read response body: {error}")
        }
    };

    ProviderError::Status {
        model: model.map(str::to_string),
        status_code,
        request_id,
        message,
    }
}

fn build_header_config(
    model: Option<&str>,
    ctx: &AdapterContext,
) -> Result<HeaderConfig, ProviderError> {
    let request_id_header = match ctx.metadata.get(REQUEST_ID_HEADER_KEY) {
        Some(value) => parse_header_name(value, model)?,
        None => HeaderName::from_static(DEFAULT_REQUEST_ID_HEADER),
    };

    let mut headers = HeaderMap::new();
    if let Some(token) = ctx.metadata.get(AUTH_BEARER_TOKEN_KEY) {
        headers.insert(AUTHORIZATION, bearer_header(token, model)?);
    }

    for (key, value) in &ctx.metadata {
        if let Some(raw_name) = key.strip_prefix(CUSTOM_HEADER_PREFIX) {
            let header_name = parse_header_name(raw_name, model)?;
            let header_value =
                HeaderValue::from_str(value).map_err(|error| ProviderError::Protocol {
                    model: model.map(str::to_string),
                    request_id: None,
                    message: format!("invalid header value for {raw_name}: {error}"),
                })?;
            headers.insert(header_name, header_value);
        }
    }

    Ok(HeaderConfig {
        headers,
        request_id_header,
    })
}

/// Builds an `Authorization: Bearer` header value, rejecting tokens that are not valid header text.
pub(crate) fn bearer_header(token: &str, model: Option<&str>) -> Result<HeaderValue, ProviderError> {
    let mut value =
        HeaderValue::from_str(&format!("Bearer {token}")).map_err(|error| {
            ProviderError::Protocol {
                model: model.map(str::to_string),
                request_id: None,
                message: format!("invalid bearer token header value: {error}"),
            }
        })?;
    value.set_sensitive(true);
    Ok(value)
}

fn parse_header_name(value: &str, model: Option<&str>) -> Result<HeaderName, ProviderError> {
    HeaderName::from_bytes(value.as_bytes()).map_err(|error| ProviderError::Protocol {
        model: model.map(str::to_string),
        request_id: None,
        message: format!("invalid header name: {value}: {error}"),
    })
}

/// Request id of a response, read from the header named in `ctx` or the
/// default `x-global-transaction-id`.
pub(crate) fn response_request_id(headers: &HeaderMap, ctx: &AdapterContext) -> Option<String> {
    let request_id_header = ctx
        .metadata
        .get(REQUEST_ID_HEADER_KEY)
        .and_then(|value| HeaderName::from_bytes(value.as_bytes()).ok())
        .unwrap_or(HeaderName::from_static(DEFAULT_REQUEST_ID_HEADER));
    extract_request_id(headers, &request_id_header)
}

fn extract_request_id(headers: &HeaderMap, request_id_header: &HeaderName) -> Option<String> {
    headers
        .get(request_id_header)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

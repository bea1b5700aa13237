use crate::core::error::ProviderError;
use crate::core::types::{ChatRequest, ChatResponse};

/// Internal provider-layer translation contract.
///
/// `ProviderAdapter` remains the host-facing extension point (auth, transport,
/// capability declaration, and discovery). This contract is crate-private and
/// used by provider modules to turn canonical requests into provider payloads
/// and provider payloads back into canonical responses.
pub(crate) trait ProviderTranslator {
    /// Provider protocol payload used for outbound request encoding.
    type RequestPayload;

    /// Provider protocol payload used for inbound response decoding.
    type ResponsePayload;

    /// Encodes canonical request semantics into a provider protocol payload.
    fn encode_request(&self, req: &ChatRequest) -> Result<Self::RequestPayload, ProviderError>;

    /// Decodes a provider protocol payload into canonical response semantics.
    fn decode_response(
        &self,
        payload: &Self::ResponsePayload,
    ) -> Result<ChatResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::ProviderTranslator;
    use crate::core::error::ProviderError;
    use crate::core::types::{ChatMessage, ChatRequest, ChatResponse, FinishReason, Usage};

    struct MockTranslator;

    impl ProviderTranslator for MockTranslator {
        type RequestPayload = Value;
        type ResponsePayload = Value;

        fn encode_request(
            &self,
            req: &ChatRequest,
        ) -> Result<Self::RequestPayload, ProviderError> {
            Ok(json!({
                "model": req.model,
                "message_count": req.messages.len(),
            }))
        }

        fn decode_response(
            &self,
            payload: &Self::ResponsePayload,
        ) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                id: None,
                model: "mock-model".to_string(),
                content: payload
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or("ok")
                    .to_string(),
                usage: Usage::default(),
                finish_reason: FinishReason::Stop,
                raw_provider_response: None,
            })
        }
    }

    #[test]
    fn test_provider_translator_trait_shape_encode_decode() {
        let translator = MockTranslator;
        let request = ChatRequest {
            model: "ibm/granite-3-8b-instruct".to_string(),
            messages: vec![ChatMessage::user("hello")],
            temperature: None,
            top_p: None,
            max_tokens: None,
            stop: Vec::new(),
        };

        let encoded = translator
            .encode_request(&request)
            .expect("encode should succeed");
        assert_eq!(
            encoded.get("model"),
            Some(&json!("ibm/granite-3-8b-instruct"))
        );
        assert_eq!(encoded.get("message_count"), Some(&json!(1)));

        let decoded = translator
            .decode_response(&json!({ "text": "done" }))
            .expect("decode should succeed");
        assert_eq!(decoded.model, "mock-model");
        assert_eq!(decoded.content, "done");
    }
}

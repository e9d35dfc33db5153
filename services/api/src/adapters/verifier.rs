//! services/api/src/adapters/verifier.rs
//!
//! This module contains the adapter for the proof-verification LLM.
//! It implements the `VerificationService` port from the core crate.

const SYSTEM_INSTRUCTIONS: &str = "You are a commitment verification assistant. Analyze the provided image and text to determine if it constitutes valid proof of the commitment. Respond ONLY with a JSON object containing 'isValid' (boolean), 'explanation' (string), and 'confidence' (string: 'high', 'medium', or 'low'). Be supportive and practical in verification, accepting reasonable proof like gym photos for workouts or timer screenshots for time-based tasks.";

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageUrlArgs,
    },
    Client,
};
use async_trait::async_trait;
use commitment_core::domain::{Confidence, ProofAnalysis};
use commitment_core::ports::{PortError, PortResult, VerificationService};
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

/// The reply shape the model is instructed to produce.
#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(rename = "isValid", default)]
    is_valid: bool,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    confidence: Option<String>,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `VerificationService` using an OpenAI-compatible
/// vision model.
#[derive(Clone)]
pub struct OpenAiVerifierAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiVerifierAdapter {
    /// Creates a new `OpenAiVerifierAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    /// Pulls the first JSON object out of a reply that may wrap it in prose
    /// or code fences.
    fn extract_json(content: &str) -> &str {
        let json_regex = Regex::new(r"\{[\s\S]*\}").unwrap();
        match json_regex.find(content) {
            Some(found) => found.as_str(),
            None => content,
        }
    }

    /// Clamps a parsed reply into a well-formed verdict.
    fn sanitize(raw: RawAnalysis) -> ProofAnalysis {
        ProofAnalysis {
            is_valid: raw.is_valid,
            explanation: raw
                .explanation
                .filter(|explanation| !explanation.is_empty())
                .unwrap_or_else(|| "No explanation provided".to_string()),
            confidence: raw
                .confidence
                .as_deref()
                .and_then(Confidence::parse)
                .unwrap_or(Confidence::Medium),
        }
    }
}

//=========================================================================================
// `VerificationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl VerificationService for OpenAiVerifierAdapter {
    /// Judges whether the image (and the text extracted from it) shows the
    /// commitment being honored. A reply that cannot be parsed degrades to
    /// the invalid/low-confidence fallback instead of failing the caller.
    async fn verify(
        &self,
        goal: &str,
        extracted_text: &str,
        image_url: &str,
    ) -> PortResult<ProofAnalysis> {
        let prompt = format!(
            "Please verify this commitment: \"{goal}\"\n\nExtracted text from image: \"{extracted_text}\"\n\nAnalyze the image and determine if it shows reasonable proof of the commitment being completed."
        );

        let text_part = ChatCompletionRequestMessageContentPartTextArgs::default()
            .text(prompt)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let image_part = ChatCompletionRequestMessageContentPartImageArgs::default()
            .image_url(
                ImageUrlArgs::default()
                    .url(image_url)
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
            )
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let parts: Vec<ChatCompletionRequestUserMessageContentPart> =
            vec![text_part.into(), image_part.into()];

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(parts)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.1)
            .max_tokens(500u32)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        match serde_json::from_str::<RawAnalysis>(Self::extract_json(content.trim())) {
            Ok(raw) => Ok(Self::sanitize(raw)),
            Err(err) => {
                warn!(
                    error = %err,
                    raw = %content,
                    "verification reply was not valid JSON; using fallback verdict"
                );
                Ok(ProofAnalysis::fallback())
            }
        }
    }
}

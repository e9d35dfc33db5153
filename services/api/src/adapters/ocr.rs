//! services/api/src/adapters/ocr.rs
//!
//! This module contains the adapter for image text extraction.
//! It implements the `OcrService` port from the core crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs,
        ImageUrlArgs,
    },
    Client,
};
use async_trait::async_trait;
use commitment_core::ports::OcrService;
use tracing::warn;

const EXTRACTION_PROMPT: &str = "Transcribe all text visible in this image. Respond with the raw text only, preserving line breaks. If the image contains no readable text, respond with an empty message.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `OcrService` port using an
/// OpenAI-compatible vision model.
#[derive(Clone)]
pub struct OpenAiOcrAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiOcrAdapter {
    /// Creates a new `OpenAiOcrAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    async fn try_extract(&self, image_url: &str) -> Result<String, OpenAIError> {
        let text_part = ChatCompletionRequestMessageContentPartTextArgs::default()
            .text(EXTRACTION_PROMPT)
            .build()?;
        let image_part = ChatCompletionRequestMessageContentPartImageArgs::default()
            .image_url(ImageUrlArgs::default().url(image_url).build()?)
            .build()?;
        let parts: Vec<ChatCompletionRequestUserMessageContentPart> =
            vec![text_part.into(), image_part.into()];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![ChatCompletionRequestUserMessageArgs::default()
                .content(parts)
                .build()?
                .into()])
            .temperature(0.0)
            .max_tokens(1000u32)
            .build()?;

        let response = self.client.chat().create(request).await?;
        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

//=========================================================================================
// `OcrService` Trait Implementation
//=========================================================================================

#[async_trait]
impl OcrService for OpenAiOcrAdapter {
    /// Extraction failures yield an empty string; the verification flow
    /// proceeds on the image alone.
    async fn extract_text(&self, image_url: &str) -> String {
        match self.try_extract(image_url).await {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "text extraction failed; continuing with empty text");
                String::new()
            }
        }
    }
}

//! services/api/src/adapters/llm.rs
//!
//! Request and reply plumbing shared by the LLM adapters. Every flow asks the
//! model for a single JSON object and validates it against a typed reply.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessageContentPartAudioArgs,
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageUrlArgs, InputAudio, InputAudioFormat,
        ResponseFormat,
    },
    Client,
};
use regex::Regex;
use serde::de::DeserializeOwned;
use study_companion_core::{
    media::DataUri,
    ports::{PortError, PortResult},
};
use tracing::debug;

/// Builds an OpenAI-compatible client, optionally pointed at another provider.
pub fn build_client(api_key: &str, base_url: Option<&str>) -> Client<OpenAIConfig> {
    let mut config = OpenAIConfig::new().with_api_key(api_key);
    if let Some(base_url) = base_url {
        config = config.with_api_base(base_url);
    }
    Client::with_config(config)
}

pub(crate) fn text_part(text: impl Into<String>) -> PortResult<ChatCompletionRequestUserMessageContentPart> {
    Ok(ChatCompletionRequestMessageContentPartTextArgs::default()
        .text(text.into())
        .build()
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .into())
}

pub(crate) fn image_part(data_uri: &str) -> PortResult<ChatCompletionRequestUserMessageContentPart> {
    // Validate before shipping the frame so a broken capture fails locally.
    let parsed = DataUri::parse(data_uri)?;
    if !parsed.mime_type().starts_with("image/") {
        return Err(PortError::InvalidInput(format!(
            "expected an image data URI, got '{}'",
            parsed.mime_type()
        )));
    }

    let image_url = ImageUrlArgs::default()
        .url(data_uri)
        .build()
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
    Ok(ChatCompletionRequestMessageContentPartImageArgs::default()
        .image_url(image_url)
        .build()
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .into())
}

pub(crate) fn audio_part(data_uri: &str) -> PortResult<ChatCompletionRequestUserMessageContentPart> {
    let parsed = DataUri::parse(data_uri)?;
    let format = match parsed.mime_type() {
        "audio/wav" | "audio/x-wav" | "audio/wave" => InputAudioFormat::Wav,
        "audio/mpeg" | "audio/mp3" => InputAudioFormat::Mp3,
        other => {
            return Err(PortError::InvalidInput(format!(
                "unsupported audio format '{}'",
                other
            )))
        }
    };

    Ok(ChatCompletionRequestMessageContentPartAudioArgs::default()
        .input_audio(InputAudio {
            data: parsed.base64_payload(),
            format,
        })
        .build()
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .into())
}

/// Sends one system prompt plus user parts and decodes the JSON reply into `T`.
pub(crate) async fn complete_json<T: DeserializeOwned>(
    client: &Client<OpenAIConfig>,
    model: &str,
    system_prompt: &str,
    parts: Vec<ChatCompletionRequestUserMessageContentPart>,
) -> PortResult<T> {
    let messages = vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
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
        .model(model)
        .messages(messages)
        .response_format(ResponseFormat::JsonObject)
        .n(1)
        .build()
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

    // Call the API and manually map the error, which respects the orphan rule.
    let response = client
        .chat()
        .create(request)
        .await
        .map_err(|e: OpenAIError| PortError::RemoteCallFailed(e.to_string()))?;

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| {
            PortError::RemoteCallFailed("model response contained no text content".to_string())
        })?;

    debug!("Raw model reply: {}", content);
    parse_structured_reply(&content)
}

/// Decodes a model reply, tolerating a surrounding markdown code fence.
pub(crate) fn parse_structured_reply<T: DeserializeOwned>(raw: &str) -> PortResult<T> {
    let fence = Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$")
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
    let body = fence
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map_or(raw.trim(), |m| m.as_str());

    serde_json::from_str(body).map_err(|e| {
        PortError::RemoteCallFailed(format!("model reply did not match the expected schema: {}", e))
    })
}

pub mod google_speech;
pub mod google_translate;
pub mod google_tts;

pub use google_speech::GoogleSpeechRecognizer;
pub use google_translate::GoogleTranslator;
pub use google_tts::GoogleSynthesizer;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info};
use winechat_config::{PipelineSettings, ProviderSettings};

use self::google_speech::{GoogleSpeechClient, WindowSettings};

/// 16-bit signed mono PCM samples at the configured sample rate.
pub type AudioChunk = Vec<i16>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
    #[error("Provider request failed: {0}")]
    Request(String),
    #[error("Provider returned an invalid response: {0}")]
    Response(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Response(err.to_string())
        } else {
            ProviderError::Request(err.to_string())
        }
    }
}

/// Configuration for one streaming recognition session.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Normalized language code of the speaker (e.g. "ja").
    pub language: String,
    pub sample_rate: u32,
}

/// A streaming recognition result (interim or final).
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionUpdate {
    pub text: String,
    pub is_final: bool,
}

pub type RecognitionStream = (
    mpsc::Sender<AudioChunk>,
    mpsc::Receiver<Result<RecognitionUpdate, ProviderError>>,
);

/// Streaming speech-to-text.
///
/// Audio goes in through the returned sender in arrival order; interim and
/// final results come out of the receiver. Dropping the sender ends the
/// stream. A stream that fails yields one `Err` and then closes.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync + 'static {
    async fn start_stream(&self, config: StreamConfig) -> Result<RecognitionStream, ProviderError>;

    fn name(&self) -> &str;
}

/// Text-to-text machine translation.
#[async_trait]
pub trait TextTranslator: Send + Sync + 'static {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, ProviderError>;

    /// Best guess at the language of `text`, as the provider's code.
    async fn detect_language(&self, text: &str) -> Result<String, ProviderError>;

    fn name(&self) -> &str;
}

/// Text-to-speech. Returns encoded audio (MP3 for the hosted backend).
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync + 'static {
    async fn synthesize(&self, text: &str, voice_id: &str, speed: f32) -> Result<Vec<u8>, ProviderError>;

    fn name(&self) -> &str;
}

/// Turns a non-2xx response into `ProviderError::Request`, keeping a short
/// excerpt of the error body.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(200).collect();
    Err(ProviderError::Request(format!("HTTP {status}: {excerpt}")))
}

/// The hosted backends available to this process. A capability without
/// credentials is `None`; the rest of the server keeps working.
#[derive(Clone, Default)]
pub struct ProviderSet {
    pub recognizer: Option<Arc<dyn SpeechRecognizer>>,
    pub translator: Option<Arc<dyn TextTranslator>>,
    pub synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
}

impl ProviderSet {
    /// Builds the Google REST backends for every capability that has a key.
    pub fn from_settings(providers: &ProviderSettings, pipeline: &PipelineSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client for providers")?;

        let recognizer = providers.speech_key().map(|key| {
            let backend = GoogleSpeechClient::new(client.clone(), &providers.speech_base_url, key);
            Arc::new(GoogleSpeechRecognizer::new(backend, WindowSettings::from(pipeline)))
                as Arc<dyn SpeechRecognizer>
        });
        let translator = providers.translate_key().map(|key| {
            Arc::new(GoogleTranslator::new(client.clone(), &providers.translate_base_url, key))
                as Arc<dyn TextTranslator>
        });
        let synthesizer = providers.tts_key().map(|key| {
            Arc::new(GoogleSynthesizer::new(client.clone(), &providers.tts_base_url, key))
                as Arc<dyn SpeechSynthesizer>
        });

        let set = Self {
            recognizer,
            translator,
            synthesizer,
        };
        set.log_capabilities();
        Ok(set)
    }

    fn log_capabilities(&self) {
        if self.recognizer.is_none() {
            error!("Speech recognition key missing; server-side recognition disabled");
        }
        if self.translator.is_none() {
            error!("Translation key missing; translation unavailable");
        }
        if self.synthesizer.is_none() {
            error!("Text-to-speech key missing; voice translation falls back to text");
        }
        info!(
            recognition = self.recognizer.is_some(),
            translation = self.translator.is_some(),
            synthesis = self.synthesizer.is_some(),
            "Providers configured"
        );
    }
}

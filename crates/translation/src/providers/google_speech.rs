use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use winechat_config::PipelineSettings;

use super::{
    AudioChunk, ProviderError, RecognitionStream, RecognitionUpdate, SpeechRecognizer, StreamConfig,
};
use crate::{audio, language};
use crate::task::AbortOnDrop;

/// Minimum buffered audio before an interim result is attempted.
const MIN_PARTIAL_AUDIO: Duration = Duration::from_millis(500);

/// One-shot recognition of a complete buffer of PCM audio.
#[async_trait]
pub trait UtteranceRecognizer: Send + Sync + 'static {
    async fn recognize(
        &self,
        pcm: &[i16],
        language: &str,
        sample_rate: u32,
    ) -> Result<String, ProviderError>;

    fn name(&self) -> &str;
}

/// Utterance segmentation parameters.
#[derive(Debug, Clone)]
pub struct WindowSettings {
    pub audio_buffer: usize,
    pub partial_interval: Duration,
    pub utterance_gap: Duration,
    pub silence: Duration,
    pub silence_rms_threshold: f32,
    pub max_utterance: Duration,
}

impl From<&PipelineSettings> for WindowSettings {
    fn from(p: &PipelineSettings) -> Self {
        Self {
            audio_buffer: p.audio_buffer.max(1),
            partial_interval: Duration::from_millis(p.partial_interval_ms),
            utterance_gap: Duration::from_millis(p.utterance_gap_ms),
            silence: Duration::from_millis(p.silence_ms),
            silence_rms_threshold: p.silence_rms_threshold,
            max_utterance: Duration::from_secs_f64(p.max_utterance_secs.max(1.0)),
        }
    }
}

/// Adapts a one-shot recognizer into a streaming one.
///
/// Incoming chunks accumulate into an utterance. While it grows, the buffer is
/// re-recognized every `partial_interval` to produce interim results; the
/// utterance is finalized on an audio gap, trailing silence, the length
/// limit, or end of input.
pub struct WindowedRecognizer<R> {
    backend: Arc<R>,
    settings: WindowSettings,
}

impl<R: UtteranceRecognizer> WindowedRecognizer<R> {
    pub fn new(backend: R, settings: WindowSettings) -> Self {
        Self {
            backend: Arc::new(backend),
            settings,
        }
    }
}

/// Streaming recognizer backed by Google Speech-to-Text.
pub type GoogleSpeechRecognizer = WindowedRecognizer<GoogleSpeechClient>;

#[async_trait]
impl<R: UtteranceRecognizer> SpeechRecognizer for WindowedRecognizer<R> {
    async fn start_stream(&self, config: StreamConfig) -> Result<RecognitionStream, ProviderError> {
        let (audio_tx, audio_rx) = mpsc::channel(self.settings.audio_buffer);
        let (results_tx, results_rx) = mpsc::channel(32);

        let worker = UtteranceWorker {
            backend: self.backend.clone(),
            settings: self.settings.clone(),
            config,
        };
        tokio::spawn(worker.run(audio_rx, results_tx));

        Ok((audio_tx, results_rx))
    }

    fn name(&self) -> &str {
        self.backend.name()
    }
}

struct Utterance {
    audio: Vec<i16>,
    is_final: bool,
}

struct UtteranceWorker<R> {
    backend: Arc<R>,
    settings: WindowSettings,
    config: StreamConfig,
}

enum Input {
    Chunk(AudioChunk),
    Gap,
    Closed,
}

impl<R: UtteranceRecognizer> UtteranceWorker<R> {
    /// Runs until the audio sender is dropped or recognition fails.
    ///
    /// Segmentation and recognition run as separate tasks so a slow request
    /// never stalls audio ingestion.
    async fn run(
        self,
        audio_rx: mpsc::Receiver<AudioChunk>,
        results_tx: mpsc::Sender<Result<RecognitionUpdate, ProviderError>>,
    ) {
        info!(
            language = %self.config.language,
            backend = %self.backend.name(),
            "Recognition stream started"
        );

        let (utterance_tx, utterance_rx) = mpsc::channel::<Utterance>(8);
        let segmenter = tokio::spawn(Self::segment_loop(
            audio_rx,
            utterance_tx,
            self.settings.clone(),
            self.config.sample_rate,
        ));
        let _segmenter_guard = AbortOnDrop(segmenter);

        Self::recognize_loop(utterance_rx, results_tx, self.backend, self.config).await;

        debug!("Recognition stream stopped");
    }

    async fn segment_loop(
        mut audio_rx: mpsc::Receiver<AudioChunk>,
        utterance_tx: mpsc::Sender<Utterance>,
        settings: WindowSettings,
        sample_rate: u32,
    ) {
        let samples_for = |d: Duration| (d.as_secs_f64() * sample_rate as f64) as usize;
        let silence_samples = samples_for(settings.silence).max(1);
        let min_partial_samples = samples_for(MIN_PARTIAL_AUDIO).max(1);
        let max_samples = samples_for(settings.max_utterance).max(min_partial_samples);

        let mut buffer: Vec<i16> = Vec::new();
        let mut trailing_silence = 0usize;
        let mut last_partial_at = Instant::now();

        loop {
            let input = if buffer.is_empty() {
                match audio_rx.recv().await {
                    Some(chunk) => Input::Chunk(chunk),
                    None => Input::Closed,
                }
            } else {
                match tokio::time::timeout(settings.utterance_gap, audio_rx.recv()).await {
                    Ok(Some(chunk)) => Input::Chunk(chunk),
                    Ok(None) => Input::Closed,
                    Err(_) => Input::Gap,
                }
            };

            let finalize = match input {
                Input::Chunk(chunk) => {
                    let silent = audio::rms(&chunk) < settings.silence_rms_threshold;
                    if buffer.is_empty() {
                        if silent {
                            continue;
                        }
                        last_partial_at = Instant::now();
                    }
                    trailing_silence = if silent { trailing_silence + chunk.len() } else { 0 };
                    buffer.extend_from_slice(&chunk);
                    trailing_silence >= silence_samples || buffer.len() >= max_samples
                }
                Input::Gap => true,
                Input::Closed => {
                    if !buffer.is_empty() {
                        let audio = std::mem::take(&mut buffer);
                        let _ = utterance_tx.send(Utterance { audio, is_final: true }).await;
                    }
                    break;
                }
            };

            if finalize {
                trailing_silence = 0;
                let audio = std::mem::take(&mut buffer);
                debug!(samples = audio.len(), "Utterance ended, sending FINAL");
                if utterance_tx.send(Utterance { audio, is_final: true }).await.is_err() {
                    return;
                }
            } else if buffer.len() >= min_partial_samples
                && last_partial_at.elapsed() >= settings.partial_interval
            {
                last_partial_at = Instant::now();
                // Interim results are superseded by later ones; skip if busy.
                let _ = utterance_tx.try_send(Utterance {
                    audio: buffer.clone(),
                    is_final: false,
                });
            }
        }

        debug!("Audio channel closed, segmenter exiting");
    }

    async fn recognize_loop(
        mut utterance_rx: mpsc::Receiver<Utterance>,
        results_tx: mpsc::Sender<Result<RecognitionUpdate, ProviderError>>,
        backend: Arc<R>,
        config: StreamConfig,
    ) {
        while let Some(utterance) = utterance_rx.recv().await {
            match backend
                .recognize(&utterance.audio, &config.language, config.sample_rate)
                .await
            {
                Ok(text) => {
                    let text = text.trim().to_string();
                    if text.is_empty() || is_placeholder(&text) {
                        debug!(is_final = utterance.is_final, %text, "Empty/placeholder recognition result, skipping");
                        continue;
                    }
                    let update = RecognitionUpdate {
                        text,
                        is_final: utterance.is_final,
                    };
                    if results_tx.send(Ok(update)).await.is_err() {
                        return;
                    }
                }
                Err(e) if !utterance.is_final => {
                    debug!(%e, "Interim recognition failed, waiting for final");
                }
                Err(e) => {
                    warn!(%e, "Recognition failed, closing stream");
                    let _ = results_tx.send(Err(e)).await;
                    return;
                }
            }
        }
    }
}

/// Bracketed non-speech markers some recognizers emit for noise.
fn is_placeholder(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("[blank_audio]")
        || lower.contains("[silence]")
        || lower.contains("[music]")
        || lower.contains("[noise]")
}

#[derive(Serialize)]
struct RecognizeRequest<'a> {
    config: RecognitionConfig<'a>,
    audio: RecognitionAudio,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig<'a> {
    encoding: &'static str,
    sample_rate_hertz: u32,
    language_code: &'a str,
    enable_automatic_punctuation: bool,
    model: &'static str,
}

#[derive(Serialize)]
struct RecognitionAudio {
    content: String,
}

#[derive(Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

#[derive(Deserialize)]
struct RecognitionResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
}

/// Google Speech-to-Text v1 `speech:recognize` (API key auth, LINEAR16).
pub struct GoogleSpeechClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleSpeechClient {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl UtteranceRecognizer for GoogleSpeechClient {
    async fn recognize(
        &self,
        pcm: &[i16],
        language: &str,
        sample_rate: u32,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/v1/speech:recognize", self.base_url);
        let request = RecognizeRequest {
            config: RecognitionConfig {
                encoding: "LINEAR16",
                sample_rate_hertz: sample_rate,
                language_code: language::locale(language),
                enable_automatic_punctuation: true,
                model: "latest_long",
            },
            audio: RecognitionAudio {
                content: BASE64.encode(audio::encode_s16le(pcm)),
            },
        };

        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;
        let resp = super::check_status(resp).await?;
        let body: RecognizeResponse = resp.json().await?;

        let text = body
            .results
            .iter()
            .filter_map(|r| r.alternatives.first())
            .map(|a| a.transcript.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(text)
    }

    fn name(&self) -> &str {
        "google_speech"
    }
}

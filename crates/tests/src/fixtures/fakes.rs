//! Provider stand-ins for end-to-end runs. Each records what it was asked.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use winechat_translation::providers::{AudioChunk, RecognitionStream, RecognitionUpdate, StreamConfig};
use winechat_translation::{ProviderError, SpeechRecognizer, SpeechSynthesizer, TextTranslator};

/// Produces `"<text> (<source>-><target>)"`.
#[derive(Default)]
pub struct EchoTranslator {
    pub requests: Mutex<Vec<String>>,
}

impl EchoTranslator {
    pub fn targets(&self) -> Vec<String> {
        let mut targets = self.requests.lock().clone();
        targets.sort();
        targets
    }
}

#[async_trait]
impl TextTranslator for EchoTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, ProviderError> {
        self.requests.lock().push(target.to_string());
        Ok(format!("{text} ({source}->{target})"))
    }

    /// "ja" for anything outside ASCII, "en" otherwise.
    async fn detect_language(&self, text: &str) -> Result<String, ProviderError> {
        let language = if text.is_ascii() { "en" } else { "ja" };
        Ok(language.to_string())
    }

    fn name(&self) -> &str {
        "echo_translator"
    }
}

/// Returns `"<voice>@<speed>"` as the audio bytes.
#[derive(Default)]
pub struct TaggingSynthesizer {
    pub voices: Mutex<Vec<String>>,
}

#[async_trait]
impl SpeechSynthesizer for TaggingSynthesizer {
    async fn synthesize(&self, _text: &str, voice_id: &str, speed: f32) -> Result<Vec<u8>, ProviderError> {
        self.voices.lock().push(voice_id.to_string());
        Ok(format!("{voice_id}@{speed}").into_bytes())
    }

    fn name(&self) -> &str {
        "tagging_synthesizer"
    }
}

/// Finalizes every audio chunk as `"heard <n> samples"`.
#[derive(Default)]
pub struct CountingRecognizer {
    pub languages: Mutex<Vec<String>>,
}

#[async_trait]
impl SpeechRecognizer for CountingRecognizer {
    async fn start_stream(&self, config: StreamConfig) -> Result<RecognitionStream, ProviderError> {
        self.languages.lock().push(config.language);
        let (audio_tx, mut audio_rx) = mpsc::channel::<AudioChunk>(8);
        let (results_tx, results_rx) = mpsc::channel(8);
        tokio::spawn(async move {
            while let Some(chunk) = audio_rx.recv().await {
                let update = RecognitionUpdate {
                    text: format!("heard {} samples", chunk.len()),
                    is_final: true,
                };
                if results_tx.send(Ok(update)).await.is_err() {
                    break;
                }
            }
        });
        Ok((audio_tx, results_rx))
    }

    fn name(&self) -> &str {
        "counting_recognizer"
    }
}

//! Deterministic provider fakes that record every call.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use winechat_config::PipelineSettings;
use winechat_translation::providers::{
    AudioChunk, RecognitionStream, RecognitionUpdate, StreamConfig,
};
use winechat_translation::{
    ConnectionManager, FanoutEngine, InMemorySettingsStore, ProviderError, RecognitionCoordinator,
    RoomChannel, ServerEvent, SessionRegistry, SpeechRecognizer, SpeechSynthesizer, TextTranslator,
};

/// Translates to "[target] text". Targets listed in `fail` return an error.
#[derive(Default)]
pub struct FakeTranslator {
    pub calls: Mutex<Vec<(String, String, String)>>,
    pub fail: Mutex<Vec<String>>,
    pub delay: Option<Duration>,
}

impl FakeTranslator {
    pub fn failing_for(targets: &[&str]) -> Self {
        Self {
            fail: Mutex::new(targets.iter().map(|t| t.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn sorted_calls(&self) -> Vec<(String, String, String)> {
        let mut calls = self.calls.lock().clone();
        calls.sort();
        calls
    }
}

#[async_trait]
impl TextTranslator for FakeTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, ProviderError> {
        self.calls
            .lock()
            .push((text.to_string(), source.to_string(), target.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.lock().iter().any(|t| t == target) {
            return Err(ProviderError::Request(format!("cannot translate to {target}")));
        }
        Ok(format!("[{target}] {text}"))
    }

    async fn detect_language(&self, _text: &str) -> Result<String, ProviderError> {
        Ok("ja".to_string())
    }

    fn name(&self) -> &str {
        "fake_translator"
    }
}

/// Returns the voice id bytes as "audio".
#[derive(Default)]
pub struct FakeSynthesizer {
    pub calls: Mutex<Vec<(String, String, f32)>>,
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str, speed: f32) -> Result<Vec<u8>, ProviderError> {
        self.calls
            .lock()
            .push((text.to_string(), voice_id.to_string(), speed));
        Ok(voice_id.as_bytes().to_vec())
    }

    fn name(&self) -> &str {
        "fake_synthesizer"
    }
}

/// Emits one final transcript per chunk: the number of samples.
#[derive(Default)]
pub struct FakeRecognizer {
    pub starts: Mutex<Vec<String>>,
    pub chunks: Arc<Mutex<usize>>,
}

#[async_trait]
impl SpeechRecognizer for FakeRecognizer {
    async fn start_stream(&self, config: StreamConfig) -> Result<RecognitionStream, ProviderError> {
        self.starts.lock().push(config.language);
        let (audio_tx, mut audio_rx) = mpsc::channel::<AudioChunk>(8);
        let (results_tx, results_rx) = mpsc::channel(8);
        let chunks = self.chunks.clone();
        tokio::spawn(async move {
            while let Some(chunk) = audio_rx.recv().await {
                *chunks.lock() += 1;
                let update = RecognitionUpdate {
                    text: format!("samples {}", chunk.len()),
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
        "fake_recognizer"
    }
}

pub struct Pipeline {
    pub manager: ConnectionManager,
    pub fanout: Arc<FanoutEngine>,
    pub translator: Arc<FakeTranslator>,
    pub synthesizer: Arc<FakeSynthesizer>,
    pub recognizer: Arc<FakeRecognizer>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_translator(FakeTranslator::default())
    }

    pub fn with_translator(translator: FakeTranslator) -> Self {
        let translator = Arc::new(translator);
        let synthesizer = Arc::new(FakeSynthesizer::default());
        let recognizer = Arc::new(FakeRecognizer::default());

        let registry = Arc::new(SessionRegistry::new());
        let channel = Arc::new(RoomChannel::new());
        let coordinator = RecognitionCoordinator::new(Some(recognizer.clone()), 16000, 16);
        let fanout = Arc::new(FanoutEngine::new(
            registry.clone(),
            channel.clone(),
            translator.clone(),
            Some(synthesizer.clone()),
        ));
        let manager = ConnectionManager::new(
            registry,
            channel,
            coordinator,
            Some(fanout.clone()),
            Arc::new(InMemorySettingsStore::new()),
            &PipelineSettings::default(),
        );

        Self {
            manager,
            fanout,
            translator,
            synthesizer,
            recognizer,
        }
    }
}

/// Collects outbound events of one connection.
pub struct Inbox {
    pub rx: mpsc::Receiver<Arc<ServerEvent>>,
}

impl Inbox {
    /// Next event whose `type` is not one of the connection preamble types.
    pub async fn next(&mut self) -> serde_json::Value {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), self.rx.recv())
                .await
                .expect("timed out waiting for event")
                .expect("outbound channel closed");
            let json = serde_json::to_value(&*event).expect("serializable event");
            if json["type"] != "connected" {
                return json;
            }
        }
    }

    /// Asserts nothing but the preamble arrives within `wait`.
    pub async fn assert_quiet(&mut self, wait: Duration) {
        tokio::time::sleep(wait).await;
        while let Ok(event) = self.rx.try_recv() {
            let json = serde_json::to_value(&*event).unwrap();
            assert_eq!(json["type"], "connected", "unexpected event {json}");
        }
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::providers::{AudioChunk, ProviderError, RecognitionUpdate, SpeechRecognizer, StreamConfig};
use crate::task::AbortOnDrop;
use crate::{TranscriptEvent, UserId};

#[derive(Debug, Clone, thiserror::Error)]
pub enum RecognitionError {
    #[error("User {0} already has an active recognition stream")]
    AlreadyStreaming(UserId),
    #[error("Speech recognition is not configured")]
    Unavailable,
    #[error("Session of user {0} ended while its stream was opening")]
    SessionEnded(UserId),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// What a session's sink receives, in stream order.
#[derive(Debug, Clone)]
pub enum RecognitionEvent {
    Transcript(TranscriptEvent),
    /// The backend failed; the stream is gone but the session is not.
    Error { user_id: UserId, message: String },
}

struct Sink {
    tx: mpsc::Sender<RecognitionEvent>,
    /// Distinguishes a reconnect's sink from the one it replaced.
    epoch: u64,
}

struct StreamHandle {
    audio_tx: mpsc::Sender<AudioChunk>,
    /// Flipped (or dropped) on stop so pending pushes give up immediately.
    stop_tx: watch::Sender<bool>,
    _pump: AbortOnDrop,
    generation: u64,
}

/// Owns at most one live recognition stream per user and routes its results
/// to that user's registered sink.
pub struct RecognitionCoordinator {
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    sample_rate: u32,
    transcript_buffer: usize,
    streams: DashMap<UserId, StreamHandle>,
    sinks: DashMap<UserId, Sink>,
    generation: AtomicU64,
}

impl RecognitionCoordinator {
    pub fn new(
        recognizer: Option<Arc<dyn SpeechRecognizer>>,
        sample_rate: u32,
        transcript_buffer: usize,
    ) -> Arc<Self> {
        match &recognizer {
            Some(r) => info!(backend = %r.name(), sample_rate, "Recognition coordinator created"),
            None => warn!("Recognition coordinator created without a speech recognizer"),
        }
        Arc::new(Self {
            recognizer,
            sample_rate,
            transcript_buffer: transcript_buffer.max(1),
            streams: DashMap::new(),
            sinks: DashMap::new(),
            generation: AtomicU64::new(0),
        })
    }

    pub fn is_available(&self) -> bool {
        self.recognizer.is_some()
    }

    /// Capacity a caller should give the sink channel it registers.
    pub fn transcript_buffer(&self) -> usize {
        self.transcript_buffer
    }

    /// Registers the sink for a user's transcript events, replacing any
    /// previous one.
    pub fn on_transcript(&self, user_id: UserId, sink: mpsc::Sender<RecognitionEvent>) {
        let epoch = self.generation.fetch_add(1, Ordering::Relaxed);
        self.sinks.insert(user_id, Sink { tx: sink, epoch });
    }

    /// Drops the user's sink. A `start_stream` still waiting on the provider
    /// for this user will then discard the stream it gets.
    pub fn remove_sink(&self, user_id: &UserId) {
        self.sinks.remove(user_id);
    }

    pub fn is_streaming(&self, user_id: &UserId) -> bool {
        self.streams.contains_key(user_id)
    }

    pub fn active_streams(&self) -> usize {
        self.streams.len()
    }

    fn sink_epoch(&self, user_id: &UserId) -> Option<u64> {
        self.sinks.get(user_id).map(|s| s.epoch)
    }

    /// Opens a recognition stream for `user_id` in `language`.
    ///
    /// The stream is only kept if the user's sink is unchanged once the
    /// provider answers; a session torn down meanwhile gets `SessionEnded`.
    pub async fn start_stream(self: &Arc<Self>, user_id: &UserId, language: &str) -> Result<(), RecognitionError> {
        let recognizer = self.recognizer.clone().ok_or(RecognitionError::Unavailable)?;
        if self.streams.contains_key(user_id) {
            return Err(RecognitionError::AlreadyStreaming(user_id.clone()));
        }
        let epoch = self.sink_epoch(user_id);

        let (audio_tx, results_rx) = recognizer
            .start_stream(StreamConfig {
                language: language.to_string(),
                sample_rate: self.sample_rate,
            })
            .await?;

        // Another start may have won while the provider call was pending.
        let entry = match self.streams.entry(user_id.clone()) {
            Entry::Occupied(_) => return Err(RecognitionError::AlreadyStreaming(user_id.clone())),
            Entry::Vacant(entry) => entry,
        };
        // Checked under the entry lock: `stop_stream` cannot slip in between.
        if self.sink_epoch(user_id) != epoch {
            debug!(%user_id, "Session ended during stream start, closing provider stream");
            return Err(RecognitionError::SessionEnded(user_id.clone()));
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (stop_tx, _) = watch::channel(false);
        let pump = tokio::spawn(Self::pump(
            Arc::downgrade(self),
            user_id.clone(),
            language.to_string(),
            generation,
            results_rx,
        ));
        entry.insert(StreamHandle {
            audio_tx,
            stop_tx,
            _pump: AbortOnDrop(pump),
            generation,
        });

        info!(%user_id, language, backend = %recognizer.name(), "Recognition stream started");
        Ok(())
    }

    /// Forwards one chunk, in call order. Without an active stream the chunk
    /// is dropped.
    pub async fn push_audio(&self, user_id: &UserId, chunk: AudioChunk) {
        let Some((audio_tx, mut stop_rx)) = self
            .streams
            .get(user_id)
            .map(|h| (h.audio_tx.clone(), h.stop_tx.subscribe()))
        else {
            debug!(%user_id, samples = chunk.len(), "No active stream, dropping audio");
            return;
        };

        tokio::select! {
            biased;
            _ = stop_rx.wait_for(|stopped| *stopped) => {
                debug!(%user_id, "Stream stopped during push, dropping audio");
            }
            res = audio_tx.send(chunk) => {
                if res.is_err() {
                    debug!(%user_id, "Recognition stream closed, dropping audio");
                }
            }
        }
    }

    /// Releases the user's stream. Safe to call at any time.
    pub fn stop_stream(&self, user_id: &UserId) {
        if let Some((_, handle)) = self.streams.remove(user_id) {
            handle.stop_tx.send_replace(true);
            info!(%user_id, "Recognition stream stopped");
        }
    }

    /// Feeds an externally produced transcript into the user's sink, behind
    /// anything the stream already delivered.
    pub async fn submit_transcript(&self, event: TranscriptEvent) {
        Self::deliver(&self.sinks, RecognitionEvent::Transcript(event)).await;
    }

    async fn deliver(sinks: &DashMap<UserId, Sink>, event: RecognitionEvent) {
        let (user_id, is_final) = match &event {
            RecognitionEvent::Transcript(t) => (t.speaker_id.clone(), t.is_final),
            RecognitionEvent::Error { user_id, .. } => (user_id.clone(), true),
        };
        let Some(sink) = sinks.get(&user_id).map(|s| s.tx.clone()) else {
            debug!(%user_id, "No transcript sink registered, dropping event");
            return;
        };

        if is_final {
            let _ = sink.send(event).await;
        } else if sink.try_send(event).is_err() {
            // A newer interim supersedes this one.
            debug!(%user_id, "Sink busy, dropping interim transcript");
        }
    }

    async fn pump(
        coordinator: Weak<Self>,
        user_id: UserId,
        language: String,
        generation: u64,
        mut results_rx: mpsc::Receiver<Result<RecognitionUpdate, ProviderError>>,
    ) {
        while let Some(result) = results_rx.recv().await {
            let Some(this) = coordinator.upgrade() else {
                return;
            };
            match result {
                Ok(update) => {
                    let event = TranscriptEvent {
                        speaker_id: user_id.clone(),
                        text: update.text,
                        language: language.clone(),
                        is_final: update.is_final,
                        timestamp: Utc::now(),
                    };
                    Self::deliver(&this.sinks, RecognitionEvent::Transcript(event)).await;
                }
                Err(e) => {
                    warn!(%user_id, error = %e, "Recognition stream failed");
                    Self::deliver(
                        &this.sinks,
                        RecognitionEvent::Error {
                            user_id: user_id.clone(),
                            message: e.to_string(),
                        },
                    )
                    .await;
                    break;
                }
            }
        }

        // The stream ended on its own; make room for a restart. Removing the
        // handle aborts this task, so it must be the last thing done.
        if let Some(this) = coordinator.upgrade() {
            debug!(%user_id, generation, "Recognition stream ended");
            this.streams.remove_if(&user_id, |_, h| h.generation == generation);
        }
    }
}

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use winechat_config::PipelineSettings;

use crate::channel::{ChannelError, OutboundSender, RoomChannel};
use crate::fanout::FanoutEngine;
use crate::protocol::{ParticipantInfo, ServerEvent};
use crate::providers::AudioChunk;
use crate::recognition::{RecognitionCoordinator, RecognitionEvent};
use crate::registry::{RegistryError, Session, SessionHandle, SessionRegistry};
use crate::settings::{SettingsStore, SettingsUpdate, StoreError, UserPreferences};
use crate::{RoomId, TranscriptEvent, UserId, language};

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// Parameters of an incoming connection. Languages left empty fall back to
/// stored preferences, then to the configured default.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub user_id: UserId,
    pub room_id: RoomId,
    pub source_language: Option<String>,
    pub target_languages: Vec<String>,
}

impl ConnectRequest {
    pub fn new(user_id: impl Into<UserId>, room_id: impl Into<RoomId>) -> Self {
        Self {
            user_id: user_id.into(),
            room_id: room_id.into(),
            source_language: None,
            target_languages: Vec::new(),
        }
    }
}

/// One accepted connection. Must be passed back to `disconnect`.
#[derive(Debug)]
pub struct Connection {
    pub handle: SessionHandle,
    outbound: OutboundSender,
    state: ConnectionState,
    recognizing: bool,
}

impl Connection {
    pub fn user_id(&self) -> &UserId {
        &self.handle.user_id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.handle.room_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_recognizing(&self) -> bool {
        self.recognizing
    }

    /// Queues a reply on this connection only. Returns false if the queue is
    /// full or closed.
    pub fn reply(&self, event: ServerEvent) -> bool {
        self.outbound.try_send(Arc::new(event)).is_ok()
    }
}

/// Result of a settings change.
#[derive(Debug, Clone, Serialize)]
pub struct SettingsOutcome {
    pub preferences: UserPreferences,
    /// Applied to an active session.
    pub live: bool,
    pub persisted: bool,
}

/// Owns the process-wide translation state and the connect/disconnect
/// sequences that keep it consistent.
pub struct ConnectionManager {
    registry: Arc<SessionRegistry>,
    channel: Arc<RoomChannel>,
    coordinator: Arc<RecognitionCoordinator>,
    fanout: Option<Arc<FanoutEngine>>,
    store: Arc<dyn SettingsStore>,
    default_source_language: String,
    outbound_buffer: usize,
}

impl ConnectionManager {
    pub fn new(
        registry: Arc<SessionRegistry>,
        channel: Arc<RoomChannel>,
        coordinator: Arc<RecognitionCoordinator>,
        fanout: Option<Arc<FanoutEngine>>,
        store: Arc<dyn SettingsStore>,
        pipeline: &PipelineSettings,
    ) -> Self {
        let default_source_language =
            language::normalize(&pipeline.default_source_language).unwrap_or_else(|| "ja".to_string());
        Self {
            registry,
            channel,
            coordinator,
            fanout,
            store,
            default_source_language,
            outbound_buffer: pipeline.outbound_buffer.max(1),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn channel(&self) -> &Arc<RoomChannel> {
        &self.channel
    }

    pub fn coordinator(&self) -> &Arc<RecognitionCoordinator> {
        &self.coordinator
    }

    pub fn translation_available(&self) -> bool {
        self.fanout.is_some()
    }

    /// A bounded outbound queue sized from configuration.
    pub fn outbound_channel(&self) -> (OutboundSender, mpsc::Receiver<Arc<ServerEvent>>) {
        mpsc::channel(self.outbound_buffer)
    }

    /// Registers the session, joins the room, and starts recognition.
    ///
    /// Registry and room failures reject the connection after undoing what
    /// was done. Recognition failures do not: the client is told and the
    /// connection proceeds without server-side recognition.
    pub async fn connect(&self, request: ConnectRequest, outbound: OutboundSender) -> Result<Connection, ConnectError> {
        let ConnectRequest {
            user_id,
            room_id,
            source_language,
            target_languages,
        } = request;
        debug!(%user_id, %room_id, "Connecting");

        let preferences = match self.store.load(&user_id).await {
            Ok(p) => p.unwrap_or_default(),
            Err(e) => {
                warn!(%user_id, error = %e, "Failed to load preferences, using defaults");
                UserPreferences::default()
            }
        };
        let source = source_language
            .or(preferences.source_language)
            .unwrap_or_else(|| self.default_source_language.clone());
        let targets = if target_languages.is_empty() {
            preferences.target_languages
        } else {
            target_languages
        };

        let handle = self.registry.register_with_targets(
            user_id.clone(),
            room_id.clone(),
            &source,
            &targets,
            preferences.settings,
        )?;

        self.channel.attach(user_id.clone(), outbound.clone());
        if let Err(e) = self.channel.join(&user_id, &room_id) {
            self.channel.detach(&user_id, &outbound);
            self.registry.unregister(&user_id);
            return Err(e.into());
        }

        // The session exists from here on; read back the normalized languages.
        let session = self.registry.session(&user_id);
        let (source, targets, settings) = match session {
            Some(s) => (s.source_language, s.target_languages, s.settings),
            None => (source, targets, Default::default()),
        };

        let (sink_tx, sink_rx) = mpsc::channel(self.coordinator.transcript_buffer());
        self.coordinator.on_transcript(user_id.clone(), sink_tx);
        tokio::spawn(Self::transcript_loop(
            user_id.clone(),
            sink_rx,
            self.fanout.clone(),
            self.channel.clone(),
        ));

        let mut connection = Connection {
            handle,
            outbound,
            state: ConnectionState::Connecting,
            recognizing: false,
        };
        connection.reply(ServerEvent::Connected {
            user_id: user_id.clone(),
            room_id: room_id.clone(),
            source_language: source.clone(),
            target_languages: targets,
            settings,
            recognition_available: self.coordinator.is_available(),
            translation_available: self.fanout.is_some(),
        });

        if self.fanout.is_none() {
            connection.reply(ServerEvent::TranslationUnavailable {
                reason: "translation provider is not configured".to_string(),
            });
        }

        if self.coordinator.is_available() {
            match self.coordinator.start_stream(&user_id, &source).await {
                Ok(()) => connection.recognizing = true,
                Err(e) => {
                    warn!(%user_id, error = %e, "Could not start recognition stream");
                    connection.reply(ServerEvent::RecognitionError { message: e.to_string() });
                }
            }
        }

        connection.state = ConnectionState::Connected;
        info!(%user_id, %room_id, recognizing = connection.recognizing, "Connection established");
        Ok(connection)
    }

    /// Stops recognition, leaves the room, and unregisters the session.
    /// Every step runs regardless of the others; calling it again is a no-op.
    pub fn disconnect(&self, connection: &mut Connection) {
        if connection.state == ConnectionState::Disconnected {
            return;
        }
        let user_id = connection.handle.user_id.clone();
        let room_id = connection.handle.room_id.clone();

        // Sink first: a stream start still in flight sees it gone and
        // discards its provider stream instead of outliving the session.
        self.coordinator.remove_sink(&user_id);
        self.coordinator.stop_stream(&user_id);

        if let Err(e) = self.channel.leave(&user_id, &room_id) {
            debug!(%user_id, error = %e, "Leave during disconnect");
        }
        self.channel.detach(&user_id, &connection.outbound);

        self.registry.unregister(&user_id);

        connection.state = ConnectionState::Disconnected;
        connection.recognizing = false;
        info!(%user_id, %room_id, "Connection closed");
    }

    /// Applies a settings change to the live session (if any) and the store.
    ///
    /// A source language change restarts the user's recognition stream.
    pub async fn update_settings(
        &self,
        user_id: &UserId,
        update: SettingsUpdate,
    ) -> Result<SettingsOutcome, RegistryError> {
        let update = update.normalized().map_err(RegistryError::InvalidSettings)?;

        let previous = self.registry.session(user_id);
        let (preferences, live) = match previous {
            Some(before) => {
                let session = self.registry.update_settings(user_id, &update)?;
                if session.source_language != before.source_language {
                    self.restart_recognition(user_id, &session.source_language).await;
                }
                (Self::preferences_of(&session), true)
            }
            None => {
                let mut preferences = self.load_or_default(user_id).await;
                preferences.apply(&update);
                (preferences, false)
            }
        };

        let persisted = match self.store.save(user_id, &preferences).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%user_id, error = %e, "Failed to persist settings");
                false
            }
        };

        Ok(SettingsOutcome {
            preferences,
            live,
            persisted,
        })
    }

    /// Effective preferences: the live session's, else the stored ones.
    pub async fn preferences(&self, user_id: &UserId) -> Result<UserPreferences, StoreError> {
        if let Some(session) = self.registry.session(user_id) {
            return Ok(Self::preferences_of(&session));
        }
        Ok(self.store.load(user_id).await?.unwrap_or_default())
    }

    pub fn participants(&self, room_id: &RoomId) -> Vec<ParticipantInfo> {
        self.registry
            .participants(room_id)
            .iter()
            .map(ParticipantInfo::from)
            .collect()
    }

    pub async fn push_audio(&self, user_id: &UserId, chunk: AudioChunk) {
        if chunk.is_empty() {
            return;
        }
        self.coordinator.push_audio(user_id, chunk).await;
    }

    /// Feeds a client-side transcript through the same ordered path as the
    /// server's recognition results.
    pub async fn submit_transcript(&self, user_id: &UserId, text: String, is_final: bool) {
        let Some(session) = self.registry.session(user_id) else {
            debug!(%user_id, "Transcript without session ignored");
            return;
        };
        self.coordinator
            .submit_transcript(TranscriptEvent {
                speaker_id: user_id.clone(),
                text,
                language: session.source_language,
                is_final,
                timestamp: Utc::now(),
            })
            .await;
    }

    async fn restart_recognition(&self, user_id: &UserId, language: &str) {
        if !self.coordinator.is_streaming(user_id) {
            return;
        }
        self.coordinator.stop_stream(user_id);
        if let Err(e) = self.coordinator.start_stream(user_id, language).await {
            warn!(%user_id, error = %e, "Could not restart recognition stream");
            let _ = self.channel.send(
                user_id,
                Arc::new(ServerEvent::RecognitionError { message: e.to_string() }),
            );
        }
    }

    async fn load_or_default(&self, user_id: &UserId) -> UserPreferences {
        match self.store.load(user_id).await {
            Ok(p) => p.unwrap_or_default(),
            Err(e) => {
                warn!(%user_id, error = %e, "Failed to load preferences, using defaults");
                UserPreferences::default()
            }
        }
    }

    fn preferences_of(session: &Session) -> UserPreferences {
        UserPreferences {
            settings: session.settings.clone(),
            source_language: Some(session.source_language.clone()),
            target_languages: session.target_languages.clone(),
        }
    }

    /// Processes one user's transcript events strictly in order. Ends when
    /// the sink is dropped and drained.
    async fn transcript_loop(
        user_id: UserId,
        mut events: mpsc::Receiver<RecognitionEvent>,
        fanout: Option<Arc<FanoutEngine>>,
        channel: Arc<RoomChannel>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                RecognitionEvent::Transcript(transcript) => {
                    if !transcript.is_final {
                        continue;
                    }
                    if let Some(fanout) = &fanout {
                        fanout.handle(&transcript).await;
                    }
                }
                RecognitionEvent::Error { message, .. } => {
                    let _ = channel.send(&user_id, Arc::new(ServerEvent::RecognitionError { message }));
                }
            }
        }
        debug!(%user_id, "Transcript loop finished");
    }
}

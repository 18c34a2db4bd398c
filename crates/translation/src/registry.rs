use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::settings::{SettingsUpdate, TranslationSettings};
use crate::{RoomId, UserId, language, voices};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("User {0} already has an active session")]
    AlreadyRegistered(UserId),
    #[error("No active session for user {0}")]
    NotFound(UserId),
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
    #[error("A session requires a room")]
    MissingRoom,
}

/// Per-connection translation state for one user in one room.
///
/// The recognition stream itself is owned by the `RecognitionCoordinator`,
/// keyed by the same user id.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub user_id: UserId,
    pub room_id: RoomId,
    pub source_language: String,
    /// Ordered, deduplicated.
    pub target_languages: Vec<String>,
    pub settings: TranslationSettings,
    pub joined_at: DateTime<Utc>,
}

/// Returned by `register`; identifies the session that was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub user_id: UserId,
    pub room_id: RoomId,
}

/// Synthesis parameters a recipient asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceRequest {
    pub voice_id: String,
    pub speed: f32,
}

/// One (participant, target language) pair that should receive output.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    pub user_id: UserId,
    pub target_language: String,
    /// Present when the participant has voice translation enabled.
    pub voice: Option<VoiceRequest>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<UserId, Session>,
    rooms: HashMap<RoomId, HashSet<UserId>>,
}

/// Process-wide table of active sessions, indexed by user and by room.
///
/// A single `RwLock` guards both indexes so a settings change and a fan-out
/// read of the same room never interleave. Critical sections never await.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<Inner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session whose target language is its own source language.
    pub fn register(
        &self,
        user_id: UserId,
        room_id: RoomId,
        source_language: &str,
        settings: TranslationSettings,
    ) -> Result<SessionHandle, RegistryError> {
        self.register_with_targets(user_id, room_id, source_language, &[], settings)
    }

    /// Registers a session. An empty `target_languages` defaults to the
    /// source language.
    pub fn register_with_targets(
        &self,
        user_id: UserId,
        room_id: RoomId,
        source_language: &str,
        target_languages: &[String],
        settings: TranslationSettings,
    ) -> Result<SessionHandle, RegistryError> {
        if room_id.as_str().trim().is_empty() {
            return Err(RegistryError::MissingRoom);
        }
        let source = language::normalize(source_language).ok_or_else(|| {
            RegistryError::InvalidSettings(format!("invalid source language '{source_language}'"))
        })?;
        let mut targets = language::normalize_all(target_languages);
        if targets.is_empty() {
            targets.push(source.clone());
        }

        let mut inner = self.inner.write();
        if inner.sessions.contains_key(&user_id) {
            return Err(RegistryError::AlreadyRegistered(user_id));
        }

        inner
            .rooms
            .entry(room_id.clone())
            .or_default()
            .insert(user_id.clone());
        inner.sessions.insert(
            user_id.clone(),
            Session {
                user_id: user_id.clone(),
                room_id: room_id.clone(),
                source_language: source.clone(),
                target_languages: targets.clone(),
                settings,
                joined_at: Utc::now(),
            },
        );
        drop(inner);

        info!(%user_id, %room_id, source = %source, ?targets, "Session registered");
        Ok(SessionHandle { user_id, room_id })
    }

    /// Merges the supplied fields into the live session and returns the
    /// updated snapshot. An invalid update changes nothing.
    pub fn update_settings(
        &self,
        user_id: &UserId,
        update: &SettingsUpdate,
    ) -> Result<Session, RegistryError> {
        let update = update
            .clone()
            .normalized()
            .map_err(RegistryError::InvalidSettings)?;

        let mut inner = self.inner.write();
        let session = inner
            .sessions
            .get_mut(user_id)
            .ok_or_else(|| RegistryError::NotFound(user_id.clone()))?;

        session.settings.apply(&update);
        if let Some(ref source) = update.source_language {
            session.source_language = source.clone();
        }
        if let Some(ref targets) = update.target_languages {
            session.target_languages = targets.clone();
        }
        let snapshot = session.clone();
        drop(inner);

        debug!(%user_id, "Session settings updated");
        Ok(snapshot)
    }

    /// Distinct target languages wanted by every participant of `room_id`
    /// except `excluding`. Participants with all output disabled contribute
    /// nothing.
    pub fn target_languages_for_room(&self, room_id: &RoomId, excluding: &UserId) -> BTreeSet<String> {
        let inner = self.inner.read();
        Self::others(&inner, room_id, excluding)
            .flat_map(|s| s.target_languages.iter().cloned())
            .collect()
    }

    /// Every (participant, target language) pair in the room except
    /// `excluding`, with the voice each participant would hear.
    pub fn recipients_for_room(&self, room_id: &RoomId, excluding: &UserId) -> Vec<Recipient> {
        let inner = self.inner.read();
        let mut recipients = Vec::new();
        for session in Self::others(&inner, room_id, excluding) {
            for target in &session.target_languages {
                let voice = session.settings.voice_translation_enabled.then(|| VoiceRequest {
                    voice_id: voices::resolve_voice(
                        target,
                        session.settings.preferred_voice_id.as_deref(),
                    ),
                    speed: session.settings.voice_speed,
                });
                recipients.push(Recipient {
                    user_id: session.user_id.clone(),
                    target_language: target.clone(),
                    voice,
                });
            }
        }
        recipients
    }

    fn others<'a>(
        inner: &'a Inner,
        room_id: &RoomId,
        excluding: &'a UserId,
    ) -> impl Iterator<Item = &'a Session> + 'a {
        inner
            .rooms
            .get(room_id)
            .into_iter()
            .flatten()
            .filter(move |id| *id != excluding)
            .filter_map(move |id| inner.sessions.get(id))
            .filter(|s| s.settings.wants_output())
    }

    pub fn session(&self, user_id: &UserId) -> Option<Session> {
        self.inner.read().sessions.get(user_id).cloned()
    }

    /// Current participants of a room, ordered by user id.
    pub fn participants(&self, room_id: &RoomId) -> Vec<Session> {
        let inner = self.inner.read();
        let mut sessions: Vec<Session> = inner
            .rooms
            .get(room_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.sessions.get(id).cloned())
            .collect();
        sessions.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        sessions
    }

    pub fn has_room(&self, room_id: &RoomId) -> bool {
        self.inner.read().rooms.contains_key(room_id)
    }

    pub fn session_count(&self) -> usize {
        self.inner.read().sessions.len()
    }

    /// Removes the session and drops the room index entry once empty.
    /// Unknown users are a no-op. Returns the removed session.
    pub fn unregister(&self, user_id: &UserId) -> Option<Session> {
        let mut inner = self.inner.write();
        let session = inner.sessions.remove(user_id)?;
        if let Some(members) = inner.rooms.get_mut(&session.room_id) {
            members.remove(user_id);
            if members.is_empty() {
                inner.rooms.remove(&session.room_id);
            }
        }
        drop(inner);

        info!(%user_id, room_id = %session.room_id, "Session unregistered");
        Some(session)
    }
}

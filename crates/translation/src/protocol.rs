//! JSON messages exchanged over the translation WebSocket.

use serde::{Deserialize, Serialize};

use crate::registry::Session;
use crate::settings::{SettingsUpdate, TranslationSettings};
use crate::voices::VoiceProfile;
use crate::{RoomId, TranslationResult, UserId};

/// Messages from the client. Binary frames carry raw PCM and are not
/// represented here.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Normalized float samples in [-1.0, 1.0] at the pipeline sample rate.
    AudioData { data: Vec<f32> },
    /// A transcript produced by client-side recognition.
    RecognitionResult {
        transcript: String,
        #[serde(default)]
        is_final: bool,
    },
    UpdateSettings { settings: SettingsUpdate },
    GetVoices { language: String },
    GetParticipants,
    Ping,
}

/// Messages to the client, tagged by `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        user_id: UserId,
        room_id: RoomId,
        source_language: String,
        target_languages: Vec<String>,
        settings: TranslationSettings,
        recognition_available: bool,
        translation_available: bool,
    },
    Translation(TranslationResult),
    TranslationError {
        speaker_id: UserId,
        target_language: String,
        message: String,
    },
    RecognitionError { message: String },
    SettingsUpdated {
        settings: TranslationSettings,
        source_language: Option<String>,
        target_languages: Vec<String>,
        persisted: bool,
    },
    VoicesList {
        language: String,
        voices: Vec<VoiceProfile>,
        default_voice: String,
    },
    Participants {
        room_id: RoomId,
        participants: Vec<ParticipantInfo>,
    },
    TranslationUnavailable { reason: String },
    Pong,
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }
}

/// A participant's effective languages, as exposed to the application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantInfo {
    pub user_id: UserId,
    pub source_language: String,
    pub target_languages: Vec<String>,
    pub text_translation_enabled: bool,
    pub voice_translation_enabled: bool,
}

impl From<&Session> for ParticipantInfo {
    fn from(session: &Session) -> Self {
        Self {
            user_id: session.user_id.clone(),
            source_language: session.source_language.clone(),
            target_languages: session.target_languages.clone(),
            text_translation_enabled: session.settings.text_translation_enabled,
            voice_translation_enabled: session.settings.voice_translation_enabled,
        }
    }
}

/// Serde adapter for optional binary audio carried as a base64 string.
pub mod base64_audio {
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(audio: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match audio {
            Some(bytes) => serializer.serialize_str(&BASE64.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| BASE64.decode(s.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

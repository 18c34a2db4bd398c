pub mod audio;
pub mod channel;
pub mod fanout;
pub mod language;
pub mod lifecycle;
pub mod protocol;
pub mod providers;
pub mod recognition;
pub mod registry;
pub mod settings;
mod task;
pub mod voices;

pub use channel::{ChannelError, OutboundSender, RoomChannel};
pub use fanout::{FanoutEngine, FanoutReport};
pub use lifecycle::{
    ConnectError, ConnectRequest, Connection, ConnectionManager, ConnectionState, SettingsOutcome,
};
pub use protocol::{ClientMessage, ParticipantInfo, ServerEvent};
pub use providers::{ProviderError, SpeechRecognizer, SpeechSynthesizer, TextTranslator};
pub use recognition::{RecognitionCoordinator, RecognitionError, RecognitionEvent};
pub use registry::{RegistryError, Session, SessionHandle, SessionRegistry};
pub use settings::{
    InMemorySettingsStore, SettingsStore, SettingsUpdate, StoreError, TranslationSettings,
    UserPreferences,
};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Authenticated user identity, supplied by the identity provider.
    UserId
);
string_id!(
    /// A translation/broadcast room (one per wine in the catalog).
    RoomId
);

/// A recognition result for one speaker.
///
/// Only events with `is_final == true` are eligible for fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub speaker_id: UserId,
    pub text: String,
    /// Language the stream was started with (normalized code).
    pub language: String,
    pub is_final: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Text,
    Voice,
}

/// One fan-out output unit: computed once per distinct target language (or
/// language + voice) and shared by every recipient of that group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub speaker_id: UserId,
    pub original_text: String,
    pub translated_text: String,
    pub source_language: String,
    pub target_language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(
        default,
        rename = "audio_data",
        skip_serializing_if = "Option::is_none",
        with = "protocol::base64_audio"
    )]
    pub audio_payload: Option<Vec<u8>>,
    pub result_kind: ResultKind,
}

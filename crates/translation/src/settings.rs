use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::UserId;
use crate::language;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitlePosition {
    Top,
    #[default]
    Bottom,
    Overlay,
}

/// Per-user translation preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationSettings {
    pub text_translation_enabled: bool,
    pub voice_translation_enabled: bool,
    /// Volume of the speaker's original audio (0.0-1.0).
    pub original_voice_volume: f32,
    /// Volume of synthesized translated audio (0.0-1.0).
    pub translated_voice_volume: f32,
    pub preferred_voice_id: Option<String>,
    pub voice_speed: f32,
    pub subtitle_position: SubtitlePosition,
    pub subtitle_font_size: u32,
    pub subtitle_background_opacity: f32,
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            text_translation_enabled: true,
            voice_translation_enabled: false,
            original_voice_volume: 0.3,
            translated_voice_volume: 0.8,
            preferred_voice_id: None,
            voice_speed: 1.0,
            subtitle_position: SubtitlePosition::Bottom,
            subtitle_font_size: 16,
            subtitle_background_opacity: 0.7,
        }
    }
}

impl TranslationSettings {
    /// Whether this user receives any translation output at all.
    pub fn wants_output(&self) -> bool {
        self.text_translation_enabled || self.voice_translation_enabled
    }

    /// Merges the supplied fields of `update`. An empty `preferred_voice_id`
    /// clears the preference.
    pub fn apply(&mut self, update: &SettingsUpdate) {
        if let Some(v) = update.text_translation_enabled {
            self.text_translation_enabled = v;
        }
        if let Some(v) = update.voice_translation_enabled {
            self.voice_translation_enabled = v;
        }
        if let Some(v) = update.original_voice_volume {
            self.original_voice_volume = v;
        }
        if let Some(v) = update.translated_voice_volume {
            self.translated_voice_volume = v;
        }
        if let Some(ref v) = update.preferred_voice_id {
            let v = v.trim();
            self.preferred_voice_id = (!v.is_empty()).then(|| v.to_string());
        }
        if let Some(v) = update.voice_speed {
            self.voice_speed = v;
        }
        if let Some(v) = update.subtitle_position {
            self.subtitle_position = v;
        }
        if let Some(v) = update.subtitle_font_size {
            self.subtitle_font_size = v;
        }
        if let Some(v) = update.subtitle_background_opacity {
            self.subtitle_background_opacity = v;
        }
    }
}

/// A partial settings change. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SettingsUpdate {
    pub text_translation_enabled: Option<bool>,
    pub voice_translation_enabled: Option<bool>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub original_voice_volume: Option<f32>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub translated_voice_volume: Option<f32>,
    #[validate(length(max = 64))]
    pub preferred_voice_id: Option<String>,
    #[validate(range(min = 0.25, max = 4.0))]
    pub voice_speed: Option<f32>,
    pub subtitle_position: Option<SubtitlePosition>,
    #[validate(range(min = 8, max = 72))]
    pub subtitle_font_size: Option<u32>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub subtitle_background_opacity: Option<f32>,
    #[validate(length(min = 2, max = 16))]
    pub source_language: Option<String>,
    #[validate(length(min = 1, max = 8))]
    pub target_languages: Option<Vec<String>>,
}

impl SettingsUpdate {
    /// Validates ranges and normalizes language fields in place.
    pub fn normalized(mut self) -> Result<Self, String> {
        self.validate().map_err(|e| e.to_string())?;

        if let Some(ref source) = self.source_language {
            let code = language::normalize(source)
                .ok_or_else(|| format!("invalid source_language '{source}'"))?;
            self.source_language = Some(code);
        }
        if let Some(ref targets) = self.target_languages {
            let codes = language::normalize_all(targets);
            if codes.is_empty() {
                return Err("target_languages contains no valid language".to_string());
            }
            self.target_languages = Some(codes);
        }
        Ok(self)
    }
}

/// What the settings store persists for a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    pub settings: TranslationSettings,
    pub source_language: Option<String>,
    pub target_languages: Vec<String>,
}

impl UserPreferences {
    /// Applies an already normalized update.
    pub fn apply(&mut self, update: &SettingsUpdate) {
        self.settings.apply(update);
        if let Some(ref source) = update.source_language {
            self.source_language = Some(source.clone());
        }
        if let Some(ref targets) = update.target_languages {
            self.target_languages = targets.clone();
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Settings store unavailable: {0}")]
    Unavailable(String),
    #[error("Settings store error: {0}")]
    Backend(String),
}

/// Persistent storage for per-user translation preferences.
#[async_trait]
pub trait SettingsStore: Send + Sync + 'static {
    async fn load(&self, user_id: &UserId) -> Result<Option<UserPreferences>, StoreError>;

    async fn save(&self, user_id: &UserId, preferences: &UserPreferences) -> Result<(), StoreError>;
}

/// Process-local store, used when no database is configured and in tests.
#[derive(Default)]
pub struct InMemorySettingsStore {
    entries: DashMap<UserId, UserPreferences>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn load(&self, user_id: &UserId) -> Result<Option<UserPreferences>, StoreError> {
        Ok(self.entries.get(user_id).map(|e| e.value().clone()))
    }

    async fn save(&self, user_id: &UserId, preferences: &UserPreferences) -> Result<(), StoreError> {
        self.entries.insert(user_id.clone(), preferences.clone());
        Ok(())
    }
}

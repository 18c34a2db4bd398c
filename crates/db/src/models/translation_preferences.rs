use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// A user's persisted translation preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationPreferencesDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Identity-provider user id (opaque string).
    pub user_id: String,
    pub source_language: Option<String>,
    #[serde(default)]
    pub target_languages: Vec<String>,
    #[serde(default)]
    pub settings: StoredTranslationSettings,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl TranslationPreferencesDoc {
    pub const COLLECTION: &'static str = "translation_settings";
}

/// Field-for-field copy of the live settings; missing fields take defaults
/// so older documents keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredTranslationSettings {
    pub text_translation_enabled: bool,
    pub voice_translation_enabled: bool,
    pub original_voice_volume: f64,
    pub translated_voice_volume: f64,
    pub preferred_voice_id: Option<String>,
    pub voice_speed: f64,
    pub subtitle_position: String,
    pub subtitle_font_size: i32,
    pub subtitle_background_opacity: f64,
}

impl Default for StoredTranslationSettings {
    fn default() -> Self {
        Self {
            text_translation_enabled: true,
            voice_translation_enabled: false,
            original_voice_volume: 0.3,
            translated_voice_volume: 0.8,
            preferred_voice_id: None,
            voice_speed: 1.0,
            subtitle_position: "bottom".to_string(),
            subtitle_font_size: 16,
            subtitle_background_opacity: 0.7,
        }
    }
}

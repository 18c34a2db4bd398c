use async_trait::async_trait;
use bson::{DateTime, doc};
use mongodb::Database;
use tracing::debug;
use winechat_db::models::{StoredTranslationSettings, TranslationPreferencesDoc};
use winechat_translation::settings::{
    SettingsStore, StoreError, SubtitlePosition, TranslationSettings, UserPreferences,
};
use winechat_translation::{UserId, language};

use super::base::{BaseDao, DaoError, DaoResult};

/// MongoDB-backed settings store (`translation_settings`, one document per
/// user, unique on `user_id`).
pub struct TranslationSettingsDao {
    pub base: BaseDao<TranslationPreferencesDoc>,
}

impl TranslationSettingsDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, TranslationPreferencesDoc::COLLECTION),
        }
    }

    pub async fn find_by_user(&self, user_id: &str) -> DaoResult<Option<TranslationPreferencesDoc>> {
        self.base.find_one(doc! { "user_id": user_id }).await
    }

    /// Writes the user's preferences, creating the document on first save.
    pub async fn upsert(&self, user_id: &str, preferences: &UserPreferences) -> DaoResult<bool> {
        let now = DateTime::now();
        let settings = bson::to_bson(&to_stored(&preferences.settings))?;
        self.base
            .upsert_one(
                doc! { "user_id": user_id },
                doc! {
                    "$set": {
                        "source_language": preferences.source_language.clone(),
                        "target_languages": preferences.target_languages.clone(),
                        "settings": settings,
                        "updated_at": now,
                    },
                    "$setOnInsert": { "created_at": now },
                },
            )
            .await
    }
}

#[async_trait]
impl SettingsStore for TranslationSettingsDao {
    async fn load(&self, user_id: &UserId) -> Result<Option<UserPreferences>, StoreError> {
        let doc = self.find_by_user(user_id.as_str()).await.map_err(store_error)?;
        Ok(doc.map(|d| to_preferences(&d)))
    }

    async fn save(&self, user_id: &UserId, preferences: &UserPreferences) -> Result<(), StoreError> {
        let inserted = self
            .upsert(user_id.as_str(), preferences)
            .await
            .map_err(store_error)?;
        debug!(%user_id, inserted, "Translation settings saved");
        Ok(())
    }
}

fn store_error(err: DaoError) -> StoreError {
    match err {
        DaoError::Mongo(e) => StoreError::Unavailable(e.to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}

fn to_stored(settings: &TranslationSettings) -> StoredTranslationSettings {
    StoredTranslationSettings {
        text_translation_enabled: settings.text_translation_enabled,
        voice_translation_enabled: settings.voice_translation_enabled,
        original_voice_volume: settings.original_voice_volume as f64,
        translated_voice_volume: settings.translated_voice_volume as f64,
        preferred_voice_id: settings.preferred_voice_id.clone(),
        voice_speed: settings.voice_speed as f64,
        subtitle_position: match settings.subtitle_position {
            SubtitlePosition::Top => "top",
            SubtitlePosition::Bottom => "bottom",
            SubtitlePosition::Overlay => "overlay",
        }
        .to_string(),
        subtitle_font_size: settings.subtitle_font_size as i32,
        subtitle_background_opacity: settings.subtitle_background_opacity as f64,
    }
}

fn to_preferences(doc: &TranslationPreferencesDoc) -> UserPreferences {
    let s = &doc.settings;
    let settings = TranslationSettings {
        text_translation_enabled: s.text_translation_enabled,
        voice_translation_enabled: s.voice_translation_enabled,
        original_voice_volume: s.original_voice_volume.clamp(0.0, 1.0) as f32,
        translated_voice_volume: s.translated_voice_volume.clamp(0.0, 1.0) as f32,
        preferred_voice_id: s.preferred_voice_id.clone().filter(|v| !v.is_empty()),
        voice_speed: s.voice_speed.clamp(0.25, 4.0) as f32,
        subtitle_position: match s.subtitle_position.as_str() {
            "top" => SubtitlePosition::Top,
            "overlay" => SubtitlePosition::Overlay,
            _ => SubtitlePosition::Bottom,
        },
        subtitle_font_size: s.subtitle_font_size.clamp(8, 72) as u32,
        subtitle_background_opacity: s.subtitle_background_opacity.clamp(0.0, 1.0) as f32,
    };
    UserPreferences {
        settings,
        source_language: doc.source_language.as_deref().and_then(language::normalize),
        target_languages: language::normalize_all(&doc.target_languages),
    }
}

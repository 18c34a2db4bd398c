use std::sync::Arc;

use axum::{Json, extract::{Path, State}};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;
use winechat_translation::language::{self, LanguageInfo};
use winechat_translation::voices::{self, VoiceProfile};
use winechat_translation::{
    ParticipantInfo, RoomId, SettingsOutcome, SettingsUpdate, SpeechSynthesizer, TextTranslator,
    UserPreferences,
};

use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};

#[derive(Debug, Serialize)]
pub struct VoicesResponse {
    pub language: String,
    pub voices: &'static [VoiceProfile],
    pub default_voice: String,
}

#[derive(Debug, Serialize)]
pub struct ParticipantsResponse {
    pub room_id: RoomId,
    pub participants: Vec<ParticipantInfo>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TranslateRequest {
    #[validate(length(min = 1, max = 5000))]
    pub text: String,
    pub source_language: String,
    pub target_language: String,
}

#[derive(Debug, Serialize)]
pub struct TranslateResponse {
    pub translated_text: String,
    pub source_language: String,
    pub target_language: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SynthesizeRequest {
    #[validate(length(min = 1, max = 5000))]
    pub text: String,
    pub language: Option<String>,
    #[validate(length(max = 64))]
    pub voice_id: Option<String>,
    #[validate(range(min = 0.25, max = 4.0))]
    pub speed: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct SynthesizeResponse {
    /// Base64 MP3.
    pub audio: String,
    pub voice_id: String,
    pub language: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DetectRequest {
    #[validate(length(min = 1, max = 5000))]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub language: String,
    /// Whether the detected code is one of the supported languages.
    pub supported: bool,
}

fn translator(state: &AppState) -> Result<&Arc<dyn TextTranslator>, ApiError> {
    state
        .translator
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Translation is not configured".to_string()))
}

fn synthesizer(state: &AppState) -> Result<&Arc<dyn SpeechSynthesizer>, ApiError> {
    state
        .synthesizer
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Speech synthesis is not configured".to_string()))
}

fn language_code(tag: &str, field: &str) -> Result<String, ApiError> {
    language::normalize(tag).ok_or_else(|| ApiError::BadRequest(format!("Invalid {field}: {tag}")))
}

pub async fn languages() -> Json<&'static [LanguageInfo]> {
    Json(language::supported_languages())
}

pub async fn voices(Path(tag): Path<String>) -> Result<Json<VoicesResponse>, ApiError> {
    let code = language::normalize(&tag)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid language: {tag}")))?;

    Ok(Json(VoicesResponse {
        voices: voices::available_voices(&code),
        default_voice: voices::default_voice(&code),
        language: code,
    }))
}

pub async fn participants(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(room_id): Path<String>,
) -> Json<ParticipantsResponse> {
    let room_id = RoomId::new(room_id);
    let participants = state.manager.participants(&room_id);
    Json(ParticipantsResponse { room_id, participants })
}

pub async fn get_settings(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UserPreferences>, ApiError> {
    let preferences = state.manager.preferences(&auth.user_id).await?;
    Ok(Json(preferences))
}

pub async fn update_settings(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<SettingsUpdate>,
) -> Result<Json<SettingsOutcome>, ApiError> {
    let outcome = state.manager.update_settings(&auth.user_id, body).await?;
    Ok(Json(outcome))
}

pub async fn translate(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, ApiError> {
    body.validate()?;
    let source = language_code(&body.source_language, "source_language")?;
    let target = language_code(&body.target_language, "target_language")?;

    let translated_text = if source == target {
        body.text
    } else {
        translator(&state)?.translate(&body.text, &source, &target).await?
    };
    debug!(user_id = %auth.user_id, %source, %target, "One-shot translation");

    Ok(Json(TranslateResponse {
        translated_text,
        source_language: source,
        target_language: target,
    }))
}

pub async fn synthesize(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<SynthesizeRequest>,
) -> Result<Json<SynthesizeResponse>, ApiError> {
    body.validate()?;
    // Without a language, the voice name's locale decides.
    let language = match (&body.language, body.voice_id.as_deref().and_then(voices::voice_locale)) {
        (Some(tag), _) => language_code(tag, "language")?,
        (None, Some(locale)) => language_code(locale, "voice_id")?,
        (None, None) => {
            return Err(ApiError::BadRequest("language or a locale voice_id is required".to_string()));
        }
    };
    let voice_id = voices::resolve_voice(&language, body.voice_id.as_deref());
    let speed = body.speed.unwrap_or(1.0);

    let audio = synthesizer(&state)?.synthesize(&body.text, &voice_id, speed).await?;
    debug!(user_id = %auth.user_id, %voice_id, bytes = audio.len(), "One-shot synthesis");

    Ok(Json(SynthesizeResponse {
        audio: BASE64.encode(audio),
        voice_id,
        language,
    }))
}

pub async fn detect_language(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(body): Json<DetectRequest>,
) -> Result<Json<DetectResponse>, ApiError> {
    body.validate()?;
    let detected = translator(&state)?.detect_language(&body.text).await?;

    let language = language::normalize(&detected).unwrap_or(detected);
    let supported = language::is_supported(&language);

    Ok(Json(DetectResponse { language, supported }))
}

use serde::{Deserialize, Serialize};

/// Top-level application settings.
///
/// Layered from (lowest to highest precedence): built-in defaults,
/// `config/default.toml`, `config/{WINECHAT_ENV}.toml`, and `WINECHAT__*`
/// environment variables (`WINECHAT__APP__PORT=8080`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: AppSettings,
    pub jwt: JwtSettings,
    pub database: DatabaseSettings,
    pub log: LogSettings,
    pub providers: ProviderSettings,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: "dev-jwt-secret-change-in-production".to_string(),
            issuer: "winechat".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// MongoDB connection string. Empty = keep preferences in memory.
    pub url: String,
    pub name: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            name: "winechat".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub json: bool,
}

/// Credentials and endpoints for the hosted speech/translation services.
///
/// Each capability has its own key; an unset key falls back to
/// `google_api_key`. A capability with no key at all is reported as
/// unavailable rather than failing startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub google_api_key: Option<String>,
    pub translate_api_key: Option<String>,
    pub speech_api_key: Option<String>,
    pub tts_api_key: Option<String>,
    pub translate_base_url: String,
    pub speech_base_url: String,
    pub tts_base_url: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            google_api_key: None,
            translate_api_key: None,
            speech_api_key: None,
            tts_api_key: None,
            translate_base_url: "https://translation.googleapis.com".to_string(),
            speech_base_url: "https://speech.googleapis.com".to_string(),
            tts_base_url: "https://texttospeech.googleapis.com".to_string(),
        }
    }
}

impl ProviderSettings {
    pub fn translate_key(&self) -> Option<&str> {
        resolve_key(&self.translate_api_key, &self.google_api_key)
    }

    pub fn speech_key(&self) -> Option<&str> {
        resolve_key(&self.speech_api_key, &self.google_api_key)
    }

    pub fn tts_key(&self) -> Option<&str> {
        resolve_key(&self.tts_api_key, &self.google_api_key)
    }
}

fn resolve_key<'a>(specific: &'a Option<String>, fallback: &'a Option<String>) -> Option<&'a str> {
    specific
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .or_else(|| fallback.as_deref().filter(|k| !k.trim().is_empty()))
}

/// Tuning for the real-time translation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Per-connection outbound queue length (messages).
    pub outbound_buffer: usize,
    /// Per-stream audio queue length (chunks).
    pub audio_buffer: usize,
    /// Per-session transcript queue length (events).
    pub transcript_buffer: usize,
    /// Sample rate of incoming PCM audio.
    pub sample_rate: u32,
    /// Interval between interim recognition results while speech continues.
    pub partial_interval_ms: u64,
    /// A gap this long with no audio chunk ends the utterance.
    pub utterance_gap_ms: u64,
    /// Trailing quiet audio this long ends the utterance.
    pub silence_ms: u64,
    /// RMS (0.0-1.0) below which a chunk counts as silence.
    pub silence_rms_threshold: f32,
    /// Force-finalize utterances longer than this.
    pub max_utterance_secs: f64,
    /// Source language for users with no stored or requested language.
    pub default_source_language: String,
    /// A connection that sends no frame (pings included) for this long is
    /// closed. 0 disables the check.
    pub idle_timeout_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            outbound_buffer: 256,
            audio_buffer: 64,
            transcript_buffer: 64,
            sample_rate: 16000,
            partial_interval_ms: 1000,
            utterance_gap_ms: 800,
            silence_ms: 700,
            silence_rms_threshold: 0.01,
            max_utterance_secs: 15.0,
            default_source_language: "ja".to_string(),
            idle_timeout_ms: 90_000,
        }
    }
}

impl Settings {
    /// Loads settings from `.env`, optional TOML files and the environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();

        let env = std::env::var("WINECHAT_ENV").unwrap_or_else(|_| "development".to_string());

        config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("WINECHAT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

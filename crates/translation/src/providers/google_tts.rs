use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ProviderError, SpeechSynthesizer};
use crate::voices;

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    #[serde(rename = "audioConfig")]
    audio_config: AudioConfig,
}

#[derive(Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    speaking_rate: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

/// Google Cloud Text-to-Speech (v1 REST, API key auth). Produces MP3.
pub struct GoogleSynthesizer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleSynthesizer {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str, speed: f32) -> Result<Vec<u8>, ProviderError> {
        // The voice name carries its locale ("ko-KR-Wavenet-A").
        let language_code = voices::voice_locale(voice_id).ok_or_else(|| {
            ProviderError::Request(format!("voice '{voice_id}' has no locale prefix"))
        })?;

        let url = format!("{}/v1/text:synthesize", self.base_url);
        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&SynthesizeRequest {
                input: SynthesisInput { text },
                voice: VoiceSelection {
                    language_code,
                    name: voice_id,
                },
                audio_config: AudioConfig {
                    audio_encoding: "MP3",
                    speaking_rate: speed.clamp(0.25, 4.0),
                },
            })
            .send()
            .await?;

        let resp = super::check_status(resp).await?;
        let body: SynthesizeResponse = resp.json().await?;
        let audio = BASE64
            .decode(body.audio_content.as_bytes())
            .map_err(|e| ProviderError::Response(format!("audioContent is not base64: {e}")))?;

        debug!(voice = voice_id, bytes = audio.len(), "Synthesized speech");
        Ok(audio)
    }

    fn name(&self) -> &str {
        "google_tts"
    }
}

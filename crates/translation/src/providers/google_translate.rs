use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ProviderError, TextTranslator};

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Deserialize)]
struct TranslateData {
    translations: Vec<Translation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
}

#[derive(Serialize)]
struct DetectRequest<'a> {
    q: &'a str,
}

#[derive(Deserialize)]
struct DetectResponse {
    data: DetectData,
}

#[derive(Deserialize)]
struct DetectData {
    detections: Vec<Vec<Detection>>,
}

#[derive(Deserialize)]
struct Detection {
    language: String,
}

/// Google Cloud Translation (v2 REST, API key auth).
pub struct GoogleTranslator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleTranslator {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl TextTranslator for GoogleTranslator {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/language/translate/v2", self.base_url);
        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&TranslateRequest {
                q: text,
                source: source_language,
                target: target_language,
                format: "text",
            })
            .send()
            .await?;

        let resp = super::check_status(resp).await?;
        let body: TranslateResponse = resp.json().await?;

        let translated = body
            .data
            .translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or_else(|| ProviderError::Response("empty translations array".to_string()))?;

        debug!(source = source_language, target = target_language, chars = translated.len(), "Translated text");
        Ok(translated)
    }

    async fn detect_language(&self, text: &str) -> Result<String, ProviderError> {
        let url = format!("{}/language/translate/v2/detect", self.base_url);
        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&DetectRequest { q: text })
            .send()
            .await?;

        let resp = super::check_status(resp).await?;
        let body: DetectResponse = resp.json().await?;

        body.data
            .detections
            .into_iter()
            .next()
            .and_then(|candidates| candidates.into_iter().next())
            .map(|d| d.language)
            .ok_or_else(|| ProviderError::Response("empty detections array".to_string()))
    }

    fn name(&self) -> &str {
        "google_translate"
    }
}

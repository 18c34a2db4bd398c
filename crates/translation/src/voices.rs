use serde::Serialize;

use crate::language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VoiceGender {
    Female,
    Male,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct VoiceProfile {
    pub id: &'static str,
    pub name: &'static str,
    pub gender: VoiceGender,
}

const JA_VOICES: &[VoiceProfile] = &[
    VoiceProfile { id: "ja-JP-Wavenet-A", name: "Japanese Female 1", gender: VoiceGender::Female },
    VoiceProfile { id: "ja-JP-Wavenet-B", name: "Japanese Male 1", gender: VoiceGender::Male },
    VoiceProfile { id: "ja-JP-Wavenet-C", name: "Japanese Female 2", gender: VoiceGender::Female },
    VoiceProfile { id: "ja-JP-Wavenet-D", name: "Japanese Male 2", gender: VoiceGender::Male },
];

const EN_VOICES: &[VoiceProfile] = &[
    VoiceProfile { id: "en-US-Wavenet-A", name: "English Female 1", gender: VoiceGender::Female },
    VoiceProfile { id: "en-US-Wavenet-B", name: "English Male 1", gender: VoiceGender::Male },
    VoiceProfile { id: "en-US-Wavenet-C", name: "English Female 2", gender: VoiceGender::Female },
    VoiceProfile { id: "en-US-Wavenet-D", name: "English Male 2", gender: VoiceGender::Male },
];

const KO_VOICES: &[VoiceProfile] = &[
    VoiceProfile { id: "ko-KR-Wavenet-A", name: "Korean Female 1", gender: VoiceGender::Female },
    VoiceProfile { id: "ko-KR-Wavenet-B", name: "Korean Female 2", gender: VoiceGender::Female },
    VoiceProfile { id: "ko-KR-Wavenet-C", name: "Korean Male 1", gender: VoiceGender::Male },
    VoiceProfile { id: "ko-KR-Wavenet-D", name: "Korean Male 2", gender: VoiceGender::Male },
];

const FALLBACK_VOICE: &str = "en-US-Wavenet-A";

/// Voices offered to users for a normalized language code.
pub fn available_voices(language: &str) -> &'static [VoiceProfile] {
    match language {
        "ja" => JA_VOICES,
        "en" => EN_VOICES,
        "ko" => KO_VOICES,
        _ => &[],
    }
}

/// Default voice for a language: the first catalog entry, the locale's
/// Wavenet-A voice for catalog-less languages we know, else `en-US-Wavenet-A`.
pub fn default_voice(language: &str) -> String {
    if let Some(first) = available_voices(language).first() {
        return first.id.to_string();
    }
    match language::info(language) {
        Some(info) => format!("{}-Wavenet-A", info.locale),
        None => FALLBACK_VOICE.to_string(),
    }
}

/// Picks the voice used to speak `language` for a listener.
///
/// A preferred voice whose name carries a different locale is ignored (a
/// Japanese voice is never used to read Korean). Voice ids without a locale
/// prefix are passed through to the synthesizer as-is.
pub fn resolve_voice(language: &str, preferred: Option<&str>) -> String {
    let Some(voice) = preferred.map(str::trim).filter(|v| !v.is_empty()) else {
        return default_voice(language);
    };
    match voice_locale(voice) {
        Some(l) if !l.eq_ignore_ascii_case(language::locale(language)) => default_voice(language),
        _ => voice.to_string(),
    }
}

/// Locale prefix of a voice name (`"ko-KR-Wavenet-C"` -> `"ko-KR"`).
pub fn voice_locale(voice_id: &str) -> Option<&str> {
    let mut parts = voice_id.splitn(3, '-');
    let lang = parts.next()?;
    let region = parts.next()?;
    let is_lang = (2..=3).contains(&lang.len()) && lang.chars().all(|c| c.is_ascii_lowercase());
    let is_region = region.len() == 2 && region.chars().all(|c| c.is_ascii_uppercase());
    (is_lang && is_region).then(|| &voice_id[..lang.len() + 1 + region.len()])
}

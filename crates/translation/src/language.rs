use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct LanguageInfo {
    pub code: &'static str,
    pub name: &'static str,
    pub english_name: &'static str,
    /// BCP-47 locale used by the hosted speech services.
    pub locale: &'static str,
}

const SUPPORTED: &[LanguageInfo] = &[
    LanguageInfo { code: "ja", name: "日本語", english_name: "Japanese", locale: "ja-JP" },
    LanguageInfo { code: "en", name: "English", english_name: "English", locale: "en-US" },
    LanguageInfo { code: "ko", name: "한국어", english_name: "Korean", locale: "ko-KR" },
    LanguageInfo { code: "zh", name: "中文", english_name: "Chinese", locale: "zh-CN" },
    LanguageInfo { code: "es", name: "Español", english_name: "Spanish", locale: "es-ES" },
    LanguageInfo { code: "fr", name: "Français", english_name: "French", locale: "fr-FR" },
    LanguageInfo { code: "de", name: "Deutsch", english_name: "German", locale: "de-DE" },
];

const FALLBACK_LOCALE: &str = "en-US";

pub fn supported_languages() -> &'static [LanguageInfo] {
    SUPPORTED
}

/// Reduces a language tag to its lowercase primary subtag (`"ja-JP"` -> `"ja"`).
///
/// Returns `None` for empty or non-alphabetic input.
pub fn normalize(tag: &str) -> Option<String> {
    let primary = tag.trim().split(['-', '_']).next()?;
    if primary.is_empty() || !primary.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(primary.to_ascii_lowercase())
}

pub fn is_supported(code: &str) -> bool {
    SUPPORTED.iter().any(|l| l.code == code)
}

pub fn info(code: &str) -> Option<&'static LanguageInfo> {
    SUPPORTED.iter().find(|l| l.code == code)
}

/// Locale for a normalized language code, `en-US` for anything unknown.
pub fn locale(code: &str) -> &'static str {
    info(code).map(|l| l.locale).unwrap_or(FALLBACK_LOCALE)
}

/// Normalizes a list of tags, dropping invalid ones and duplicates while
/// keeping first-seen order.
pub fn normalize_all<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        if let Some(code) = normalize(tag.as_ref())
            && !out.contains(&code)
        {
            out.push(code);
        }
    }
    out
}

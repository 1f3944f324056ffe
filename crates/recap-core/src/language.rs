use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::estimate::is_cjk_ideograph;

const DETECTED_MARKERS: [&str; 2] = ["**Detected Language:**", "**检测语言:**"];

/// Languages the note prompts know how to name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en")]
    English,
    #[serde(rename = "zh")]
    Chinese,
    #[serde(rename = "zh-tw")]
    TraditionalChinese,
    #[serde(rename = "ja")]
    Japanese,
    #[serde(rename = "ko")]
    Korean,
    #[serde(rename = "es")]
    Spanish,
    #[serde(rename = "fr")]
    French,
    #[serde(rename = "de")]
    German,
    #[serde(rename = "it")]
    Italian,
    #[serde(rename = "pt")]
    Portuguese,
    #[serde(rename = "ru")]
    Russian,
    #[serde(rename = "ar")]
    Arabic,
    #[serde(rename = "hi")]
    Hindi,
}

impl Language {
    pub const ALL: [Language; 13] = [
        Language::English,
        Language::Chinese,
        Language::TraditionalChinese,
        Language::Japanese,
        Language::Korean,
        Language::Spanish,
        Language::French,
        Language::German,
        Language::Italian,
        Language::Portuguese,
        Language::Russian,
        Language::Arabic,
        Language::Hindi,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Chinese => "zh",
            Language::TraditionalChinese => "zh-tw",
            Language::Japanese => "ja",
            Language::Korean => "ko",
            Language::Spanish => "es",
            Language::French => "fr",
            Language::German => "de",
            Language::Italian => "it",
            Language::Portuguese => "pt",
            Language::Russian => "ru",
            Language::Arabic => "ar",
            Language::Hindi => "hi",
        }
    }

    /// Native display name used inside prompts.
    pub fn name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Chinese => "中文（简体）",
            Language::TraditionalChinese => "中文（繁体）",
            Language::Japanese => "日本語",
            Language::Korean => "한국어",
            Language::Spanish => "Español",
            Language::French => "Français",
            Language::German => "Deutsch",
            Language::Italian => "Italiano",
            Language::Portuguese => "Português",
            Language::Russian => "Русский",
            Language::Arabic => "العربية",
            Language::Hindi => "हिन्दी",
        }
    }

    pub fn is_chinese(&self) -> bool {
        matches!(self, Language::Chinese | Language::TraditionalChinese)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language: {0}")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let language = match normalized.as_str() {
            "zh" | "zh-cn" | "zh-hans" | "chinese" => Language::Chinese,
            "zh-tw" | "zh-hant" => Language::TraditionalChinese,
            "english" => Language::English,
            other => Language::ALL
                .iter()
                .copied()
                .find(|language| language.code() == other)
                .ok_or_else(|| UnknownLanguage(value.to_string()))?,
        };
        Ok(language)
    }
}

/// Whether translating `source` into `target` changes anything.
///
/// Simplified Chinese aliases (`zh-cn`, `zh-hans`, `chinese`) already parse
/// to one variant; traditional Chinese stays a distinct target.
pub fn should_translate(source: Language, target: Language) -> bool {
    source != target
}

/// Guess the dominant language of a transcript.
///
/// An explicit `**Detected Language:** xx` line written by the transcriber
/// wins; otherwise the share of CJK, kana and hangul characters decides.
pub fn detect_language(text: &str) -> Language {
    for line in text.lines() {
        for marker in DETECTED_MARKERS {
            if let Some(pos) = line.find(marker)
                && let Ok(language) = line[pos + marker.len()..].trim().parse::<Language>()
            {
                return language;
            }
        }
    }

    let mut total = 0usize;
    let mut chinese = 0usize;
    let mut japanese = 0usize;
    let mut korean = 0usize;
    for ch in text.chars() {
        total += 1;
        if is_cjk_ideograph(ch) {
            chinese += 1;
        } else if ('\u{3040}'..='\u{30ff}').contains(&ch) {
            japanese += 1;
        } else if ('\u{ac00}'..='\u{d7af}').contains(&ch) {
            korean += 1;
        }
    }
    if total == 0 {
        return Language::English;
    }

    let ratio = |count: usize| count as f64 / total as f64;
    if ratio(chinese) > 0.1 {
        Language::Chinese
    } else if ratio(japanese) > 0.05 {
        Language::Japanese
    } else if ratio(korean) > 0.05 {
        Language::Korean
    } else {
        Language::English
    }
}

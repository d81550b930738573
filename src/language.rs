use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RelingoError;

/// Language codes understood by the engine. `Auto` is only meaningful as a
/// source language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LanguageCode {
    Auto,
    En,
    ZhCn,
    ZhTw,
    Ja,
    Ko,
    Fr,
    De,
    Es,
    Ru,
    It,
    Pt,
    Ar,
    Hi,
    Th,
    Vi,
    Nl,
    Pl,
    Tr,
    Uk,
}

impl LanguageCode {
    /// Every concrete language, excluding `Auto`.
    pub const ALL: [LanguageCode; 19] = [
        Self::En,
        Self::ZhCn,
        Self::ZhTw,
        Self::Ja,
        Self::Ko,
        Self::Fr,
        Self::De,
        Self::Es,
        Self::Ru,
        Self::It,
        Self::Pt,
        Self::Ar,
        Self::Hi,
        Self::Th,
        Self::Vi,
        Self::Nl,
        Self::Pl,
        Self::Tr,
        Self::Uk,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::En => "en",
            Self::ZhCn => "zh-CN",
            Self::ZhTw => "zh-TW",
            Self::Ja => "ja",
            Self::Ko => "ko",
            Self::Fr => "fr",
            Self::De => "de",
            Self::Es => "es",
            Self::Ru => "ru",
            Self::It => "it",
            Self::Pt => "pt",
            Self::Ar => "ar",
            Self::Hi => "hi",
            Self::Th => "th",
            Self::Vi => "vi",
            Self::Nl => "nl",
            Self::Pl => "pl",
            Self::Tr => "tr",
            Self::Uk => "uk",
        }
    }

    /// English name of the language, used in prompts
    pub fn name(&self) -> &'static str {
        match self {
            Self::Auto => "Auto Detect",
            Self::En => "English",
            Self::ZhCn => "Simplified Chinese",
            Self::ZhTw => "Traditional Chinese",
            Self::Ja => "Japanese",
            Self::Ko => "Korean",
            Self::Fr => "French",
            Self::De => "German",
            Self::Es => "Spanish",
            Self::Ru => "Russian",
            Self::It => "Italian",
            Self::Pt => "Portuguese",
            Self::Ar => "Arabic",
            Self::Hi => "Hindi",
            Self::Th => "Thai",
            Self::Vi => "Vietnamese",
            Self::Nl => "Dutch",
            Self::Pl => "Polish",
            Self::Tr => "Turkish",
            Self::Uk => "Ukrainian",
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto)
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.code())
    }
}

impl FromStr for LanguageCode {
    type Err = RelingoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        let code = match normalized.as_str() {
            "auto" => Self::Auto,
            "en" => Self::En,
            "zh" | "zh-cn" | "zh-hans" => Self::ZhCn,
            "zh-tw" | "zh-hant" => Self::ZhTw,
            "ja" => Self::Ja,
            "ko" => Self::Ko,
            "fr" => Self::Fr,
            "de" => Self::De,
            "es" => Self::Es,
            "ru" => Self::Ru,
            "it" => Self::It,
            "pt" => Self::Pt,
            "ar" => Self::Ar,
            "hi" => Self::Hi,
            "th" => Self::Th,
            "vi" => Self::Vi,
            "nl" => Self::Nl,
            "pl" => Self::Pl,
            "tr" => Self::Tr,
            "uk" => Self::Uk,
            _ => {
                return Err(RelingoError::Validation(format!(
                    "Malformed or unknown language code: '{}'",
                    s
                )));
            }
        };
        Ok(code)
    }
}

impl TryFrom<String> for LanguageCode {
    type Error = RelingoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LanguageCode> for String {
    fn from(code: LanguageCode) -> Self {
        code.code().to_string()
    }
}

/// Best-effort guess of the language of `text` from the scripts it uses.
///
/// Japanese kana wins over Han characters, and Latin text defaults to
/// English. Returns `Auto` when there is nothing to look at.
pub fn detect_language(text: &str) -> LanguageCode {
    let mut kana = 0usize;
    let mut hangul = 0usize;
    let mut han = 0usize;
    let mut cyrillic = 0usize;
    let mut arabic = 0usize;
    let mut thai = 0usize;
    let mut devanagari = 0usize;
    let mut letters = 0usize;

    for c in text.chars().filter(|c| c.is_alphabetic()) {
        letters += 1;
        match c as u32 {
            0x3040..=0x30FF => kana += 1,
            0xAC00..=0xD7AF | 0x1100..=0x11FF => hangul += 1,
            0x4E00..=0x9FFF | 0x3400..=0x4DBF => han += 1,
            0x0400..=0x04FF => cyrillic += 1,
            0x0600..=0x06FF => arabic += 1,
            0x0E00..=0x0E7F => thai += 1,
            0x0900..=0x097F => devanagari += 1,
            _ => {}
        }
    }

    if letters == 0 {
        return LanguageCode::Auto;
    }
    if kana > 0 {
        return LanguageCode::Ja;
    }

    let scripts = [
        (hangul, LanguageCode::Ko),
        (han, LanguageCode::ZhCn),
        (cyrillic, LanguageCode::Ru),
        (arabic, LanguageCode::Ar),
        (thai, LanguageCode::Th),
        (devanagari, LanguageCode::Hi),
    ];

    scripts
        .iter()
        .filter(|(count, _)| *count * 3 >= letters)
        .max_by_key(|(count, _)| *count)
        .map(|(_, code)| *code)
        .unwrap_or(LanguageCode::En)
}

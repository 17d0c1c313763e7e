use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Medium {
    #[serde(rename = "VN")]
    VisualNovel,
    Novel,
    Manga,
    Anime,
}

impl Medium {
    pub fn as_str(self) -> &'static str {
        match self {
            Medium::VisualNovel => "VN",
            Medium::Novel => "Novel",
            Medium::Manga => "Manga",
            Medium::Anime => "Anime",
        }
    }
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Medium {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vn" | "visual-novel" | "visual_novel" | "visualnovel" => Ok(Medium::VisualNovel),
            "novel" => Ok(Medium::Novel),
            "manga" => Ok(Medium::Manga),
            "anime" => Ok(Medium::Anime),
            other => Err(format!(
                "unknown medium '{other}' (expected one of: VN, Novel, Manga, Anime)"
            )),
        }
    }
}

/// Output language for every free-text field the provider writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Zh,
    En,
    Ja,
}

impl Language {
    /// Name used inside provider instructions.
    pub fn prompt_name(self) -> &'static str {
        match self {
            Language::Zh => "Simplified Chinese (简体中文)",
            Language::En => "English",
            Language::Ja => "Japanese (日本語)",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zh" | "cn" => Ok(Language::Zh),
            "en" => Ok(Language::En),
            "ja" | "jp" => Ok(Language::Ja),
            other => Err(format!("unknown language '{other}' (expected zh, en or ja)")),
        }
    }
}

//! 設定
//!
//! 文字列とドキュメントの相互変換における行区切りの扱いを定義

use crate::text::Text;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// 行区切りの扱い
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineSeparator {
    /// `\r\n`・`\r`・`\n` のいずれでも分割し、`\n` で連結する
    #[default]
    Auto,
    /// 指定の文字列のみで分割・連結する
    Fixed(String),
}

/// テキスト変換設定
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextConfig {
    #[serde(default)]
    pub line_separator: LineSeparator,
}

fn default_split() -> &'static Regex {
    static SPLIT: OnceLock<Regex> = OnceLock::new();
    SPLIT.get_or_init(|| Regex::new(r"\r\n?|\n").expect("line break pattern is valid"))
}

impl TextConfig {
    /// 固定の区切り文字列で設定を作成
    pub fn with_separator(separator: impl Into<String>) -> Self {
        Self {
            line_separator: LineSeparator::Fixed(separator.into()),
        }
    }

    /// 固定の区切り文字列（自動判定の場合は `None`）
    pub fn line_separator(&self) -> Option<&str> {
        match &self.line_separator {
            LineSeparator::Auto => None,
            LineSeparator::Fixed(sep) if sep.is_empty() => None,
            LineSeparator::Fixed(sep) => Some(sep),
        }
    }

    /// 文字列を行に分割（常に1行以上を返す）
    pub fn split(&self, s: &str) -> Vec<String> {
        split_lines(s, self.line_separator())
    }

    /// 文字列からドキュメントを作成
    pub fn text(&self, s: &str) -> Text {
        Text::from_lines(self.split(s))
    }

    /// ドキュメントを区切り文字列で連結
    pub fn join(&self, text: &Text) -> String {
        let sep = self.line_separator().unwrap_or("\n");
        let mut result = String::with_capacity(text.len());
        for (i, line) in text.iter_lines().enumerate() {
            if i > 0 {
                result.push_str(sep);
            }
            result.push_str(line);
        }
        result
    }
}

/// 行区切りで分割。`separator` が `None` なら既定の改行パターンを使う
pub(crate) fn split_lines(s: &str, separator: Option<&str>) -> Vec<String> {
    match separator {
        Some(sep) => s.split(sep).map(str::to_string).collect(),
        None => default_split().split(s).map(str::to_string).collect(),
    }
}

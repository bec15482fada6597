//! Supported-language normalization.
//!
//! Only the JavaScript family runs live. Matching is case-insensitive and
//! ignores trailing qualifiers, so `"JavaScript (React)"` and `"jsx/react"`
//! are accepted while `"typescript"` is not.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical names of the supported languages, in display order.
pub const SUPPORTED_LANGUAGES: &[&str] = &["javascript", "jsx"];

/// A language the sandbox can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    /// The componentized variant. Executes with the same runtime; markup
    /// syntax itself is not understood.
    Jsx,
}

impl Language {
    /// Normalizes a user-supplied language label.
    ///
    /// Lowercases, trims, and keeps the leading alphanumeric run before
    /// matching against the allow-list.
    pub fn normalize(raw: &str) -> Option<Language> {
        let lowered = raw.trim().to_ascii_lowercase();
        let head: String = lowered
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        match head.as_str() {
            "javascript" | "js" | "ecmascript" => Some(Language::JavaScript),
            "jsx" => Some(Language::Jsx),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::Jsx => "jsx",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Warning text reported when a run is refused for its language.
pub fn unsupported_message(given: &str) -> String {
    format!(
        "Live execution only supports {}. Current language: {}",
        SUPPORTED_LANGUAGES.join(", "),
        given
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_case_insensitively() {
        assert_eq!(Language::normalize("JavaScript"), Some(Language::JavaScript));
        assert_eq!(Language::normalize("  JS "), Some(Language::JavaScript));
        assert_eq!(Language::normalize("JSX"), Some(Language::Jsx));
    }

    #[test]
    fn tolerates_trailing_qualifiers() {
        assert_eq!(
            Language::normalize("javascript (react)"),
            Some(Language::JavaScript)
        );
        assert_eq!(Language::normalize("jsx/react"), Some(Language::Jsx));
        assert_eq!(
            Language::normalize("javascript-node"),
            Some(Language::JavaScript)
        );
    }

    #[test]
    fn rejects_other_languages() {
        assert_eq!(Language::normalize("python"), None);
        assert_eq!(Language::normalize("typescript"), None);
        assert_eq!(Language::normalize("java"), None);
        assert_eq!(Language::normalize(""), None);
    }

    #[test]
    fn unsupported_message_names_allow_list_and_input() {
        assert_eq!(
            unsupported_message("python"),
            "Live execution only supports javascript, jsx. Current language: python"
        );
    }
}

use serde::{Deserialize, Serialize};

/// Represents ways to locate an element inside one frame
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selector {
    /// Select by CSS selector list
    Css { css: String },
    /// CSS matches whose trimmed text is exactly `text`
    ExactText { css: String, text: String },
    /// CSS matches whose text contains `text`, ignoring case
    HasText { css: String, text: String },
    /// Alternatives, tried in order; the first alternative with a match wins
    Any { alternatives: Vec<Selector> },
    /// Represents an invalid selector string, with a reason.
    Invalid { reason: String },
}

impl Selector {
    pub fn css(css: impl Into<String>) -> Self {
        Selector::Css { css: css.into() }
    }

    pub fn exact_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Selector::ExactText {
            css: css.into(),
            text: text.into(),
        }
    }

    pub fn has_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Selector::HasText {
            css: css.into(),
            text: text.into(),
        }
    }

    pub fn any(alternatives: impl IntoIterator<Item = Selector>) -> Self {
        Selector::Any {
            alternatives: alternatives.into_iter().collect(),
        }
    }

    /// Flattened list of non-`Any` alternatives in priority order.
    pub fn alternatives(&self) -> Vec<&Selector> {
        match self {
            Selector::Any { alternatives } => {
                alternatives.iter().flat_map(|s| s.alternatives()).collect()
            }
            other => vec![other],
        }
    }

    /// Whether an element with the given text passes this selector's text filter.
    /// CSS matching is the engine's job; this only covers the text part.
    pub fn text_matches(&self, element_text: &str) -> bool {
        match self {
            Selector::Css { .. } => true,
            Selector::ExactText { text, .. } => element_text.trim() == text,
            Selector::HasText { text, .. } => element_text
                .to_lowercase()
                .contains(&text.to_lowercase()),
            Selector::Any { alternatives } => {
                alternatives.iter().any(|s| s.text_matches(element_text))
            }
            Selector::Invalid { .. } => false,
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Css { css } => write!(f, "{css}"),
            Selector::ExactText { css, text } => write!(f, "{css} >> exact:{text}"),
            Selector::HasText { css, text } => write!(f, "{css} >> has:{text}"),
            Selector::Any { alternatives } => {
                let parts: Vec<String> = alternatives.iter().map(|s| s.to_string()).collect();
                write!(f, "{}", parts.join(" || "))
            }
            Selector::Invalid { reason } => write!(f, "<invalid: {reason}>"),
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            return Selector::Invalid {
                reason: "empty selector".to_string(),
            };
        }

        // Handle alternatives first
        let parts: Vec<&str> = split_top_level(s, "||").into_iter().map(str::trim).collect();
        if parts.len() > 1 {
            return Selector::any(parts.into_iter().map(Selector::from));
        }

        let pieces = split_top_level(s, ">>");
        if pieces.len() == 1 {
            return Selector::css(s);
        }
        let css = pieces[0].trim();
        let filter = s[pieces[0].len() + ">>".len()..].trim();
        if css.is_empty() {
            return Selector::Invalid {
                reason: format!("missing css before text filter: \"{s}\""),
            };
        }

        match filter {
            _ if filter.starts_with("exact:") => Selector::exact_text(css, &filter["exact:".len()..]),
            _ if filter.starts_with("has:") => Selector::has_text(css, &filter["has:".len()..]),
            _ => Selector::Invalid {
                reason: format!(
                    "Unknown text filter: \"{filter}\". Use 'exact:' or 'has:' after '>>'."
                ),
            },
        }
    }
}

/// Split on `sep` outside quotes, brackets and parentheses.
fn split_top_level<'a>(s: &'a str, sep: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    let mut chars = s.char_indices();
    while let Some((i, c)) = chars.next() {
        match (quote, c) {
            (Some(_), '\\') => {
                chars.next();
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth = depth.saturating_sub(1),
            (None, _) if depth == 0 && s[i..].starts_with(sep) => {
                parts.push(&s[start..i]);
                start = i + sep.len();
                // skip the rest of the separator
                for _ in 1..sep.chars().count() {
                    chars.next();
                }
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

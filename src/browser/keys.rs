//! Key name resolution
//!
//! Maps the key names used in scenarios (`q`, `Escape`, `ArrowUp`, `space`)
//! onto the DOM `key`/`code` pair and legacy virtual key code that a real
//! keyboard would produce, so the target's handlers see realistic events
//! whether they read `event.key`, `event.code` or `event.keyCode`.

use crate::common::{Error, Result};

/// A fully resolved key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDefinition {
    /// DOM `KeyboardEvent.key`
    pub key: String,
    /// DOM `KeyboardEvent.code`
    pub code: String,
    /// Windows virtual key code (`KeyboardEvent.keyCode`)
    pub key_code: i64,
    /// Text inserted by the key, if any
    pub text: Option<String>,
}

/// Named (non-printing or aliased) keys: (name, key, code, key_code, text)
const NAMED_KEYS: &[(&str, &str, &str, i64, Option<&str>)] = &[
    ("escape", "Escape", "Escape", 27, None),
    ("esc", "Escape", "Escape", 27, None),
    ("enter", "Enter", "Enter", 13, Some("\r")),
    ("return", "Enter", "Enter", 13, Some("\r")),
    ("tab", "Tab", "Tab", 9, None),
    ("backspace", "Backspace", "Backspace", 8, None),
    ("delete", "Delete", "Delete", 46, None),
    ("space", " ", "Space", 32, Some(" ")),
    ("arrowup", "ArrowUp", "ArrowUp", 38, None),
    ("up", "ArrowUp", "ArrowUp", 38, None),
    ("arrowdown", "ArrowDown", "ArrowDown", 40, None),
    ("down", "ArrowDown", "ArrowDown", 40, None),
    ("arrowleft", "ArrowLeft", "ArrowLeft", 37, None),
    ("left", "ArrowLeft", "ArrowLeft", 37, None),
    ("arrowright", "ArrowRight", "ArrowRight", 39, None),
    ("right", "ArrowRight", "ArrowRight", 39, None),
    ("shift", "Shift", "ShiftLeft", 16, None),
    ("control", "Control", "ControlLeft", 17, None),
    ("ctrl", "Control", "ControlLeft", 17, None),
    ("alt", "Alt", "AltLeft", 18, None),
    ("meta", "Meta", "MetaLeft", 91, None),
    ("home", "Home", "Home", 36, None),
    ("end", "End", "End", 35, None),
    ("pageup", "PageUp", "PageUp", 33, None),
    ("pagedown", "PageDown", "PageDown", 34, None),
];

/// Punctuation on a US layout: (char, code, key_code)
const PUNCTUATION: &[(char, &str, i64)] = &[
    ('-', "Minus", 189),
    ('=', "Equal", 187),
    (',', "Comma", 188),
    ('.', "Period", 190),
    ('/', "Slash", 191),
    (';', "Semicolon", 186),
    ('\'', "Quote", 222),
    ('[', "BracketLeft", 219),
    (']', "BracketRight", 221),
    ('\\', "Backslash", 220),
    ('`', "Backquote", 192),
];

impl KeyDefinition {
    /// Resolve a key name
    pub fn parse(name: &str) -> Result<Self> {
        let mut chars = name.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Self::from_char(c);
        }

        let lower = name.to_ascii_lowercase();
        if let Some((_, key, code, key_code, text)) =
            NAMED_KEYS.iter().find(|(alias, ..)| *alias == lower)
        {
            return Ok(Self {
                key: key.to_string(),
                code: code.to_string(),
                key_code: *key_code,
                text: text.map(str::to_string),
            });
        }

        // F1..F12
        if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<i64>().ok()) {
            if (1..=12).contains(&n) {
                let key = format!("F{n}");
                return Ok(Self {
                    key: key.clone(),
                    code: key,
                    key_code: 111 + n,
                    text: None,
                });
            }
        }

        Err(Error::UnknownKey(name.to_string()))
    }

    /// Resolve a single printable character
    pub fn from_char(c: char) -> Result<Self> {
        let text = Some(c.to_string());
        if c.is_ascii_alphabetic() {
            let upper = c.to_ascii_uppercase();
            return Ok(Self {
                key: c.to_string(),
                code: format!("Key{upper}"),
                key_code: upper as i64,
                text,
            });
        }
        if c.is_ascii_digit() {
            return Ok(Self {
                key: c.to_string(),
                code: format!("Digit{c}"),
                key_code: c as i64,
                text,
            });
        }
        if c == ' ' {
            return Self::parse("space");
        }
        if let Some((_, code, key_code)) = PUNCTUATION.iter().find(|(p, ..)| *p == c) {
            return Ok(Self {
                key: c.to_string(),
                code: code.to_string(),
                key_code: *key_code,
                text,
            });
        }
        if c.is_control() {
            return Err(Error::UnknownKey(c.escape_default().to_string()));
        }
        // Characters without a physical key still deliver their text
        Ok(Self {
            key: c.to_string(),
            code: String::new(),
            key_code: 0,
            text,
        })
    }
}

impl std::fmt::Display for KeyDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.key == " " {
            write!(f, "Space")
        } else {
            write!(f, "{}", self.key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_map_to_key_codes() {
        let q = KeyDefinition::parse("q").unwrap();
        assert_eq!(q.key, "q");
        assert_eq!(q.code, "KeyQ");
        assert_eq!(q.key_code, 81);
        assert_eq!(q.text.as_deref(), Some("q"));

        let upper = KeyDefinition::parse("Q").unwrap();
        assert_eq!(upper.key, "Q");
        assert_eq!(upper.code, "KeyQ");
    }

    #[test]
    fn test_named_keys_are_case_insensitive() {
        let esc = KeyDefinition::parse("Escape").unwrap();
        assert_eq!(esc, KeyDefinition::parse("esc").unwrap());
        assert_eq!(esc.key_code, 27);
        assert!(esc.text.is_none());

        let up = KeyDefinition::parse("ARROWUP").unwrap();
        assert_eq!(up.key, "ArrowUp");
    }

    #[test]
    fn test_space_and_function_keys() {
        let space = KeyDefinition::parse(" ").unwrap();
        assert_eq!(space.code, "Space");
        assert_eq!(space.to_string(), "Space");

        let f5 = KeyDefinition::parse("F5").unwrap();
        assert_eq!(f5.key_code, 116);
        assert!(KeyDefinition::parse("F13").is_err());
    }

    #[test]
    fn test_digits_and_punctuation() {
        assert_eq!(KeyDefinition::parse("7").unwrap().code, "Digit7");
        assert_eq!(KeyDefinition::parse("/").unwrap().key_code, 191);
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        assert!(matches!(
            KeyDefinition::parse("hyperspace"),
            Err(Error::UnknownKey(_))
        ));
    }
}

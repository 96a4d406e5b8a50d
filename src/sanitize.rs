use thiserror::Error;
use unicode_normalization::{is_nfc, UnicodeNormalization};

/// A playlist that cannot get a local folder this run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidName {
    #[error("playlist \"{raw_name}\" has no alphanumeric characters to build a folder name from")]
    Empty { raw_name: String },

    #[error("playlists {raw_names:?} all map to the folder \"{sanitized_name}\"")]
    Collision {
        sanitized_name: String,
        raw_names: Vec<String>,
    },
}

impl InvalidName {
    /// Raw playlist names affected by this error.
    pub fn raw_names(&self) -> Vec<String> {
        match self {
            InvalidName::Empty { raw_name } => vec![raw_name.clone()],
            InvalidName::Collision { raw_names, .. } => raw_names.clone(),
        }
    }
}

/// Maps a playlist display name to its folder name by dropping every
/// non-alphanumeric character. Names are compared in NFC form, so "Café"
/// keeps its accent whether it was typed composed or decomposed.
///
/// `sanitize("My Playlist #1!") == "MyPlaylist1"`. The result is a fixed point:
/// sanitizing it again returns the same string.
pub fn sanitize(raw_name: &str) -> Result<String, InvalidName> {
    let sanitized: String = raw_name
        .nfc()
        .filter(|c| c.is_alphanumeric())
        .nfc()
        .collect();
    if sanitized.is_empty() {
        return Err(InvalidName::Empty {
            raw_name: raw_name.to_string(),
        });
    }
    Ok(sanitized)
}

/// True when `name` could have been produced by [`sanitize`].
pub fn is_sanitized(name: &str) -> bool {
    !name.is_empty() && name.chars().all(char::is_alphanumeric) && is_nfc(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_whitespace_and_punctuation() {
        assert_eq!(sanitize("My Playlist #1!").unwrap(), "MyPlaylist1");
        assert_eq!(sanitize("Road Trip").unwrap(), "RoadTrip");
        assert_eq!(sanitize("  lo-fi / beats :: 2024  ").unwrap(), "lofibeats2024");
    }

    #[test]
    fn strips_symbols_but_keeps_letters_of_any_script() {
        assert_eq!(sanitize("Café ☕ Mix 🎧").unwrap(), "CaféMix");
        assert_eq!(sanitize("日本の歌").unwrap(), "日本の歌");
    }

    #[test]
    fn decomposed_accents_are_kept() {
        assert_eq!(sanitize("Cafe\u{301} Mix").unwrap(), "Caf\u{e9}Mix");
        assert_eq!(sanitize("Caf\u{e9} Mix").unwrap(), "Caf\u{e9}Mix");
        assert!(!is_sanitized("Cafe\u{301}"));
        assert!(is_sanitized("Caf\u{e9}"));
    }

    #[test]
    fn sanitizing_is_idempotent() {
        for raw in [
            "My Playlist #1!",
            "a.b.c",
            "Ünïcödé -- Names",
            "x",
            "Road Trip",
            "2024",
            "1 2 3 4",
            "Cafe\u{301}",
            "e\u{301}\u{301}!\u{308}",
            "Z\u{335}\u{321}a\u{334}lgo",
            "\u{1100}!\u{1161}",
            "שירים לנסיעה",
            "أغاني 2023",
            "Mix 👩‍👩‍👧 🇦🇷 ok",
            "ｆｕｌｌｗｉｄｔｈ ＡＢＣ",
            "Ⅻ ½ ²",
            "\u{200f}RTL\u{200e}mark",
            "tab\there\nnewline",
        ] {
            let once = sanitize(raw).unwrap();
            let twice = sanitize(&once).unwrap();
            assert_eq!(once, twice, "not a fixed point for {raw:?}");
            assert!(is_sanitized(&once));
        }
    }

    #[test]
    fn all_symbol_name_is_invalid() {
        let err = sanitize("!!! ???").unwrap_err();
        assert_eq!(
            err,
            InvalidName::Empty {
                raw_name: "!!! ???".to_string()
            }
        );
        assert!(sanitize("").is_err());
    }

    #[test]
    fn recognizes_sanitized_names() {
        assert!(is_sanitized("RoadTrip"));
        assert!(!is_sanitized(".cache"));
        assert!(!is_sanitized("Road Trip"));
        assert!(!is_sanitized(""));
    }
}

//! Needle placement and detection on plain text.

use tracing::warn;

use crate::trial::Position;

/// Insert `secret` into `text` at `position`.
///
/// `middle` inserts after the first whitespace at or past the character
/// midpoint, so no word is ever split. Text without such whitespace gets the
/// secret appended on its own line instead.
pub fn insert_secret_message(text: &str, position: Position, secret: &str) -> String {
    match position {
        Position::Control => text.to_string(),
        Position::Start => format!("{secret}\n{text}"),
        Position::End => format!("{text}\n{secret}"),
        Position::Middle => {
            let mid_char = text.chars().count() / 2;
            let mid = text
                .char_indices()
                .nth(mid_char)
                .map(|(i, _)| i)
                .unwrap_or(text.len());
            match text[mid..].char_indices().find(|(_, c)| c.is_whitespace()) {
                Some((offset, ws)) => {
                    let at = mid + offset + ws.len_utf8();
                    format!("{}{secret}\n{}", &text[..at], &text[at..])
                }
                None => {
                    warn!("no whitespace found after midpoint; inserting at end");
                    format!("{text}\n{secret}\n")
                }
            }
        }
    }
}

/// Case-insensitive containment of the expected answer in a model response.
pub fn detect(response: &str, expected: &str) -> bool {
    response.to_lowercase().contains(&expected.to_lowercase())
}

/// Word-level fact embedding used by the quick needle mode.
pub fn embed_fact(context: &str, fact: &str, position: Position) -> String {
    let mut words: Vec<String> = context.split_whitespace().map(str::to_string).collect();
    let idx = match position {
        Position::Control => return words.join(" "),
        Position::Start => 0,
        Position::Middle => words.len() / 2,
        Position::End => words.len(),
    };
    words.insert(idx, format!("\n\nIMPORTANT FACT: {fact}\n\n"));
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "",
        "word",
        "base text",
        "In a hole in the ground there lived a hobbit.",
        "  leading and trailing  ",
        "naïve café — déjà vu über straße",
        "line one\nline two\tline three",
        "nowhitespaceatallinthisverylongtoken",
    ];

    #[test]
    fn test_control_is_identity() {
        for text in SAMPLES {
            assert_eq!(insert_secret_message(text, Position::Control, "SECRET"), *text);
        }
    }

    #[test]
    fn test_start_prefixes_secret() {
        for text in SAMPLES {
            let out = insert_secret_message(text, Position::Start, "SECRET");
            assert!(out.starts_with("SECRET"));
            assert!(out.ends_with(text));
        }
    }

    #[test]
    fn test_end_suffixes_secret() {
        for text in SAMPLES {
            let out = insert_secret_message(text, Position::End, "SECRET");
            assert!(out.ends_with("SECRET"));
            assert!(out.starts_with(text));
        }
    }

    #[test]
    fn test_middle_never_splits_a_word() {
        for text in SAMPLES {
            let out = insert_secret_message(text, Position::Middle, "SECRET");
            let at = out.find("SECRET").unwrap();
            let before = out[..at].chars().last();
            assert!(
                before.map_or(true, char::is_whitespace),
                "split word in {text:?}: {out:?}"
            );
        }
    }

    #[test]
    fn test_middle_keeps_all_original_text() {
        let text = "alpha beta gamma delta";
        let out = insert_secret_message(text, Position::Middle, "SECRET");
        assert_eq!(out.replace("SECRET\n", ""), text);
        assert!(out.starts_with("alpha beta "));
    }

    #[test]
    fn test_middle_advances_past_word() {
        // midpoint (char 6) lands inside "cdefgh"
        let text = "ab cdefgh ij";
        let out = insert_secret_message(text, Position::Middle, "X");
        assert_eq!(out, "ab cdefgh X\nij");
    }

    #[test]
    fn test_middle_without_whitespace_appends() {
        let out = insert_secret_message("abcdef", Position::Middle, "X");
        assert_eq!(out, "abcdef\nX\n");
    }

    #[test]
    fn test_detect_is_case_insensitive() {
        assert!(detect("the code is abc123", "ABC123"));
        assert!(detect("Type 'DQDDI' to enable it", "dqddi"));
        assert!(!detect("no code mentioned", "DQDDI"));
        assert!(!detect("", "DQDDI"));
    }

    #[test]
    fn test_embed_fact_start() {
        let out = embed_fact("word1 word2 word3 word4", "NEEDLE", Position::Start);
        assert!(out.trim().starts_with("IMPORTANT FACT: NEEDLE"));
    }

    #[test]
    fn test_embed_fact_middle() {
        let out = embed_fact("word1 word2 word3 word4", "NEEDLE", Position::Middle);
        let words: Vec<&str> = out.split_whitespace().collect();
        assert_eq!(words.iter().position(|w| *w == "IMPORTANT"), Some(2));
    }

    #[test]
    fn test_embed_fact_end() {
        let out = embed_fact("word1 word2 word3 word4", "NEEDLE", Position::End);
        assert!(out.trim().ends_with("IMPORTANT FACT: NEEDLE"));
    }

    #[test]
    fn test_embed_fact_control_leaves_context() {
        let out = embed_fact("word1  word2", "NEEDLE", Position::Control);
        assert_eq!(out, "word1 word2");
    }
}

//! Haystack material: source texts, article directories, filler text.

use std::path::Path;

use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::{debug, warn};

const FILLER_CHUNK_WORDS: usize = 200;
const LOREM: [&str; 5] = ["Lorem", "ipsum", "dolor", "sit", "amet"];

/// First `max_chars` characters of a UTF-8 text file.
///
/// Sources shorter than `max_chars` are repeated (joined by a blank line)
/// until the target is reached. `None` when the file is missing, unreadable
/// or empty.
pub fn load_text_from_file(path: &Path, max_chars: usize) -> Option<String> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read source text");
            return None;
        }
    };
    if content.trim().is_empty() {
        warn!(path = %path.display(), "source text is empty");
        return None;
    }

    let available = content.chars().count();
    if available >= max_chars {
        return Some(content.chars().take(max_chars).collect());
    }

    debug!(
        path = %path.display(),
        available,
        max_chars,
        "source shorter than target; repeating"
    );
    let mut out = String::with_capacity(max_chars * 4);
    let mut count = 0;
    while count < max_chars {
        if count > 0 {
            out.push_str("\n\n");
            count += 2;
        }
        for c in content.chars() {
            if count >= max_chars {
                break;
            }
            out.push(c);
            count += 1;
        }
    }
    Some(out.chars().take(max_chars).collect())
}

/// Contents of up to `limit` `.txt` files in `dir`, in file-name order.
/// A missing directory yields an empty list.
pub fn load_articles(dir: &Path, limit: usize) -> Vec<String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "articles directory not readable");
            return Vec::new();
        }
    };

    let mut files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    files.sort();

    files
        .into_iter()
        .take(limit)
        .filter_map(|p| match std::fs::read_to_string(&p) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(path = %p.display(), error = %e, "skipping unreadable article");
                None
            }
        })
        .collect()
}

/// About `word_count` words sampled in 200-word chunks from `sources`,
/// with a paragraph break after each chunk. Falls back to lorem ipsum when
/// no source has any words.
pub fn generate_filler_text<R: Rng + ?Sized>(
    word_count: usize,
    sources: &[String],
    rng: &mut R,
) -> String {
    let valid: Vec<Vec<&str>> = sources
        .iter()
        .map(|s| s.split_whitespace().collect::<Vec<_>>())
        .filter(|w| !w.is_empty())
        .collect();

    if valid.is_empty() {
        return LOREM
            .iter()
            .cycle()
            .take(word_count)
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
    }

    let mut collected: Vec<&str> = Vec::with_capacity(word_count + FILLER_CHUNK_WORDS);
    let mut words_taken = 0;
    while words_taken < word_count {
        let Some(words) = valid.choose(rng) else {
            break;
        };
        let chunk = if words.len() > FILLER_CHUNK_WORDS {
            let start = rng.random_range(0..=words.len() - FILLER_CHUNK_WORDS);
            &words[start..start + FILLER_CHUNK_WORDS]
        } else {
            &words[..]
        };
        collected.extend_from_slice(chunk);
        words_taken += chunk.len();
        collected.push("\n\n");
    }
    collected.truncate(word_count);
    collected.join(" ")
}

/// Rough token estimate: whitespace-separated words × 1.3.
pub fn count_tokens(text: &str) -> f64 {
    text.split_whitespace().count() as f64 * 1.3
}

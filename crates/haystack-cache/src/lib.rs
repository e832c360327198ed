pub mod cache;

pub use cache::{canonical_json, key_for, CacheKey, ResponseCache};

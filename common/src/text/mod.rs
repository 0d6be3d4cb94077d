pub mod emoji;
pub mod json_extract;

pub use emoji::limit_emoji_runs;
pub use json_extract::extract_first_object;

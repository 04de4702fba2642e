//! File naming policy for translation results
//!
//! Pure formatting helpers, kept out of the controller so the naming contract
//! can be tested on its own.

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;

/// Extension given to every translation result
pub const TRANSLATED_EXTENSION: &str = "py";

/// Extension expected on uploaded source scripts
pub const SOURCE_EXTENSION: &str = "txt";

/// ` - actor (timestamp)` decoration appended by [`result_file_name`],
/// matched right before the final extension
static RESULT_DECORATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r" - [^()]+ \([^)]+\)(\.[^.]+)$").expect("decoration pattern is valid")
});

/// Strips the last dot-delimited extension, keeping the rest verbatim.
pub fn base_name(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) if idx + 1 < file_name.len() => &file_name[..idx],
        _ => file_name,
    }
}

/// Derives the result file name for a completed job.
///
/// Policy: `{base} - {actor} ({timestamp}).py` with the timestamp taken from
/// the actor's local clock at completion, second resolution.
pub fn result_file_name(source_file_name: &str, actor: &str, completed_at: NaiveDateTime) -> String {
    format!(
        "{} - {} ({}).{}",
        base_name(source_file_name),
        actor,
        completed_at.format("%Y-%m-%d %H:%M:%S"),
        TRANSLATED_EXTENSION
    )
}

/// Appends the source extension unless the name already carries it.
pub fn ensure_txt_extension(name: &str) -> String {
    if name.ends_with(&format!(".{SOURCE_EXTENSION}")) {
        name.to_string()
    } else {
        format!("{name}.{SOURCE_EXTENSION}")
    }
}

/// Undoes the [`result_file_name`] decoration for display purposes.
///
/// `"Example 2 - [email protected] (2025-03-26 10:15:00).py"` renders as
/// `"Example 2.py"`. Names without the decoration pass through unchanged.
pub fn clean_display_name(name: &str) -> String {
    RESULT_DECORATION.replace(name, "$1").into_owned()
}

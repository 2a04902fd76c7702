//! Targeted edits of the deployment descriptor.
//!
//! The descriptor is treated as raw text: only the quoted value of a single
//! `key = "value"` assignment is replaced, every other byte is kept as is.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use regex::Regex;

use crate::error::ProvisionError;
use crate::files::write_private;

pub const DESCRIPTOR_FILE: &str = "wrangler.toml";

/// Replaces the quoted value of the first `key = "..."` assignment. Content
/// without such an assignment is returned unchanged.
pub fn set_string_field(content: &str, key: &str, value: &str) -> String {
    let Ok(pattern) = Regex::new(&format!(
        r#"(?m)^[ \t]*{}[ \t]*=[ \t]*("(?:[^"\\\r\n]|\\.)*")"#,
        regex::escape(key)
    )) else {
        return content.to_string();
    };

    let Some(quoted) = pattern.captures(content).and_then(|c| c.get(1)) else {
        return content.to_string();
    };

    let mut updated = String::with_capacity(content.len() + value.len());
    updated.push_str(&content[..quoted.start()]);
    updated.push('"');
    updated.push_str(&escape(value));
    updated.push('"');
    updated.push_str(&content[quoted.end()..]);
    updated
}

/// Extracts the value of `key` from tool output. Understands `key = "v"`,
/// `key: v`, `"key": "v"` and labels such as `Key Label: v` where the label
/// is the key with underscores read as spaces. Returns an empty string when
/// nothing matches.
pub fn parse_field(content: &str, key: &str) -> String {
    let label = regex::escape(key).replace('_', "[ _]");
    let Ok(pattern) = Regex::new(&format!(
        r#"(?im)^[ \t]*"?{label}"?[ \t]*[:=][ \t]*"?([^"\s,]+)"?"#
    )) else {
        return String::new();
    };

    pattern
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Points the descriptor in `dir` at the given worker and database.
pub fn write_descriptor(
    dir: &Path,
    worker_name: &str,
    database_name: &str,
    database_id: &str,
) -> Result<PathBuf, ProvisionError> {
    let path = dir.join(DESCRIPTOR_FILE);
    if !path.is_file() {
        return Err(ProvisionError::DescriptorNotFound { path });
    }

    debug!("Rewriting deployment descriptor at: {}", path.display());

    let content = fs::read_to_string(&path)?;
    let content = set_string_field(&content, "name", worker_name);
    let content = set_string_field(&content, "database_name", database_name);
    let content = set_string_field(&content, "database_id", database_id);

    write_private(&path, content.as_bytes())?;

    info!(
        "Descriptor now binds worker '{}' to database '{}' ({})",
        worker_name, database_name, database_id
    );

    Ok(path)
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c => escaped.push(c),
        }
    }
    escaped
}

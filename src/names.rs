//! Normalization of free-form identifiers into remote resource names.

/// Remote resource names are limited to this many characters.
pub const MAX_NAME_LENGTH: usize = 63;

/// Used whenever no usable name can be derived from the caller's input.
pub const BASE_NAME: &str = "email-tracker";

/// Lowercases `raw`, maps everything outside `[a-z0-9-]` to `-`, collapses
/// separator runs and trims them from both ends. The result is at most
/// [`MAX_NAME_LENGTH`] characters and may be empty.
pub fn sanitize(raw: &str) -> String {
    let mut sanitized = String::with_capacity(raw.len());

    for c in raw.to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '-'
        };

        if c == '-' && (sanitized.is_empty() || sanitized.ends_with('-')) {
            continue;
        }

        sanitized.push(c);
    }

    truncate(sanitized.trim_end_matches('-'))
}

/// `BASE_NAME` for a blank seed, `BASE_NAME-<sanitized seed>` otherwise.
pub fn default_name(seed: &str) -> String {
    let suffix = sanitize(seed);
    if suffix.is_empty() {
        return BASE_NAME.to_string();
    }

    truncate(&format!("{BASE_NAME}-{suffix}"))
}

// Only ASCII survives sanitizing, so byte slicing is safe here.
fn truncate(name: &str) -> String {
    if name.len() <= MAX_NAME_LENGTH {
        return name.to_string();
    }

    name[..MAX_NAME_LENGTH].trim_end_matches('-').to_string()
}

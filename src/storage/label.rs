/// Turns a display name or an upload filename stem into the stored label.
///
/// Surrounding whitespace is dropped, every run of inner whitespace and
/// every path separator becomes a single `_`. Case is preserved. The rule
/// is idempotent, so applying it at both write and lookup time is safe.
pub fn normalize_label(raw: &str) -> String {
    let mut label = String::with_capacity(raw.len());
    let mut pending_space = false;

    for ch in raw.trim().chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            label.push('_');
            pending_space = false;
        }
        match ch {
            '/' | '\\' => label.push('_'),
            _ => label.push(ch),
        }
    }

    label
}

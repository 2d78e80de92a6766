//! Small helpers for building queries and reading their text results.

/// Strip everything but identifier characters from a MySQL object name.
///
/// Used for option values that are spliced into SQL, such as a system
/// variable name (`@@` prefix optional) or a `db.table` name.
pub fn clean_object_name(name: &str) -> String {
    let name = name.trim();
    let name = name.strip_prefix("@@").unwrap_or(name);
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'))
        .collect()
}

/// Parse a numeric text value as returned by MySQL.
///
/// Boolean-ish system variable values (`ON`, `OFF`, `YES`, `NO`) map to 1 and 0.
pub fn parse_f64(s: &str) -> Option<f64> {
    let s = s.trim();
    match s.to_ascii_uppercase().as_str() {
        "ON" | "YES" | "TRUE" => return Some(1.0),
        "OFF" | "NO" | "FALSE" => return Some(0.0),
        _ => {}
    }
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Quote a string literal for inclusion in SQL.
pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
}

/// Whether a yes/no style option value is enabled.
pub fn option_enabled(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "yes" | "on" | "true" | "enabled" | "1"
    )
}

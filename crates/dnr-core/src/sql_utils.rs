//! SQL identifier quoting utilities
//!
//! Identifiers cannot be bound as parameters, so every dynamic table or
//! column name goes through these helpers. Values are always bound.

/// Quote a SQL identifier to prevent injection.
///
/// # Examples
/// ```
/// use dnr_core::sql_utils::quote_ident;
/// assert_eq!(quote_ident("users"), r#""users""#);
/// assert_eq!(quote_ident(r#"my"table"#), r#""my""table""#);
/// ```
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a potentially schema-qualified name (e.g. `serving.person_360`).
///
/// # Examples
/// ```
/// use dnr_core::sql_utils::quote_qualified;
/// assert_eq!(quote_qualified("silver.contact"), r#""silver"."contact""#);
/// ```
pub fn quote_qualified(name: &str) -> String {
    name.split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

/// Split a schema-qualified name into (schema, table), defaulting to `main`.
///
/// # Examples
/// ```
/// use dnr_core::sql_utils::split_qualified_name;
/// assert_eq!(split_qualified_name("users"), ("main", "users"));
/// assert_eq!(split_qualified_name("serving.tag_detail"), ("serving", "tag_detail"));
/// ```
pub fn split_qualified_name(name: &str) -> (&str, &str) {
    if let Some(pos) = name.rfind('.') {
        (&name[..pos], &name[pos + 1..])
    } else {
        ("main", name)
    }
}

/// Shorten an error message for tabulated summaries
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    let first_line = message.lines().next().unwrap_or("");
    if first_line.chars().count() <= max_chars {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

//! SQL rendering helpers
//!
//! Used by the DuckDB data handle and by the audit SQL attached to
//! validation scenarios. Identifiers are always quoted.

use crate::value::Value;

/// Quote a SQL identifier, doubling embedded double quotes.
///
/// # Examples
/// ```
/// use rf_core::sql_utils::quote_ident;
/// assert_eq!(quote_ident("orders"), r#""orders""#);
/// assert_eq!(quote_ident(r#"my"col"#), r#""my""col""#);
/// ```
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified table name component by component.
///
/// # Examples
/// ```
/// use rf_core::sql_utils::quote_qualified;
/// assert_eq!(quote_qualified("raw.orders"), r#""raw"."orders""#);
/// ```
pub fn quote_qualified(name: &str) -> String {
    name.split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

/// Escape a value for use inside a single-quoted SQL string literal.
pub fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

/// Render a value as a SQL literal
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_finite() => format!("{:?}", f),
        Value::Float(f) => format!("'{}'::DOUBLE", f),
        Value::Text(s) => format!("'{}'", escape_sql_string(s)),
    }
}

/// Comma-separated list of quoted identifiers
pub fn quote_list<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

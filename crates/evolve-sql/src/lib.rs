//! SQL quoting, naming conventions and DDL emission.
//!
//! Everything here is string-level: the schema crate decides *what* to emit,
//! this crate decides how it is spelled for Postgres.

mod ddl;
pub use ddl::*;

/// Postgres truncates identifiers longer than this many bytes.
pub const PG_IDENT_MAX: usize = 63;

/// A PostgreSQL string literal wrapper.
///
/// Display writes the value escaped and quoted with single quotes.
///
/// # Example
/// ```
/// use evolve_sql::Lit;
/// assert_eq!(format!("{}", Lit("foo")), "'foo'");
/// assert_eq!(format!("{}", Lit("it's")), "'it''s'");
/// ```
pub struct Lit<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Lit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'")?;
        for c in self.0.as_ref().chars() {
            if c == '\'' {
                write!(f, "''")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "'")
    }
}

/// A PostgreSQL identifier wrapper.
///
/// Display writes the value escaped and quoted with double quotes.
///
/// # Example
/// ```
/// use evolve_sql::Ident;
/// assert_eq!(format!("{}", Ident("user")), "\"user\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"")?;
        for c in self.0.as_ref().chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// Escape a string literal for SQL.
pub fn escape_string(s: &str) -> String {
    format!("{}", Lit(s))
}

/// Quote a PostgreSQL identifier.
///
/// Always quotes identifiers to avoid issues with reserved keywords like
/// `user`, `order`, `table`, `group`, etc. Doubles any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("{}", Ident(name))
}

/// Convert an entity name (`BlogPost`) into its default storage name (`blog_post`).
///
/// # Examples
///
/// ```
/// assert_eq!(evolve_sql::snake_case("BlogPost"), "blog_post");
/// assert_eq!(evolve_sql::snake_case("post"), "post");
/// assert_eq!(evolve_sql::snake_case("HTTPLog"), "httplog");
/// ```
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

/// Generate a standard index name for a table and fields.
///
/// Uses the convention `idx_{table}_{fields}` where fields are joined by underscore.
///
/// # Examples
///
/// ```
/// assert_eq!(evolve_sql::index_name("post", &["author", "created_at"]), "idx_post_author_created_at");
/// ```
pub fn index_name(table: &str, fields: &[impl AsRef<str>]) -> String {
    let cols: Vec<&str> = fields.iter().map(|c| c.as_ref()).collect();
    bounded_name(&format!("idx_{}_{}", table, cols.join("_")), "idx")
}

/// Generate the default name of a unique constraint.
///
/// The name embeds the entity and field names for readability plus a short
/// hash of both, so two constraints over different field lists never collide
/// even after truncation.
pub fn unique_constraint_name(entity: &str, fields: &[impl AsRef<str>]) -> String {
    let cols: Vec<&str> = fields.iter().map(|c| c.as_ref()).collect();
    let mut hasher = blake3::Hasher::new();
    hasher.update(entity.as_bytes());
    for col in &cols {
        hasher.update(b"\0");
        hasher.update(col.as_bytes());
    }
    let hex = hasher.finalize().to_hex().to_string();
    let suffix = &hex[..5];

    let head = format!("unique_{}_{}", entity, cols.join("_"));
    let max_head_len = PG_IDENT_MAX.saturating_sub(suffix.len() + 1);
    format!("{}_{}", truncate_at_char_boundary(&head, max_head_len), suffix)
}

/// Generate the name of the foreign key constraint backing a joining column.
///
/// # Examples
///
/// ```
/// assert_eq!(evolve_sql::foreign_key_name("comment", "post_id"), "comment_post_id_fkey");
/// ```
pub fn foreign_key_name(table: &str, column: &str) -> String {
    bounded_name(&format!("{}_{}_fkey", table, column), "fk")
}

/// Name of the CHECK constraint attached to an enum domain.
pub fn domain_check_name(domain: &str) -> String {
    bounded_name(&format!("{}_check", domain), "ck")
}

/// Return `name` unchanged if it fits in a Postgres identifier, otherwise a
/// `{prefix}_{hash}`-suffixed truncation that stays deterministic.
fn bounded_name(name: &str, prefix: &str) -> String {
    if name.len() <= PG_IDENT_MAX {
        return name.to_string();
    }
    let hex = blake3::hash(name.as_bytes()).to_hex().to_string();
    let suffix = &hex[..16];
    let max_head_len = PG_IDENT_MAX.saturating_sub(prefix.len() + suffix.len() + 2);
    format!(
        "{}_{}_{}",
        truncate_at_char_boundary(name, max_head_len),
        prefix,
        suffix
    )
}

fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut len = max;
    while len > 0 && !s.is_char_boundary(len) {
        len -= 1;
    }
    &s[..len]
}

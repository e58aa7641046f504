//! DDL statement accumulation.
//!
//! Modifications never talk to a database directly: they push statements into
//! a [`DdlBuilder`], and whoever owns the builder decides where they run.

use crate::{Lit, domain_check_name, quote_ident};

/// A column as it appears in `CREATE TABLE` / `ADD COLUMN`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef<'a> {
    /// Storage column name.
    pub name: &'a str,
    /// Rendered SQL type (already quoted if it is a domain).
    pub sql_type: String,
    /// Whether the column allows NULL.
    pub nullable: bool,
    /// Default value expression, used verbatim.
    pub default: Option<&'a str>,
}

impl ColumnDef<'_> {
    fn to_sql(&self) -> String {
        let mut def = format!("{} {}", quote_ident(self.name), self.sql_type);
        if !self.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = self.default {
            def.push_str(&format!(" DEFAULT {}", default));
        }
        def
    }
}

/// Referential action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferentialAction {
    Restrict,
    Cascade,
    SetNull,
}

impl ReferentialAction {
    pub fn to_sql(self) -> &'static str {
        match self {
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
        }
    }
}

/// A foreign key from one column to another table's column.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyDef<'a> {
    pub name: &'a str,
    pub column: &'a str,
    pub references_table: &'a str,
    pub references_column: &'a str,
    pub on_delete: ReferentialAction,
}

/// Ordered list of DDL statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DdlBuilder {
    statements: Vec<String>,
}

impl DdlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw statement. A trailing `;` is added if missing.
    pub fn push(&mut self, stmt: impl Into<String>) {
        let mut stmt = stmt.into();
        if !stmt.ends_with(';') {
            stmt.push(';');
        }
        self.statements.push(stmt);
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn into_statements(self) -> Vec<String> {
        self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// All statements, one per line.
    pub fn to_sql(&self) -> String {
        self.statements.join("\n")
    }

    pub fn create_table(&mut self, table: &str, columns: &[ColumnDef<'_>], primary_key: &[&str]) {
        let mut parts: Vec<String> = columns
            .iter()
            .map(|col| format!("    {}", col.to_sql()))
            .collect();
        if !primary_key.is_empty() {
            let cols: Vec<String> = primary_key.iter().map(|c| quote_ident(c)).collect();
            parts.push(format!("    PRIMARY KEY ({})", cols.join(", ")));
        }
        self.push(format!(
            "CREATE TABLE {} (\n{}\n)",
            quote_ident(table),
            parts.join(",\n")
        ));
    }

    pub fn drop_table(&mut self, table: &str) {
        self.push(format!("DROP TABLE {}", quote_ident(table)));
    }

    pub fn rename_table(&mut self, from: &str, to: &str) {
        self.push(format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(from),
            quote_ident(to)
        ));
    }

    pub fn add_column(&mut self, table: &str, column: &ColumnDef<'_>) {
        self.push(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_ident(table),
            column.to_sql()
        ));
    }

    pub fn drop_column(&mut self, table: &str, column: &str) {
        self.push(format!(
            "ALTER TABLE {} DROP COLUMN {}",
            quote_ident(table),
            quote_ident(column)
        ));
    }

    pub fn rename_column(&mut self, table: &str, from: &str, to: &str) {
        self.push(format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            quote_ident(table),
            quote_ident(from),
            quote_ident(to)
        ));
    }

    pub fn alter_column_type(&mut self, table: &str, column: &str, sql_type: &str) {
        let column = quote_ident(column);
        self.push(format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{}",
            quote_ident(table),
            column,
            sql_type,
            column,
            sql_type
        ));
    }

    pub fn set_nullable(&mut self, table: &str, column: &str, nullable: bool) {
        let action = if nullable {
            "DROP NOT NULL"
        } else {
            "SET NOT NULL"
        };
        self.push(format!(
            "ALTER TABLE {} ALTER COLUMN {} {}",
            quote_ident(table),
            quote_ident(column),
            action
        ));
    }

    pub fn set_default(&mut self, table: &str, column: &str, default: Option<&str>) {
        let action = match default {
            Some(expr) => format!("SET DEFAULT {}", expr),
            None => "DROP DEFAULT".to_string(),
        };
        self.push(format!(
            "ALTER TABLE {} ALTER COLUMN {} {}",
            quote_ident(table),
            quote_ident(column),
            action
        ));
    }

    pub fn add_foreign_key(&mut self, table: &str, fk: &ForeignKeyDef<'_>) {
        self.push(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} DEFERRABLE INITIALLY IMMEDIATE",
            quote_ident(table),
            quote_ident(fk.name),
            quote_ident(fk.column),
            quote_ident(fk.references_table),
            quote_ident(fk.references_column),
            fk.on_delete.to_sql()
        ));
    }

    pub fn add_unique(&mut self, table: &str, name: &str, columns: &[&str]) {
        let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        self.push(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
            quote_ident(table),
            quote_ident(name),
            cols.join(", ")
        ));
    }

    pub fn drop_constraint(&mut self, table: &str, name: &str) {
        self.push(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            quote_ident(table),
            quote_ident(name)
        ));
    }

    pub fn rename_constraint(&mut self, table: &str, from: &str, to: &str) {
        self.push(format!(
            "ALTER TABLE {} RENAME CONSTRAINT {} TO {}",
            quote_ident(table),
            quote_ident(from),
            quote_ident(to)
        ));
    }

    pub fn create_index(&mut self, name: &str, table: &str, columns: &[&str]) {
        let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        self.push(format!(
            "CREATE INDEX {} ON {} ({})",
            quote_ident(name),
            quote_ident(table),
            cols.join(", ")
        ));
    }

    pub fn drop_index(&mut self, name: &str) {
        self.push(format!("DROP INDEX {}", quote_ident(name)));
    }

    /// Enums are stored as text domains restricted to their values.
    pub fn create_domain(&mut self, name: &str, values: &[impl AsRef<str>]) {
        self.push(format!(
            "CREATE DOMAIN {} AS text CONSTRAINT {} CHECK ({})",
            quote_ident(name),
            quote_ident(&domain_check_name(name)),
            domain_check_expr(values)
        ));
    }

    pub fn replace_domain_check(&mut self, name: &str, values: &[impl AsRef<str>]) {
        let check = quote_ident(&domain_check_name(name));
        self.push(format!(
            "ALTER DOMAIN {} DROP CONSTRAINT {}",
            quote_ident(name),
            check
        ));
        self.push(format!(
            "ALTER DOMAIN {} ADD CONSTRAINT {} CHECK ({})",
            quote_ident(name),
            check,
            domain_check_expr(values)
        ));
    }

    pub fn drop_domain(&mut self, name: &str) {
        self.push(format!("DROP DOMAIN {}", quote_ident(name)));
    }
}

fn domain_check_expr(values: &[impl AsRef<str>]) -> String {
    let lits: Vec<String> = values
        .iter()
        .map(|v| format!("{}", Lit(v.as_ref())))
        .collect();
    format!("VALUE IN ({})", lits.join(", "))
}

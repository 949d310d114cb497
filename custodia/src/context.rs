//! Field context passed to the key-management oracle.

use std::fmt;

/// Identifies the column a ciphertext belongs to.
///
/// Oracles bind the context to the ciphertext (as AAD or as a KMS
/// encryption context), so a token copied into another column, or
/// another table, no longer decrypts.
///
/// # Example
///
/// ```
/// use custodia::context::FieldContext;
///
/// let ctx = FieldContext::new("customers", "email");
/// assert_eq!(ctx.to_string(), "customers|email");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldContext {
    table_name: String,
    column_name: String,
}

impl FieldContext {
    /// Creates a new field context.
    #[must_use]
    pub fn new(table_name: impl Into<String>, column_name: impl Into<String>) -> Self {
        Self { table_name: table_name.into(), column_name: column_name.into() }
    }

    /// Returns the table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Returns the column name.
    #[must_use]
    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    /// Key/value pairs for oracles that take a string map.
    #[must_use]
    pub fn pairs(&self) -> [(&'static str, &str); 2] {
        [("table", self.table_name.as_str()), ("column", self.column_name.as_str())]
    }
}

impl fmt::Display for FieldContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.table_name, self.column_name)
    }
}

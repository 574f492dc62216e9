//! Identifier validation and quoting for generated SQL.
//!
//! Table and column names cannot be bound as statement parameters, so every
//! generated statement renders them through these functions: validate first,
//! then delimit with double quotes and escape embedded quotes by doubling.

use crate::error::{CloneError, Result};

/// PostgreSQL truncates identifiers beyond this length; longer names coming
/// out of a catalog query indicate something malformed.
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validate an identifier before it is rendered into SQL.
///
/// Rejects empty names, names containing NUL bytes, and names exceeding the
/// PostgreSQL identifier length limit.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CloneError::Schema("identifier is empty".to_string()));
    }

    if name.contains('\0') {
        return Err(CloneError::Schema(format!(
            "identifier contains NUL byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(CloneError::Schema(format!(
            "identifier exceeds {} bytes: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }

    Ok(())
}

/// Quote an identifier, escaping embedded double quotes by doubling them.
pub fn quote_ident(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Render a schema-qualified table reference.
pub fn qualify(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_ident(schema)?, quote_ident(table)?))
}

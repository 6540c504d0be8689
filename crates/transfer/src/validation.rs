use std::path::{Component, Path};

use crate::TransferError;

/// Validates a client-supplied filename before it is joined to a storage
/// directory as `{transfer_id}_{filename}`.
///
/// Rejects:
/// - Empty names
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Parent directory traversal (`..`) and `.`
/// - Any path separator, so the name stays a single component
/// - NUL bytes
pub fn validate_filename(filename: &str) -> Result<(), TransferError> {
    if filename.is_empty() {
        return Err(TransferError::InvalidFilename("empty filename".into()));
    }

    if filename.contains('\0') {
        return Err(TransferError::InvalidFilename(format!(
            "NUL byte not allowed: {filename:?}"
        )));
    }

    if filename.contains('/') || filename.contains('\\') {
        return Err(TransferError::InvalidFilename(format!(
            "path separator not allowed: {filename}"
        )));
    }

    let path = Path::new(filename);

    if path.is_absolute() {
        return Err(TransferError::InvalidFilename(format!(
            "absolute path not allowed: {filename}"
        )));
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir), _) => Err(TransferError::InvalidFilename(format!(
            "parent directory traversal not allowed: {filename}"
        ))),
        (Some(Component::Prefix(_)), _) => Err(TransferError::InvalidFilename(format!(
            "path prefix not allowed: {filename}"
        ))),
        _ => Err(TransferError::InvalidFilename(format!(
            "not a plain filename: {filename}"
        ))),
    }
}

use crate::StoreError;

/// Longest accepted file hash or chunk key.
const MAX_NAME_LEN: usize = 128;

/// Validates a file identity before it is used to build paths.
///
/// Only ASCII alphanumerics are accepted. This keeps a hash from ever naming
/// a staging directory, a temp file or a parent directory.
pub fn validate_file_hash(file_hash: &str) -> Result<(), StoreError> {
    if file_hash.is_empty() {
        return Err(StoreError::InvalidInput("empty file hash".into()));
    }
    if file_hash.len() > MAX_NAME_LEN {
        return Err(StoreError::InvalidInput(format!(
            "file hash longer than {MAX_NAME_LEN} characters"
        )));
    }
    if !file_hash.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(StoreError::InvalidInput(format!(
            "file hash must be alphanumeric: {file_hash}"
        )));
    }
    Ok(())
}

/// Validates a chunk key before it is used as a file name.
///
/// Rejects:
/// - Empty keys
/// - Keys starting with `.` (hidden files are reserved for temp writes)
/// - Anything outside `[A-Za-z0-9._-]`, which rules out separators
pub fn validate_chunk_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidChunkKey("empty key".into()));
    }
    if key.len() > MAX_NAME_LEN * 2 {
        return Err(StoreError::InvalidChunkKey(format!(
            "key too long: {} bytes",
            key.len()
        )));
    }
    if key.starts_with('.') {
        return Err(StoreError::InvalidChunkKey(format!(
            "hidden names not allowed: {key}"
        )));
    }
    if !key
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
    {
        return Err(StoreError::InvalidChunkKey(format!(
            "unsupported characters: {key}"
        )));
    }
    Ok(())
}

/// Validates the extension appended to a merged file's name.
///
/// An empty extension is allowed. Path separators and NUL are not.
pub fn validate_ext(ext: &str) -> Result<(), StoreError> {
    if ext.contains(['/', '\\', '\0']) {
        return Err(StoreError::InvalidInput(format!(
            "extension contains a path separator: {ext}"
        )));
    }
    if ext.len() > MAX_NAME_LEN {
        return Err(StoreError::InvalidInput(format!(
            "extension longer than {MAX_NAME_LEN} bytes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_md5_hex() {
        assert!(validate_file_hash("5eb63bbbe01eeed093cb22bb8f5acdc3").is_ok());
    }

    #[test]
    fn rejects_empty_hash() {
        assert!(validate_file_hash("").is_err());
    }

    #[test]
    fn rejects_hash_traversal() {
        assert!(validate_file_hash("../../etc").is_err());
        assert!(validate_file_hash("..").is_err());
    }

    #[test]
    fn rejects_hash_with_separator() {
        assert!(validate_file_hash("abc/def").is_err());
        assert!(validate_file_hash("abc\\def").is_err());
    }

    #[test]
    fn rejects_overlong_hash() {
        assert!(validate_file_hash(&"a".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn accepts_chunk_keys() {
        assert!(validate_chunk_key("5eb63bbbe01eeed093cb22bb8f5acdc3-0").is_ok());
        assert!(validate_chunk_key("abc.12").is_ok());
        assert!(validate_chunk_key("a_b-3").is_ok());
    }

    #[test]
    fn rejects_hidden_and_traversal_keys() {
        assert!(validate_chunk_key(".abc-1").is_err());
        assert!(validate_chunk_key("..").is_err());
        assert!(validate_chunk_key("../x-1").is_err());
    }

    #[test]
    fn rejects_key_with_separator() {
        assert!(matches!(
            validate_chunk_key("a/b-1"),
            Err(StoreError::InvalidChunkKey(_))
        ));
    }

    #[test]
    fn ext_rules() {
        assert!(validate_ext("").is_ok());
        assert!(validate_ext(".mp4").is_ok());
        assert!(validate_ext("./../x").is_err());
        assert!(validate_ext(".a\\b").is_err());
    }
}

//! Naming rules shared by both ends of the wire.

/// Returns everything from the last `.` of `file_name` (inclusive).
///
/// Names without a `.` have an empty extension.
pub fn extract_ext(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) => &file_name[idx..],
        None => "",
    }
}

/// Builds the key a chunk is stored under.
pub fn chunk_key(file_hash: &str, index: u64) -> String {
    format!("{file_hash}-{index}")
}

/// Recovers the position index embedded in a chunk key.
///
/// The index is the run of decimal digits after the last `-` or `.`.
/// Keys must never be ordered by their raw string form: `h-10` sorts before
/// `h-2` lexicographically.
pub fn parse_chunk_index(key: &str) -> Option<u64> {
    let (_, tail) = key.rsplit_once(['-', '.'])?;
    if tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    tail.parse().ok()
}

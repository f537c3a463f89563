use sha2::{Digest, Sha256};

/// Convert `\r\n` and lone `\r` line endings to `\n`.
pub fn normalize_line_endings(source: &str) -> String {
    source.replace("\r\n", "\n").replace('\r', "\n")
}

/// Lowercase hex SHA-256 of the normalized source text.
///
/// Texts that differ only in line endings hash to the same key.
pub fn content_hash(source: &str) -> String {
    let normalized = normalize_line_endings(source);
    let digest = Sha256::digest(normalized.as_bytes());
    format!("{:x}", digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_endings_do_not_change_hash() {
        assert_eq!(content_hash("a = 1;\r\nb = 2;"), content_hash("a = 1;\nb = 2;"));
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = content_hash("");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_normalize_lone_carriage_return() {
        assert_eq!(normalize_line_endings("a\rb\r\nc"), "a\nb\nc");
    }
}

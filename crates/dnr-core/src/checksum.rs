//! SHA-256 hashing for file lineage and row audit.

use sha2::{Digest, Sha256};

/// Compute SHA256 checksum of a string
pub fn compute_checksum(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Content hash of an export file, used as the lineage idempotence key.
///
/// Line endings are normalised to `\n` and whitespace-only lines are left
/// out, so re-uploading a file with extra blank lines yields the same hash.
/// Blank lines inside an open double-quoted field are cell content and are
/// kept.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    let mut in_quotes = false;
    for line in content.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() && !in_quotes {
            continue;
        }
        // An escaped quote ("") toggles twice
        if line.matches('"').count() % 2 == 1 {
            in_quotes = !in_quotes;
        }
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_hex_sha256() {
        let sum = compute_checksum("abc");
        assert_eq!(sum, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[test]
    fn test_trailing_blank_line_does_not_change_hash() {
        let original = "id,email\n1,a@x.com\n";
        let reuploaded = "id,email\n1,a@x.com\n\n";
        assert_eq!(content_hash(original), content_hash(reuploaded));
    }

    #[test]
    fn test_crlf_matches_lf() {
        assert_eq!(content_hash("id\r\n1\r\n"), content_hash("id\n1\n"));
    }

    #[test]
    fn test_blank_line_inside_quoted_cell_is_content() {
        let one_paragraph = "id,note\n1,\"first\nsecond\"\n";
        let two_paragraphs = "id,note\n1,\"first\n\nsecond\"\n";
        assert_ne!(content_hash(one_paragraph), content_hash(two_paragraphs));
        assert_eq!(
            content_hash(two_paragraphs),
            content_hash("id,note\n1,\"first\n\nsecond\"\n\n\n")
        );
    }

    #[test]
    fn test_escaped_quote_does_not_open_a_field() {
        let quoted = "id,note\n1,\"say \"\"hi\"\"\"\n";
        assert_eq!(content_hash(quoted), content_hash(&format!("{quoted}\n\n")));
    }

    #[test]
    fn test_content_change_changes_hash() {
        assert_ne!(content_hash("id\n1\n"), content_hash("id\n2\n"));
    }
}

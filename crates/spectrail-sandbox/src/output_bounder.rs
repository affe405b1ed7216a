//! Truncation of tool output to a declared cap, with the clip/truncated/total_size
//! bookkeeping every repo-content-bearing tool result needs to report.

/// Result of bounding a piece of text or bytes to a cap.
#[derive(Clone, Debug)]
pub struct Bounded<T> {
    pub clipped: T,
    pub truncated: bool,
    pub total_size: usize,
}

/// Clip `text` to at most `cap` bytes, backing off to the nearest valid UTF-8 boundary
/// rather than splitting a multi-byte code point.
pub fn bound_text(text: &str, cap: usize) -> Bounded<String> {
    let total_size = text.len();
    if total_size <= cap {
        return Bounded { clipped: text.to_string(), truncated: false, total_size };
    }

    let mut end = cap;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    Bounded { clipped: text[..end].to_string(), truncated: true, total_size }
}

/// Clip `bytes` to at most `cap` bytes, byte-exact (no code-point alignment needed).
pub fn bound_bytes(bytes: &[u8], cap: usize) -> Bounded<Vec<u8>> {
    let total_size = bytes.len();
    if total_size <= cap {
        return Bounded { clipped: bytes.to_vec(), truncated: false, total_size };
    }
    Bounded { clipped: bytes[..cap].to_vec(), truncated: true, total_size }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_under_cap_is_not_truncated() {
        let b = bound_text("hello", 10);
        assert!(!b.truncated);
        assert_eq!(b.clipped, "hello");
        assert_eq!(b.total_size, 5);
    }

    #[test]
    fn text_at_cap_is_not_truncated() {
        let b = bound_text("hello", 5);
        assert!(!b.truncated);
    }

    #[test]
    fn text_over_cap_is_truncated() {
        let b = bound_text("hello world", 5);
        assert!(b.truncated);
        assert_eq!(b.clipped, "hello");
        assert_eq!(b.total_size, 11);
    }

    #[test]
    fn text_truncation_backs_off_to_char_boundary() {
        // "café" — é is 2 bytes in UTF-8, so a cap of 4 lands mid-character.
        let s = "café";
        assert_eq!(s.len(), 5);
        let b = bound_text(s, 4);
        assert!(b.truncated);
        assert!(b.clipped.is_char_boundary(b.clipped.len()));
        assert_eq!(b.clipped, "caf");
    }

    #[test]
    fn bytes_truncation_is_byte_exact() {
        let data = vec![1u8, 2, 3, 4, 5];
        let b = bound_bytes(&data, 3);
        assert!(b.truncated);
        assert_eq!(b.clipped, vec![1, 2, 3]);
        assert_eq!(b.total_size, 5);
    }
}

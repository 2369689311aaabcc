//! Locating entity values in source text.
//!
//! Offsets are byte offsets into the original (not lowercased) text, so they
//! stay valid even when case folding changes a character's encoded length.

/// Characters of context kept on each side of a located value.
pub const SNIPPET_RADIUS: usize = 80;

/// First case-insensitive occurrence of `needle` in `text`.
///
/// Only the first match is reported; later repeats are not located.
#[must_use]
pub fn locate(text: &str, needle: &str) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }
    let folded: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();

    text.char_indices().find_map(|(start, _)| {
        folded_prefix_len(&text[start..], &folded).map(|len| (start, start + len))
    })
}

/// Byte length of the prefix of `haystack` that case-folds to `needle`.
fn folded_prefix_len(haystack: &str, needle: &[char]) -> Option<usize> {
    let mut matched = 0;
    for (offset, c) in haystack.char_indices() {
        for lower in c.to_lowercase() {
            if needle.get(matched) != Some(&lower) {
                return None;
            }
            matched += 1;
        }
        if matched == needle.len() {
            return Some(offset + c.len_utf8());
        }
    }
    None
}

/// Text around `span`, widened by `radius` characters each side, clamped to
/// the text and trimmed. Empty when there is no span.
#[must_use]
pub fn snippet(text: &str, span: Option<(usize, usize)>, radius: usize) -> String {
    let Some((start, end)) = span else {
        return String::new();
    };
    if start > end
        || end > text.len()
        || !text.is_char_boundary(start)
        || !text.is_char_boundary(end)
    {
        return String::new();
    }

    let left = text[..start]
        .char_indices()
        .rev()
        .take(radius)
        .last()
        .map_or(start, |(i, _)| i);
    let right = text[end..]
        .char_indices()
        .nth(radius)
        .map_or(text.len(), |(i, _)| end + i);

    text[left..right].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_case_insensitive() {
        let text = "Invoice for ACME Corp, payable to Acme Corp.";
        assert_eq!(locate(text, "acme corp"), Some((12, 21)));
        assert_eq!(&text[12..21], "ACME Corp");
    }

    #[test]
    fn test_locate_empty_or_missing() {
        assert_eq!(locate("some text", ""), None);
        assert_eq!(locate("some text", "missing-value-xyz"), None);
        assert_eq!(locate("", "x"), None);
    }

    #[test]
    fn test_locate_offsets_in_original_text() {
        let text = "Straße GROẞ und Groß";
        let span = locate(text, "groß").unwrap();
        assert!(text.is_char_boundary(span.0) && text.is_char_boundary(span.1));
        assert!(text[span.0..span.1].to_lowercase().contains("gro"));
    }

    #[test]
    fn test_snippet_clamped_and_trimmed() {
        let text = "  short text with jane@example.com inside  ";
        let span = locate(text, "jane@example.com");
        assert_eq!(
            snippet(text, span, SNIPPET_RADIUS),
            "short text with jane@example.com inside"
        );
    }

    #[test]
    fn test_snippet_radius() {
        let text = "0123456789TARGET0123456789";
        let span = locate(text, "target");
        assert_eq!(snippet(text, span, 3), "789TARGET012");
    }

    #[test]
    fn test_snippet_without_span() {
        assert_eq!(snippet("anything", None, SNIPPET_RADIUS), "");
    }

    #[test]
    fn test_snippet_counts_characters() {
        let text = "ééééXéééé";
        let span = locate(text, "x");
        assert_eq!(snippet(text, span, 2), "ééXéé");
    }
}

//! Search-term matching over extracted page text.

/// Case-insensitive substring test.
pub fn matches(text: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    text.to_lowercase().contains(&term.to_lowercase())
}

/// Extracts one snippet per occurrence of `term`, with up to `radius`
/// characters of context on each side.
///
/// Matching is case-insensitive; snippets are taken from the original text.
pub fn snippets(text: &str, term: &str, radius: usize) -> Vec<String> {
    let needle = term.to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    let lowered = text.to_lowercase();

    let mut out = Vec::new();
    for (offset, matched) in lowered.match_indices(&needle) {
        // Case folding can shift byte offsets for non-ASCII text; snap back
        // onto a char boundary of the original rather than panic on a slice.
        let start = snap_to_boundary(text, offset.min(text.len()));
        let end = snap_to_boundary(text, (start + matched.len()).min(text.len()));

        let from = step_back(text, start, radius);
        let to = step_forward(text, end, radius);
        let snippet = text[from..to].trim();
        if !snippet.is_empty() {
            out.push(snippet.to_string());
        }
    }
    out
}

fn snap_to_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn step_back(text: &str, from: usize, chars: usize) -> usize {
    text[..from]
        .char_indices()
        .rev()
        .take(chars)
        .last()
        .map(|(idx, _)| idx)
        .unwrap_or(from)
}

fn step_forward(text: &str, from: usize, chars: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(chars)
        .map(|(idx, _)| from + idx)
        .unwrap_or(text.len())
}

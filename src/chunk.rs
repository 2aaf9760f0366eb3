//! Overlapping word-window chunker.
//!
//! Text is first cleaned ([`clean_text`]) and then cut into windows of
//! `length` whitespace-delimited words that advance by `length - overlap`
//! words ([`split_words`]). Boundaries are word counts only; sentences are
//! not respected. The final window may be shorter than `length`.
//!
//! For `W > 0` words the number of windows is `ceil((W - O) / (L - O))`,
//! which is exactly one whenever `W <= L`. Empty input yields no windows.

/// Normalize raw document text before splitting.
///
/// Drops a leading byte-order mark, turns whitespace control characters
/// (form feed, lone `\r`, vertical tab) into spaces, drops other control
/// characters, collapses runs of whitespace inside each line to a single space,
/// trims every line and removes lines that end up empty.
pub fn clean_text(text: &str) -> String {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    text.lines()
        .map(|line| {
            line.chars()
                .map(|c| if c.is_whitespace() { ' ' } else { c })
                .filter(|c| !c.is_control())
                .collect::<String>()
        })
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split text into overlapping windows of `length` words.
///
/// Each window is returned as its words joined by a single space.
///
/// # Panics
///
/// Panics if `length == 0` or `overlap >= length`; configuration loading
/// rejects both.
pub fn split_words(text: &str, length: usize, overlap: usize) -> Vec<String> {
    assert!(length > 0, "split length must be > 0");
    assert!(overlap < length, "split overlap must be smaller than length");

    let words: Vec<&str> = text.split_whitespace().collect();
    let step = length - overlap;
    let mut windows = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + length).min(words.len());
        windows.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }

    windows
}

/// Number of windows [`split_words`] produces for `word_count` words.
pub fn expected_chunk_count(word_count: usize, length: usize, overlap: usize) -> usize {
    if word_count == 0 {
        return 0;
    }
    if word_count <= length {
        return 1;
    }
    let step = length - overlap;
    (word_count - overlap).div_ceil(step)
}

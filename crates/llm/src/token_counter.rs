//! Character-based token estimate for vendors that report no usage.

/// `ceil((len(prompt) + len(response)) / 4)`, lengths in UTF-16 code units.
///
/// This is the arithmetic usage tracking has always relied on, not a tokenizer.
pub fn estimate_tokens(prompt: &str, response: &str) -> u64 {
    let characters = prompt.encode_utf16().count() + response.encode_utf16().count();
    characters.div_ceil(4) as u64
}

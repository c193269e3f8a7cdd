//! Oversized-reply chunking.
//!
//! The channel caps a single message at [`MAX_MESSAGE_LEN`] characters.
//! Longer replies are split at sentence boundaries and sent as a sequence
//! of messages; a chunk never ends mid-sentence.

/// Maximum length of a single outbound message.
pub const MAX_MESSAGE_LEN: usize = 4096;

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Split into sentences: each a maximal run of non-terminator characters
/// followed by one or more of `.`, `!`, `?`. A trailing run without a
/// terminator is kept as a final sentence so no text is dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut in_terminators = false;
    for (idx, c) in text.char_indices() {
        if is_terminator(c) {
            in_terminators = true;
        } else if in_terminators {
            sentences.push(&text[start..idx]);
            start = idx;
            in_terminators = false;
        }
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

/// Greedily pack sentences into chunks of at most `max_len` bytes.
///
/// Text that already fits is returned as a single chunk, unmodified. A
/// single sentence longer than `max_len` is emitted whole as its own chunk
/// rather than truncated mid-word.
#[must_use]
pub fn chunk_reply(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut chunk = String::new();
    for sentence in split_sentences(text) {
        if !chunk.is_empty() && chunk.len() + sentence.len() > max_len {
            chunks.push(chunk.trim().to_string());
            chunk.clear();
        }
        chunk.push_str(sentence);
    }
    if !chunk.trim().is_empty() {
        chunks.push(chunk.trim().to_string());
    }
    chunks
}

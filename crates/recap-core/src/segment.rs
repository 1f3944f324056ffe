//! Splits a document into bounded chunks for the completion service.
//!
//! Three passes, each only applied to what the previous one left oversized:
//!
//! ```text
//! 1. paragraphs   blank-line separated blocks, greedily packed
//! 2. sentences    . ! ? 。 ！ ？ boundaries, greedily packed
//! 3. force split  punctuation past 70% > whitespace past 80% > word-safe cut
//! ```
//!
//! Lengths are counted in `char`s. Whitespace at chunk edges is trimmed and
//! packed pieces are re-joined with normalised separators, so the chunks
//! reproduce the input modulo whitespace. A chunk only exceeds the budget
//! when it is a single word longer than the budget.

use crate::error::SegmentError;
use crate::estimate::is_cjk_ideograph;

pub const SENTENCE_ENDINGS: [char; 6] = ['。', '！', '？', '.', '!', '?'];

const PARAGRAPH_JOIN: &str = "\n\n";
const PUNCT_WINDOW_PERCENT: usize = 70;
const SPACE_WINDOW_PERCENT: usize = 80;

/// Split `text` into ordered, non-empty chunks of at most `max_chars` characters.
pub fn segment(
    text: &str,
    max_chars: usize,
    prefer_paragraphs: bool,
) -> Result<Vec<String>, SegmentError> {
    if max_chars == 0 {
        return Err(SegmentError::ZeroBudget);
    }

    let blocks = if prefer_paragraphs {
        pack(split_paragraphs(text), max_chars, |_| PARAGRAPH_JOIN)
    } else {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        }
    };

    let mut chunks = Vec::with_capacity(blocks.len());
    for block in blocks {
        if char_len(&block) <= max_chars {
            chunks.push(block);
            continue;
        }
        for piece in pack_sentences(split_sentences(&block), max_chars) {
            if char_len(&piece) <= max_chars {
                chunks.push(piece);
            } else {
                chunks.extend(force_split(&piece, max_chars));
            }
        }
    }
    Ok(chunks)
}

pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Greedy accumulation: flush the buffer when the next item would overflow it.
/// An item that alone exceeds the budget is kept whole for a later pass.
fn pack<I>(items: I, max_chars: usize, join: fn(&str) -> &'static str) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out = Vec::new();
    let mut buffer = String::new();
    let mut buffer_len = 0usize;

    for item in items {
        let item_len = char_len(&item);
        if buffer.is_empty() {
            buffer = item;
            buffer_len = item_len;
            continue;
        }
        let sep = join(&buffer);
        let candidate_len = buffer_len + char_len(sep) + item_len;
        if candidate_len > max_chars {
            out.push(std::mem::replace(&mut buffer, item));
            buffer_len = item_len;
        } else {
            buffer.push_str(sep);
            buffer.push_str(&item);
            buffer_len = candidate_len;
        }
    }
    if !buffer.is_empty() {
        out.push(buffer);
    }
    out
}

/// Pack sentences back together up to `max_chars`, joined the way the script
/// of the previous sentence expects.
pub(crate) fn pack_sentences(sentences: Vec<String>, max_chars: usize) -> Vec<String> {
    pack(sentences, max_chars, sentence_join)
}

fn sentence_join(previous: &str) -> &'static str {
    match previous.chars().last() {
        Some(ch) if is_cjk(ch) => "",
        _ => " ",
    }
}

/// Blank-line separated paragraphs, trimmed, empties dropped.
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            flush_paragraph(&mut current, &mut paragraphs);
        } else {
            current.push(line);
        }
    }
    flush_paragraph(&mut current, &mut paragraphs);
    paragraphs
}

fn flush_paragraph(lines: &mut Vec<&str>, out: &mut Vec<String>) {
    if lines.is_empty() {
        return;
    }
    let paragraph = lines.join("\n");
    let trimmed = paragraph.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    lines.clear();
}

/// Sentences with their terminating punctuation attached.
///
/// ASCII terminators only end a sentence when followed by whitespace (so
/// `3.14` and `example.com` stay whole); CJK terminators always do.
pub(crate) fn split_sentences(block: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = block.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let (_, ch) = chars[i];
        if !SENTENCE_ENDINGS.contains(&ch) {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        while j < chars.len() && SENTENCE_ENDINGS.contains(&chars[j].1) {
            j += 1;
        }
        let at_end = j == chars.len();
        let boundary = at_end || chars[j].1.is_whitespace() || !ch.is_ascii();
        if boundary {
            let end = if at_end { block.len() } else { chars[j].0 };
            push_trimmed(&block[start..end], &mut sentences);
            start = end;
        }
        i = j;
    }
    push_trimmed(&block[start..], &mut sentences);
    sentences
}

fn push_trimmed(piece: &str, out: &mut Vec<String>) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Last-resort splitting of a run with no usable sentence boundary.
fn force_split(piece: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = piece.chars().collect();
    let mut out = Vec::new();
    let mut pos = 0usize;

    while pos < chars.len() {
        while pos < chars.len() && chars[pos].is_whitespace() {
            pos += 1;
        }
        if pos >= chars.len() {
            break;
        }
        let limit = (pos + max_chars).min(chars.len());
        let end = if limit < chars.len() {
            find_cut(&chars, pos, limit, max_chars)
        } else {
            limit
        };
        let text: String = chars[pos..end].iter().collect();
        push_trimmed(&text, &mut out);
        pos = end;
    }
    out
}

fn find_cut(chars: &[char], pos: usize, limit: usize, max_chars: usize) -> usize {
    let punct_floor = pos + max_chars * PUNCT_WINDOW_PERCENT / 100;
    for idx in (punct_floor + 1..limit).rev() {
        if SENTENCE_ENDINGS.contains(&chars[idx]) && is_safe_cut(chars, idx + 1) {
            return idx + 1;
        }
    }

    let space_floor = pos + max_chars * SPACE_WINDOW_PERCENT / 100;
    for idx in (space_floor + 1..limit).rev() {
        if chars[idx].is_whitespace() {
            return idx;
        }
    }

    if is_safe_cut(chars, limit) {
        return limit;
    }

    // The limit falls inside a word: back up to its start, or keep the word
    // whole when it alone is longer than the budget.
    let mut word_start = limit;
    while word_start > pos && is_word_char(chars[word_start - 1]) {
        word_start -= 1;
    }
    if word_start > pos {
        return word_start;
    }
    let mut word_end = limit;
    while word_end < chars.len() && is_word_char(chars[word_end]) {
        word_end += 1;
    }
    word_end
}

fn is_safe_cut(chars: &[char], at: usize) -> bool {
    if at == 0 || at >= chars.len() {
        return true;
    }
    !(is_word_char(chars[at - 1]) && is_word_char(chars[at]))
}

/// Characters that glue into space-delimited words.
fn is_word_char(ch: char) -> bool {
    !ch.is_whitespace() && !is_cjk(ch)
}

/// Scripts written without spaces, where any character boundary is a valid cut.
fn is_cjk(ch: char) -> bool {
    is_cjk_ideograph(ch)
        || ('\u{3000}'..='\u{30ff}').contains(&ch)
        || ('\u{3400}'..='\u{4dbf}').contains(&ch)
        || ('\u{ac00}'..='\u{d7af}').contains(&ch)
        || ('\u{ff00}'..='\u{ffef}').contains(&ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squash(text: &str) -> String {
        text.chars().filter(|ch| !ch.is_whitespace()).collect()
    }

    fn assert_complete(text: &str, chunks: &[String]) {
        assert_eq!(squash(text), squash(&chunks.concat()));
    }

    #[test]
    fn zero_budget_is_rejected() {
        assert_eq!(segment("text", 0, true), Err(SegmentError::ZeroBudget));
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(segment("", 100, true).unwrap().is_empty());
        assert!(segment(" \n\n \t", 100, false).unwrap().is_empty());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = segment("  one paragraph.\n\nanother one.  ", 100, true).unwrap();
        assert_eq!(chunks, vec!["one paragraph.\n\nanother one.".to_string()]);
    }

    #[test]
    fn paragraphs_are_packed_greedily() {
        let para = "x".repeat(40);
        let text = format!("{para}\n\n{para}\n\n{para}");
        let chunks = segment(&text, 90, true).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], format!("{para}\n\n{para}"));
        assert_eq!(chunks[1], para);
    }

    #[test]
    fn blank_lines_with_spaces_split_paragraphs() {
        let text = "first line\nsecond line\n   \nthird";
        assert_eq!(split_paragraphs(text), vec!["first line\nsecond line", "third"]);
    }

    #[test]
    fn oversized_paragraph_splits_on_sentences() {
        let text = "Alpha beta gamma. Delta epsilon zeta! Eta theta iota? Kappa lambda.";
        let chunks = segment(text, 40, true).unwrap();
        assert!(chunks.iter().all(|chunk| char_len(chunk) <= 40));
        assert_eq!(chunks[0], "Alpha beta gamma. Delta epsilon zeta!");
        assert_complete(text, &chunks);
    }

    #[test]
    fn sentence_split_keeps_decimals_whole() {
        let sentences = split_sentences("Pi is 3.14 roughly. Next one");
        assert_eq!(sentences, vec!["Pi is 3.14 roughly.", "Next one"]);
    }

    #[test]
    fn cjk_sentences_split_without_spaces() {
        let sentences = split_sentences("今天天气很好。我们去公园吧！好不好？");
        assert_eq!(sentences, vec!["今天天气很好。", "我们去公园吧！", "好不好？"]);
        let chunks = segment("今天天气很好。我们去公园吧！好不好？", 10, true).unwrap();
        assert_eq!(chunks[0], "今天天气很好。");
    }

    #[test]
    fn force_split_prefers_whitespace_near_limit() {
        let text = "word ".repeat(30);
        let chunks = segment(&text, 23, false).unwrap();
        assert!(chunks.iter().all(|chunk| char_len(chunk) <= 23));
        assert!(chunks.iter().all(|chunk| chunk.split(' ').all(|w| w == "word")));
        assert_complete(&text, &chunks);
    }

    #[test]
    fn force_split_cuts_unbroken_cjk_at_limit() {
        let text = "字".repeat(25);
        let chunks = segment(&text, 10, true).unwrap();
        assert_eq!(
            chunks.iter().map(|chunk| char_len(chunk)).collect::<Vec<_>>(),
            vec![10, 10, 5]
        );
    }

    #[test]
    fn overlong_word_is_kept_whole() {
        let long = "a".repeat(30);
        let text = format!("tiny {long} end");
        let chunks = segment(&text, 10, false).unwrap();
        assert_eq!(chunks, vec!["tiny".to_string(), long, "end".to_string()]);
    }

    #[test]
    fn hard_cut_backs_up_to_word_start() {
        let chars: Vec<char> = "abc defghijkl".chars().collect();
        assert_eq!(find_cut(&chars, 0, 8, 8), 4);
    }

    #[test]
    fn chunks_never_exceed_budget_for_mixed_text() {
        let text = "Intro paragraph here.\n\n".to_string()
            + &"Sentence number one is here. ".repeat(50)
            + "\n\n"
            + &"中文句子在这里。".repeat(40);
        let chunks = segment(&text, 120, true).unwrap();
        assert!(chunks.iter().all(|chunk| !chunk.is_empty()));
        assert!(chunks.iter().all(|chunk| char_len(chunk) <= 120));
        assert_complete(&text, &chunks);
    }
}

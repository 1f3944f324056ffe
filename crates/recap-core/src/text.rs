use crate::segment::{pack_sentences, split_sentences};

const SUMMARY_LANGUAGE_HEADINGS: [&str; 10] = [
    "中文（简体）",
    "中文",
    "english",
    "日本語",
    "한국어",
    "español",
    "français",
    "deutsch",
    "italiano",
    "português",
];
const SUMMARY_HEADING_SUFFIXES: [&str; 3] = ["摘要", "总结", "summary"];
const META_PREFIXES: [&str; 6] = [
    "**检测语言:**",
    "**语言概率:**",
    "**Detected Language:**",
    "**Language Probability:**",
    "source:",
    "Source:",
];
const CLEANUP_SENTENCES_PER_PARAGRAPH: usize = 3;
const CLEANUP_PARAGRAPH_CHARS: usize = 250;

/// First `n` characters of `text`.
pub fn head_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Last `n` characters of `text`.
pub fn tail_chars(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match text.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// Single-line excerpt for log fields.
pub fn preview(text: &str, n: usize) -> String {
    let flat: String = text
        .chars()
        .map(|ch| if ch.is_whitespace() { ' ' } else { ch })
        .collect();
    let head = head_chars(flat.trim(), n);
    if head.len() < flat.trim().len() {
        format!("{head}...")
    } else {
        head.to_string()
    }
}

/// Normalise line endings, separate headings from their body and collapse
/// runs of blank lines.
pub fn format_markdown_paragraphs(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    let mut lines: Vec<&str> = Vec::new();
    let mut previous_heading = false;
    for line in normalized.split('\n') {
        if previous_heading && !line.trim().is_empty() && !line.starts_with('#') {
            lines.push("");
        }
        previous_heading = is_heading(line);
        lines.push(line);
    }
    collapse_blank_lines(&lines.join("\n")).trim().to_string()
}

fn is_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|ch| *ch == '#').count();
    (1..=6).contains(&hashes)
        && line[hashes..]
            .chars()
            .next()
            .is_some_and(char::is_whitespace)
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0usize;
    for ch in text.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(ch);
            }
        } else {
            newlines = 0;
            out.push(ch);
        }
    }
    out
}

/// Drop `# Transcript` / `## Transcript Text` headings the model likes to add.
pub fn remove_transcript_headings(text: &str) -> String {
    text.split('\n')
        .filter(|line| !is_transcript_heading(line.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_transcript_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|ch| *ch == '#').count();
    if !(1..=6).contains(&hashes) {
        return false;
    }
    let rest = line[hashes..].trim().to_lowercase();
    match rest.strip_prefix("transcript") {
        Some("") => true,
        Some(tail) => tail.starts_with(char::is_whitespace) && tail.trim() == "text",
        None => false,
    }
}

/// Split paragraphs longer than `max_chars` at sentence boundaries.
pub fn enforce_paragraph_length(text: &str, max_chars: usize) -> String {
    let mut out: Vec<String> = Vec::new();
    for paragraph in split_blank_lines(text) {
        if paragraph.chars().count() <= max_chars {
            out.push(paragraph.to_string());
        } else {
            out.extend(pack_sentences(split_sentences(paragraph), max_chars));
        }
    }
    out.join("\n\n")
}

fn split_blank_lines(text: &str) -> Vec<&str> {
    let mut paragraphs = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0usize;
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        if line.trim().is_empty() {
            if let Some(begin) = start.take() {
                paragraphs.push(text[begin..end].trim());
            }
        } else {
            start.get_or_insert(offset);
            end = offset + line.len();
        }
        offset += line.len();
    }
    if let Some(begin) = start {
        paragraphs.push(text[begin..end].trim());
    }
    paragraphs.retain(|paragraph| !paragraph.is_empty());
    paragraphs
}

/// Remove timestamp lines, titles and transcriber metadata.
pub fn strip_timestamps_and_meta(text: &str) -> String {
    text.split('\n')
        .filter(|line| {
            let s = line.trim();
            !(is_timestamp_line(s)
                || s.starts_with("# ")
                || s.starts_with("##")
                || META_PREFIXES.iter().any(|prefix| s.starts_with(prefix)))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_timestamp_line(line: &str) -> bool {
    line.starts_with("**[") && line.ends_with("]**")
}

/// Offline cleanup used when the service could not format a transcript:
/// metadata removed, sentences regrouped into short paragraphs.
pub fn basic_cleanup(raw: &str) -> String {
    let joined = raw
        .split('\n')
        .map(str::trim)
        .filter(|s| {
            !s.is_empty()
                && !is_timestamp_line(s)
                && !s.starts_with('#')
                && !META_PREFIXES[..4].iter().any(|prefix| s.contains(prefix))
        })
        .collect::<Vec<_>>()
        .join(" ");

    let mut paragraphs = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for sentence in split_sentences(&joined) {
        current.push(sentence);
        let len: usize = current.iter().map(|s| s.chars().count() + 1).sum();
        if current.len() >= CLEANUP_SENTENCES_PER_PARAGRAPH || len > CLEANUP_PARAGRAPH_CHARS {
            paragraphs.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }
    paragraphs.join("\n\n")
}

/// Tidy a model-written summary: leading language heading, trailing source
/// link and extra blank lines removed.
pub fn clean_summary(summary: &str) -> String {
    let mut lines: Vec<&str> = summary.split('\n').collect();
    while let Some(first) = lines.first() {
        if first.trim().is_empty() || is_language_heading(first.trim()) {
            lines.remove(0);
        } else {
            break;
        }
    }
    while let Some(last) = lines.last() {
        let s = last.trim();
        let is_source = s.to_lowercase().strip_prefix("source:").is_some_and(|rest| {
            let rest = rest.trim();
            rest.starts_with("http://") || rest.starts_with("https://")
        });
        if s.is_empty() || is_source {
            lines.pop();
        } else {
            break;
        }
    }
    collapse_blank_lines(&lines.join("\n")).trim().to_string()
}

fn is_language_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|ch| *ch == '#').count();
    if !(1..=2).contains(&hashes) {
        return false;
    }
    let rest = line[hashes..].trim().to_lowercase();
    SUMMARY_LANGUAGE_HEADINGS.iter().any(|language| {
        rest.strip_prefix(language).is_some_and(|tail| {
            let tail = tail.trim();
            tail.is_empty() || SUMMARY_HEADING_SUFFIXES.contains(&tail)
        })
    })
}

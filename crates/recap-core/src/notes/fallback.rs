use crate::language::Language;

struct Labels {
    summary_language: &'static str,
    notice: &'static str,
    unavailable: &'static str,
    overview: &'static str,
    length: &'static str,
    about: &'static str,
    characters: &'static str,
    paragraph_count: &'static str,
    paragraphs: &'static str,
    main_content: &'static str,
    description: &'static str,
    suggestions: [&'static str; 3],
    disclaimer: &'static str,
}

const EN: Labels = Labels {
    summary_language: "Summary Language",
    notice: "Notice",
    unavailable: "The completion service is unavailable, this is a simplified summary",
    overview: "Transcript Overview",
    length: "Content Length",
    about: "About",
    characters: "characters",
    paragraph_count: "Paragraph Count",
    paragraphs: "paragraphs",
    main_content: "Main Content",
    description: "The transcript contains the complete spoken content. Since a summary could not be generated, we suggest you:",
    suggestions: [
        "Review the complete transcript for details",
        "Focus on the paragraphs marked with timestamps",
        "Extract key points and takeaways manually",
    ],
    disclaimer: "This is an automatically generated fallback summary",
};

const ZH: Labels = Labels {
    summary_language: "摘要语言",
    notice: "注意",
    unavailable: "由于文本生成服务不可用，这是一个简化的摘要",
    overview: "转录概览",
    length: "内容长度",
    about: "约",
    characters: "字符",
    paragraph_count: "段落数量",
    paragraphs: "段",
    main_content: "主要内容",
    description: "转录文本包含了完整的语音内容。由于当前无法生成智能摘要，建议您：",
    suggestions: [
        "查看完整的转录文本以获取详细信息",
        "关注时间戳标记的重要段落",
        "手动提取关键观点和要点",
    ],
    disclaimer: "本摘要为自动生成的备用版本",
};

/// Offline summary page used when a single-shot summary call fails.
pub fn fallback_summary(transcript: &str, language: Language, title: Option<&str>) -> String {
    let labels = if language.is_chinese() { &ZH } else { &EN };
    let content: Vec<&str> = transcript
        .lines()
        .filter(|line| {
            !line.trim().is_empty() && !line.starts_with('#') && !line.starts_with("**")
        })
        .collect();
    let total_chars: usize = content.iter().map(|line| line.chars().count()).sum();
    let title = title.unwrap_or("Summary");
    let [first, second, third] = labels.suggestions;

    format!(
        "# {title}\n\n\
**{summary_language}:** {name}\n\
**{notice}:** {unavailable}\n\n\
## {overview}\n\n\
**{length}:** {about} {total_chars} {characters}\n\
**{paragraph_count}:** {lines} {paragraphs}\n\n\
## {main_content}\n\n\
{description}\n\n\
1. {first}\n\
2. {second}\n\
3. {third}\n\n\
*{disclaimer}*",
        summary_language = labels.summary_language,
        name = language.name(),
        notice = labels.notice,
        unavailable = labels.unavailable,
        overview = labels.overview,
        length = labels.length,
        about = labels.about,
        characters = labels.characters,
        paragraph_count = labels.paragraph_count,
        lines = content.len(),
        paragraphs = labels.paragraphs,
        main_content = labels.main_content,
        description = labels.description,
        disclaimer = labels.disclaimer,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_counts_content_lines_only() {
        let transcript = "# Title\n**[00:00]**\nfirst line\n\nsecond";
        let page = fallback_summary(transcript, Language::English, Some("Talk"));
        assert!(page.starts_with("# Talk\n"));
        assert!(page.contains("**Content Length:** About 16 characters"));
        assert!(page.contains("**Paragraph Count:** 2 paragraphs"));
    }

    #[test]
    fn fallback_uses_chinese_labels() {
        let page = fallback_summary("内容", Language::Chinese, None);
        assert!(page.starts_with("# Summary\n"));
        assert!(page.contains("**摘要语言:** 中文（简体）"));
        assert!(page.contains("约 2 字符"));
    }
}

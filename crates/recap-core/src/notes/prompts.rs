use crate::complete::CompletionRequest;
use crate::language::Language;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
}

pub const OPTIMIZE: Sampling = Sampling {
    temperature: 0.1,
    max_tokens: 4_000,
};
pub const SUMMARY_SINGLE: Sampling = Sampling {
    temperature: 0.3,
    max_tokens: 3_500,
};
pub const SUMMARY_CHUNK: Sampling = Sampling {
    temperature: 0.3,
    max_tokens: 1_000,
};
pub const SUMMARY_INTEGRATE: Sampling = Sampling {
    temperature: 0.3,
    max_tokens: 2_500,
};
pub const TRANSLATE: Sampling = Sampling {
    temperature: 0.1,
    max_tokens: 4_000,
};

fn request(system: String, user: String, sampling: Sampling) -> CompletionRequest {
    CompletionRequest {
        system,
        user,
        max_tokens: sampling.max_tokens,
        temperature: sampling.temperature,
    }
}

const OPTIMIZE_SYSTEM_ZH: &str = "你是专业的音频转录文本优化助手，修正错误、改善通顺度和排版格式，\
必须保持原意，不得删减口语/重复/细节；仅移除时间戳或元信息。绝对不要改变人称代词或说话者视角。";

const OPTIMIZE_SYSTEM_EN: &str = "You are a professional transcript formatting assistant. \
Fix errors and improve fluency without changing meaning or removing content. \
NEVER change pronouns or speaker perspective.";

pub fn optimize(transcript_language: Language, text: &str, paragraph_chars: usize) -> CompletionRequest {
    if transcript_language.is_chinese() {
        let user = format!(
            "请对以下音频转录文本进行智能优化和格式化，要求：\n\n\
**内容优化（正确性优先）：**\n\
1. 错误修正（转录错误/错别字/同音字/专有名词/错误的英文单词）\n\
2. 适度改善语法，补全不完整句子，保持原意和语言不变\n\
3. 口语处理：保留自然口语与重复表达，不要删减内容，仅添加必要标点\n\
4. **绝对不要改变人称代词和说话者视角**\n\n\
**分段规则：**\n\
- 按主题和逻辑含义分段，每段包含1-8个相关句子\n\
- 单段长度不超过{paragraph_chars}字符（中文计为1字符）\n\
- 避免过多短段落\n\n\
**输出要求：**\n\
- 直接输出优化后的正文内容，不要添加任何标题、修改日志或说明\n\
- Markdown标准段落（段间空行）\n\
- 以 [Context: ...] 开头的内容仅为上文参考，不要输出\n\n\
原始转录文本：\n{text}"
        );
        return request(OPTIMIZE_SYSTEM_ZH.to_string(), user, OPTIMIZE);
    }

    let user = format!(
        "Please optimize and format the following audio transcript:\n\n\
**Content (accuracy first):**\n\
1. Fix transcription errors, typos, homophones and proper nouns\n\
2. Moderately improve grammar and complete fragmented sentences, preserving meaning\n\
3. Keep natural speech patterns and repetitions; do not delete content, only add punctuation\n\
4. **Do NOT alter personal pronouns or the speaker's perspective**\n\n\
**Paragraphs:**\n\
- Segment by topic (1-8 related sentences per paragraph)\n\
- At most {paragraph_chars} characters per paragraph\n\
- Avoid runs of very short paragraphs\n\n\
**Output:**\n\
- Output the optimized text only, without titles, change logs or comments\n\
- Standard Markdown paragraphs separated by blank lines\n\
- A leading [Context: ...] block is reference only; do not repeat it\n\n\
Original transcript:\n{text}"
    );
    request(OPTIMIZE_SYSTEM_EN.to_string(), user, OPTIMIZE)
}

pub fn summary_single(language: Language, text: &str) -> CompletionRequest {
    let name = language.name();
    let system = format!(
        "You are a professional content analyst. Generate a comprehensive, well-structured \
summary in {name} for the following text.\n\n\
Requirements:\n\
1. Extract the main topics and core viewpoints\n\
2. Keep a clear logical structure and include important discussions and conclusions\n\
3. Start a new paragraph whenever the topic shifts; separate paragraphs with blank lines\n\
4. Write entirely in {name}, in Markdown, 600-1200 words when appropriate"
    );
    let user = format!(
        "Based on the following content, write a comprehensive, well-structured summary in {name}:\n\n\
{text}\n\n\
Requirements:\n\
- Natural paragraphs, no decorative headings\n\
- Cover all key ideas, keeping important examples and data\n\
- Balance early and later content"
    );
    request(system, user, SUMMARY_SINGLE)
}

pub fn summary_chunk(language: Language, text: &str, part: usize, total: usize) -> CompletionRequest {
    let name = language.name();
    let system = format!(
        "You are a summarization expert. Write a high-density summary of this text chunk in {name}.\n\n\
This is part {part} of {total} of the complete content.\n\n\
Prefer natural paragraphs with minimal bullet points; highlight new information and how it \
relates to the main narrative; avoid vague repetition and headings; 120-220 words."
    );
    let user = format!(
        "[Part {part}/{total}] Summarize the key points of the following text in {name} \
(natural paragraphs, minimal bullet points, 120-220 words):\n\n\
{text}\n\n\
Do not use subheadings or decorative separators; output content only."
    );
    request(system, user, SUMMARY_CHUNK)
}

pub fn summary_integrate(language: Language, tagged: &str) -> CompletionRequest {
    let name = language.name();
    let system = format!(
        "You are a content integration expert. Integrate multiple segmented summaries into one \
complete, coherent summary in {name}.\n\n\
1. Remove duplicate content and keep the logic clear\n\
2. Reorganize by theme or chronology\n\
3. Separate paragraphs with blank lines, in Markdown\n\
4. Cover every part without omission"
    );
    let user = format!(
        "Integrate the following segmented summaries into one coherent summary in {name}:\n\n\
{tagged}\n\n\
Do not mention the part labels in the output."
    );
    request(system, user, SUMMARY_INTEGRATE)
}

pub fn translate(
    source: Language,
    target: Language,
    text: &str,
    part: Option<(usize, usize)>,
) -> CompletionRequest {
    let (from, to) = (source.name(), target.name());
    let position = match part {
        Some((part, total)) => format!(
            "\nThis is part {part} of {total} of the full document; keep it consistent with the surrounding parts.\n"
        ),
        None => String::new(),
    };
    let system = format!(
        "You are a professional translator. Translate {from} text into {to} accurately.\n{position}\n\
- Keep the original formatting and structure, including paragraphs and headings\n\
- Convey the meaning naturally and keep technical terms precise\n\
- Keep Markdown unchanged\n\
- Do not add explanations or notes"
    );
    let user = format!("Translate the following {from} text into {to}:\n\n{text}\n\nReturn only the translation.");
    request(system, user, TRANSLATE)
}

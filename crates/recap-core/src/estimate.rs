/// Fixed cost of the instruction and system prompt wrapped around a request.
pub const PROMPT_OVERHEAD: usize = 2_500;

/// Weighted cost model used to decide whether a document needs chunking.
///
/// The weights approximate tokenizer behaviour for mixed CJK/Latin text:
/// ideographs cost more than one unit each, English words slightly more
/// than one, and markdown/line-break density is charged per character.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeEstimator {
    pub cjk_weight: f64,
    pub word_weight: f64,
    pub char_weight: f64,
    pub prompt_overhead: usize,
}

impl Default for SizeEstimator {
    fn default() -> Self {
        Self {
            cjk_weight: 1.5,
            word_weight: 1.3,
            char_weight: 0.15,
            prompt_overhead: PROMPT_OVERHEAD,
        }
    }
}

impl SizeEstimator {
    pub fn estimate_cost(&self, text: &str, include_overhead: bool) -> usize {
        let mut chars = 0usize;
        let mut cjk = 0usize;
        for ch in text.chars() {
            chars += 1;
            if is_cjk_ideograph(ch) {
                cjk += 1;
            }
        }
        let words = text
            .split_whitespace()
            .filter(|word| word.chars().all(|ch| ch.is_ascii_alphabetic()))
            .count();

        let base = cjk as f64 * self.cjk_weight + words as f64 * self.word_weight;
        let format = chars as f64 * self.char_weight;
        let overhead = if include_overhead {
            self.prompt_overhead
        } else {
            0
        };
        (base + format) as usize + overhead
    }

    /// Measure `text` with `metric` and report whether it fits one call.
    pub fn fits(&self, text: &str, metric: SizeMetric) -> (usize, bool) {
        let measured = match metric {
            SizeMetric::Chars { .. } => text.chars().count(),
            SizeMetric::Cost {
                include_overhead, ..
            } => self.estimate_cost(text, include_overhead),
        };
        (measured, measured <= metric.threshold())
    }
}

/// Estimate with the default weights.
pub fn estimate_cost(text: &str, include_overhead: bool) -> usize {
    SizeEstimator::default().estimate_cost(text, include_overhead)
}

/// What a single-shot threshold is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeMetric {
    /// Estimated cost units, optionally charging the prompt overhead.
    Cost {
        threshold: usize,
        include_overhead: bool,
    },
    /// Raw character count.
    Chars { threshold: usize },
}

impl SizeMetric {
    pub fn threshold(&self) -> usize {
        match *self {
            SizeMetric::Cost { threshold, .. } | SizeMetric::Chars { threshold } => threshold,
        }
    }
}

impl Default for SizeMetric {
    fn default() -> Self {
        SizeMetric::Cost {
            threshold: 4_000,
            include_overhead: true,
        }
    }
}

pub(crate) fn is_cjk_ideograph(ch: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_costs_only_overhead() {
        assert_eq!(estimate_cost("", false), 0);
        assert_eq!(estimate_cost("", true), PROMPT_OVERHEAD);
    }

    #[test]
    fn english_words_and_chars_are_weighted() {
        // 2 words * 1.3 + 11 chars * 0.15 = 4.25
        assert_eq!(estimate_cost("hello world", false), 4);
    }

    #[test]
    fn cjk_ideographs_are_weighted() {
        // 4 ideographs * 1.5 + 4 chars * 0.15 = 6.6
        assert_eq!(estimate_cost("你好世界", false), 6);
    }

    #[test]
    fn words_with_digits_or_punctuation_are_not_counted() {
        // only "plain" counts: 1.3 + 20 * 0.15 = 4.3
        assert_eq!(estimate_cost("plain v2 done. x1234", false), 4);
    }

    #[test]
    fn estimate_is_monotonic_in_repeated_input() {
        let unit = "The speaker explains the idea. 这是一个例子。\n\n";
        let mut previous = 0;
        for n in 1..20 {
            let cost = estimate_cost(&unit.repeat(n), true);
            assert!(cost >= previous);
            previous = cost;
        }
    }

    #[test]
    fn fits_uses_metric_threshold() {
        let estimator = SizeEstimator::default();
        let text = "a".repeat(3_001);
        let (measured, fits) = estimator.fits(&text, SizeMetric::Chars { threshold: 3_000 });
        assert_eq!(measured, 3_001);
        assert!(!fits);

        let (cost, fits) = estimator.fits(
            "short text",
            SizeMetric::Cost {
                threshold: 4_000,
                include_overhead: true,
            },
        );
        assert!(cost > PROMPT_OVERHEAD);
        assert!(fits);
    }
}

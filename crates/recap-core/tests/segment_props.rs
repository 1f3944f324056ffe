use proptest::prelude::*;
use recap_core::segment;

fn squash(text: &str) -> String {
    text.chars().filter(|ch| !ch.is_whitespace()).collect()
}

fn is_ideograph(ch: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&ch)
}

proptest! {
    #[test]
    fn chunks_reproduce_input_modulo_whitespace(
        text in "[a-z .,!?\n。！你好]{0,300}",
        max_chars in 1usize..80,
        prefer_paragraphs in any::<bool>(),
    ) {
        let chunks = segment(&text, max_chars, prefer_paragraphs).unwrap();
        prop_assert_eq!(squash(&chunks.concat()), squash(&text));
        prop_assert!(chunks.iter().all(|chunk| !chunk.trim().is_empty()));
    }

    #[test]
    fn arbitrary_unicode_is_never_lost(
        text in "\\PC{0,200}",
        max_chars in 1usize..60,
    ) {
        let chunks = segment(&text, max_chars, true).unwrap();
        prop_assert_eq!(squash(&chunks.concat()), squash(&text));
    }

    #[test]
    fn oversized_chunks_are_single_words(
        text in "([a-z]{1,30}[ \n]{1,2}|[你好世界]{1,5}|[.!?。] ){0,40}",
        max_chars in 1usize..40,
    ) {
        for chunk in segment(&text, max_chars, true).unwrap() {
            if chunk.chars().count() > max_chars {
                prop_assert!(!chunk.chars().any(char::is_whitespace), "chunk {:?}", chunk);
                prop_assert!(!chunk.chars().any(is_ideograph), "chunk {:?}", chunk);
            }
        }
    }
}

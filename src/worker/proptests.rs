//! Property-based tests for frame shaping

use super::frame::*;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_prompt() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z ###:]{0,40}",
        "[a-z ]{0,10}</s>[a-z ]{0,10}",
        "[äöüñ日本 ]{0,20}",
    ]
}

fn arb_fenced_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            Just("\n```".to_string()),
            Just("\\_".to_string()),
            Just("\\".to_string()),
            "[a-z_ ]{1,8}",
        ],
        0..12,
    )
    .prop_map(|parts| parts.concat())
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// A frame that is exactly the echoed prompt plus separator shows nothing
    #[test]
    fn prop_echo_only_frame_is_empty(prompt in arb_prompt()) {
        let echoed = format!("{} ", prompt.replace("</s>", " "));
        prop_assert_eq!(visible_output(&echoed, echo_skip_len(&prompt)), "");
    }

    /// Generated text after the echo survives untouched apart from trimming
    #[test]
    fn prop_generated_tail_is_visible(prompt in arb_prompt(), tail in "[a-zA-Z0-9]{1,30}") {
        let frame = format!("{} {tail}", prompt.replace("</s>", " "));
        prop_assert_eq!(visible_output(&frame, echo_skip_len(&prompt)), tail);
    }

    #[test]
    fn prop_sanitize_is_idempotent(text in arb_fenced_text()) {
        let once = sanitize_code_fences(&text);
        prop_assert_eq!(sanitize_code_fences(&once), once.clone());
    }

    /// Text with an unclosed fence is never rewritten
    #[test]
    fn prop_unbalanced_fences_unchanged(text in arb_fenced_text()) {
        let segments = text.split("\n```").count();
        if segments % 2 == 0 {
            prop_assert_eq!(sanitize_code_fences(&text), text);
        }
    }

    #[test]
    fn prop_sanitize_preserves_fence_count(text in arb_fenced_text()) {
        let sanitized = sanitize_code_fences(&text);
        prop_assert_eq!(
            sanitized.matches("\n```").count(),
            text.matches("\n```").count()
        );
    }

    #[test]
    fn prop_cursor_round_trip(text in "[a-zA-Z ]{0,30}") {
        let mut visible = text.clone();
        visible.push(CURSOR);
        prop_assert_eq!(strip_cursor(&visible), text);
    }
}

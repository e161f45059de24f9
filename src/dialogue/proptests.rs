//! Property-based tests for turn classification and titles

use super::vocabulary::{Vocabulary, AFFIRMATIVES, CONFIRMATION_MAX_CHARS, GRAPH_KEYWORDS};
use crate::title_generator::generate_title;
use proptest::prelude::*;

fn arb_affirmative() -> impl Strategy<Value = &'static str> {
    prop::sample::select(AFFIRMATIVES)
}

proptest! {
    #[test]
    fn prop_long_text_never_confirms(
        word in arb_affirmative(),
        filler in "[a-z ]{50,120}",
    ) {
        let text = format!("{word} {filler}");
        prop_assume!(text.trim().chars().count() >= CONFIRMATION_MAX_CHARS);
        prop_assert!(!Vocabulary::default().is_confirmation(&text));
    }

    #[test]
    fn prop_short_affirmative_confirms(
        word in arb_affirmative(),
        prefix in "[ ]{0,3}",
        suffix in "[!.]{0,3}",
        upper in any::<bool>(),
    ) {
        let word = if upper { word.to_uppercase() } else { word.to_string() };
        let text = format!("{prefix}{word}{suffix}");
        prop_assert!(Vocabulary::default().is_confirmation(&text));
    }

    #[test]
    fn prop_explicit_request_never_offers(
        keyword in prop::sample::select(GRAPH_KEYWORDS),
        problem in "[a-z0-9 ^+=-]{0,40}",
        solution in "[a-z0-9 ^+=-]{0,80}",
    ) {
        let problem = format!("{keyword} {problem}");
        prop_assert!(!Vocabulary::default().should_offer_graph(&problem, &solution));
    }

    #[test]
    fn prop_title_is_bounded_single_line(message in "\\PC{0,120}|[a-z\\n ]{0,120}") {
        let title = generate_title(&message);
        prop_assert!(!title.is_empty());
        prop_assert!(title.chars().count() <= 53);
        prop_assert!(!title.contains('\n'));
        prop_assert_eq!(title.trim(), title.as_str());
    }
}

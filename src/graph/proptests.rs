//! Property-based tests for code extraction and script preparation

use super::extract::{extract_code, FENCE_CLOSE, FENCE_OPEN};
use super::renderer::prepare_script;
use proptest::prelude::*;
use std::path::Path;

/// A code line that can never be mistaken for a fence
fn arb_code_line() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_ =+*()\\[\\],.:'-]{0,40}"
}

fn arb_prose_line() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ,.!?]{0,60}"
}

proptest! {
    #[test]
    fn prop_extract_returns_enclosed_lines(
        before in prop::collection::vec(arb_prose_line(), 0..5),
        code in prop::collection::vec(arb_code_line(), 1..20),
        after in prop::collection::vec(arb_prose_line(), 0..5),
    ) {
        let mut lines = before.clone();
        lines.push(FENCE_OPEN.to_string());
        lines.extend(code.iter().cloned());
        lines.push(FENCE_CLOSE.to_string());
        lines.extend(after.iter().cloned());
        let text = lines.join("\n");

        let extracted = extract_code(&text);
        prop_assert_eq!(extracted.clone(), code.join("\n"));
        prop_assert!(!extracted.contains("```"));
    }

    #[test]
    fn prop_no_fence_yields_empty(lines in prop::collection::vec(arb_prose_line(), 0..20)) {
        prop_assert_eq!(extract_code(&lines.join("\n")), "");
    }

    #[test]
    fn prop_prepared_script_never_shows(code in prop::collection::vec(
        prop_oneof![arb_code_line(), Just("plt.show()".to_string())], 0..10)
    ) {
        let script = prepare_script(&code.join("\n"), Path::new("/tmp/graph.png"));
        prop_assert!(!script.contains("plt.show("));
        prop_assert!(script.contains("matplotlib.use('Agg')"));
        prop_assert!(script.contains("plt.savefig('/tmp/graph.png', dpi=150, bbox_inches='tight')"));
    }
}

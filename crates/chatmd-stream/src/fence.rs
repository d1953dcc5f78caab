const FENCE: &str = "```";

/// Returns `true` when `text` holds an odd number of triple-backtick markers.
pub fn has_unfinished_code_block(text: &str) -> bool {
    text.matches(FENCE).count() % 2 == 1
}

/// Appends a closing fence when `text` ends inside a fenced code block.
///
/// Repaired text always has an even marker count, so repairing twice is the
/// same as repairing once.
pub fn repair(text: &str) -> String {
    if has_unfinished_code_block(text) {
        tracing::debug!("unclosed code block detected, appending fence");
        format!("{text}\n{FENCE}")
    } else {
        text.to_string()
    }
}

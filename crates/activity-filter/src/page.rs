//! Page envelope rewriting

use serde_json::{Value, json};
use tracing::debug;

use crate::mode::FilterMode;

/// Filter the `content` array of an upstream page.
///
/// With a filtering mode the envelope is rewritten: `content` holds the
/// survivors, `numberOfElements` and `totalElements` become the filtered
/// count, and `filtered`, `originalTotalElements`, `filterCriteria` are
/// added. Pages without a `content` array are returned unmodified.
pub fn apply_to_page(mode: FilterMode, mut page: Value) -> Value {
    let Some(criteria) = mode.criteria() else {
        return page;
    };
    let Some(Value::Array(content)) = page.get_mut("content") else {
        return page;
    };

    let original = std::mem::take(content);
    let original_total = original.len();
    let kept: Vec<Value> = original.into_iter().filter(|a| mode.matches(a)).collect();
    let kept_total = kept.len();
    *content = kept;

    if let Some(envelope) = page.as_object_mut() {
        envelope.insert("numberOfElements".into(), json!(kept_total));
        envelope.insert("totalElements".into(), json!(kept_total));
        envelope.insert("filtered".into(), json!(true));
        envelope.insert("originalTotalElements".into(), json!(original_total));
        envelope.insert("filterCriteria".into(), json!(criteria));
    }

    debug!(
        mode = mode.as_str(),
        original = original_total,
        kept = kept_total,
        "filtered activity page"
    );
    page
}

//! Matched-word extraction from highlighted fragments.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static HIT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<b>(.*?)</b>").expect("hit tag pattern is valid"));

/// Pattern capturing the text between [`HIT_OPEN`](crate::store::HIT_OPEN)
/// and [`HIT_CLOSE`](crate::store::HIT_CLOSE).
pub fn hit_tag() -> &'static Regex {
    &HIT_TAG
}

/// Collect every captured sub-group of `pattern` across all `fragments`.
///
/// Group 0 (the whole match) is skipped, as are groups that did not
/// participate. Duplicates collapse.
pub fn get_hit_words<S: AsRef<str>>(pattern: &Regex, fragments: &[S]) -> BTreeSet<String> {
    let mut words = BTreeSet::new();
    for fragment in fragments {
        for caps in pattern.captures_iter(fragment.as_ref()) {
            words.extend(caps.iter().skip(1).flatten().map(|m| m.as_str().to_string()));
        }
    }
    words
}

//! Regex-based conclusion extraction.
//!
//! Decision nodes may carry an extraction pattern instead of relying on
//! the oracle. Extraction never fails the node: a miss (or an invalid
//! pattern) produces a descriptive string that flows into the conclusion
//! like any other, where the transition rules will route it to the
//! fallback path.

/// Apply `pattern` to `text` and return the first match.
///
/// On a miss or an invalid pattern the returned string describes the
/// failure instead; callers treat it as an ordinary (non-matching)
/// conclusion.
///
/// # Examples
///
/// ```rust
/// use triagegraph::utils::regex_ext::extract_with_pattern;
///
/// assert_eq!(extract_with_pattern("status=Running", r"Running|Pending"), "Running");
/// assert!(extract_with_pattern("status=Failed", r"Running|Pending").contains("no match"));
/// ```
#[must_use]
pub fn extract_with_pattern(text: &str, pattern: &str) -> String {
    let regex = match regex::Regex::new(pattern) {
        Ok(regex) => regex,
        Err(error) => {
            tracing::warn!(pattern, %error, "invalid extraction pattern");
            return format!("invalid extraction pattern {pattern:?}: {error}");
        }
    };
    match regex.find(text) {
        Some(found) => found.as_str().to_string(),
        None => format!("no match for pattern {pattern:?} in {text:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_first_match() {
        assert_eq!(extract_with_pattern("a b c", r"[bc]"), "b");
    }

    #[test]
    fn miss_is_described_not_raised() {
        let result = extract_with_pattern("nothing here", r"\d+");
        assert!(result.contains("no match"));
    }

    #[test]
    fn invalid_pattern_is_described() {
        let result = extract_with_pattern("text", r"([unclosed");
        assert!(result.contains("invalid extraction pattern"));
    }
}

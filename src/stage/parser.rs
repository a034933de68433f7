//! Structured-output parsing for oracle completions.
//!
//! A parser turns raw completion text into a [`ParsedAction`] or fails
//! with a [`ParseError`] whose diagnostic string is fed verbatim into the
//! repair prompt — the wording of these diagnostics is part of the repair
//! loop's contract, not just operator convenience.

use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

/// A successfully parsed oracle output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedAction {
    /// The oracle chose a tool to invoke with the given arguments.
    Invoke {
        tool: String,
        args: Vec<(String, String)>,
    },
    /// The oracle signaled completion with a final answer.
    Finish { output: String },
}

impl ParsedAction {
    /// The tool name, or the reserved finish marker.
    #[must_use]
    pub fn tool(&self) -> &str {
        match self {
            Self::Invoke { tool, .. } => tool,
            Self::Finish { .. } => StructuredJsonParser::FINAL_ACTION,
        }
    }

    /// Canonical voting signature: lower-cased tool name plus the sorted
    /// set of (lower-cased key, lower-cased value) argument pairs.
    #[must_use]
    pub fn signature(&self) -> (String, Vec<(String, String)>) {
        match self {
            Self::Invoke { tool, args } => {
                let mut canonical: Vec<(String, String)> = args
                    .iter()
                    .map(|(k, v)| (k.to_lowercase(), v.to_lowercase()))
                    .collect();
                canonical.sort();
                canonical.dedup();
                (tool.to_lowercase(), canonical)
            }
            Self::Finish { output } => (
                StructuredJsonParser::FINAL_ACTION.to_lowercase(),
                vec![("output".to_string(), output.to_lowercase())],
            ),
        }
    }
}

/// A recoverable parse failure.
///
/// `diagnostic` is the human-readable explanation handed to the repair
/// oracle together with the offending output.
#[derive(Debug, Error, Diagnostic)]
#[error("{diagnostic}")]
#[diagnostic(code(triagegraph::stage::parse))]
pub struct ParseError {
    pub diagnostic: String,
}

impl ParseError {
    pub fn new(diagnostic: impl Into<String>) -> Self {
        Self {
            diagnostic: diagnostic.into(),
        }
    }
}

/// Pluggable structured-output parser.
pub trait OutputParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<ParsedAction, ParseError>;

    /// Formatting instructions injected into prompts so the oracle knows
    /// what shape to produce.
    fn format_instructions(&self) -> String {
        String::new()
    }
}

/// Strict two-key JSON parser: `{"action": <tool>, "action_input": <args>}`.
///
/// The reserved action `"Final Answer"` terminates the loop. Any other
/// shape — non-JSON text, missing or extra keys — is a [`ParseError`]
/// explaining exactly which rule was violated.
#[derive(Clone, Copy, Debug, Default)]
pub struct StructuredJsonParser;

impl StructuredJsonParser {
    pub const FINAL_ACTION: &'static str = "Final Answer";
    const TOOL_KEY: &'static str = "action";
    const ARGS_KEY: &'static str = "action_input";
}

impl OutputParser for StructuredJsonParser {
    fn parse(&self, text: &str) -> Result<ParsedAction, ParseError> {
        let value: Value = serde_json::from_str(text.trim()).map_err(|_| {
            ParseError::new(format!(
                "could not parse the action from {text:?}: the output must be a single \
                 complete JSON object with no surrounding prose"
            ))
        })?;

        let Value::Object(map) = value else {
            return Err(ParseError::new(format!(
                "could not parse the action from {text:?}: expected a JSON object"
            )));
        };

        let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
        keys.sort_unstable();
        if keys != [Self::TOOL_KEY, Self::ARGS_KEY] {
            return Err(ParseError::new(format!(
                "could not parse the action from {text:?}: the object must have exactly \
                 the keys {:?} (tool name) and {:?} (tool arguments)",
                Self::TOOL_KEY,
                Self::ARGS_KEY
            )));
        }

        let tool = map
            .get(Self::TOOL_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ParseError::new(format!(
                    "could not parse the action from {text:?}: {:?} must be a string",
                    Self::TOOL_KEY
                ))
            })?;

        let args_value = &map[Self::ARGS_KEY];
        if tool == Self::FINAL_ACTION {
            let output = match args_value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Ok(ParsedAction::Finish { output });
        }

        let args = match args_value {
            Value::Object(args) => args
                .iter()
                .map(|(k, v)| {
                    let rendered = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), rendered)
                })
                .collect(),
            Value::String(s) => vec![("input".to_string(), s.clone())],
            other => {
                return Err(ParseError::new(format!(
                    "could not parse the action from {text:?}: {:?} must be an object \
                     or string, found {other}",
                    Self::ARGS_KEY
                )));
            }
        };

        Ok(ParsedAction::Invoke {
            tool: tool.to_string(),
            args,
        })
    }

    fn format_instructions(&self) -> String {
        format!(
            "Respond with a single JSON object containing exactly two keys: \
             {:?} (the tool name, or {:?} to finish) and {:?} (the tool arguments).",
            Self::TOOL_KEY,
            Self::FINAL_ACTION,
            Self::ARGS_KEY
        )
    }
}

/// Match raw text against a finite list of permissible conclusion labels.
///
/// Matching is case-insensitive substring containment. Returns the single
/// matching label, or the full list of labels that matched so the caller
/// can diagnose ambiguity.
pub fn match_conclusion<'a>(text: &str, labels: &'a [String]) -> Result<&'a str, Vec<&'a str>> {
    let haystack = text.to_lowercase();
    let matches: Vec<&'a str> = labels
        .iter()
        .filter(|label| !label.is_empty() && haystack.contains(&label.to_lowercase()))
        .map(String::as_str)
        .collect();
    match matches.as_slice() {
        [only] => Ok(only),
        _ => Err(matches),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tool_invocation() {
        let parser = StructuredJsonParser;
        let parsed = parser
            .parse(r#"{"action": "inspect", "action_input": {"target": "web-1"}}"#)
            .unwrap();
        assert_eq!(
            parsed,
            ParsedAction::Invoke {
                tool: "inspect".to_string(),
                args: vec![("target".to_string(), "web-1".to_string())],
            }
        );
    }

    #[test]
    fn parses_final_answer() {
        let parser = StructuredJsonParser;
        let parsed = parser
            .parse(r#"{"action": "Final Answer", "action_input": "all healthy"}"#)
            .unwrap();
        assert_eq!(
            parsed,
            ParsedAction::Finish {
                output: "all healthy".to_string()
            }
        );
    }

    #[test]
    fn rejects_prose() {
        let parser = StructuredJsonParser;
        let err = parser.parse("I think we should inspect the pod").unwrap_err();
        assert!(err.diagnostic.contains("single complete JSON object"));
    }

    #[test]
    fn rejects_wrong_keys() {
        let parser = StructuredJsonParser;
        let err = parser.parse(r#"{"tool": "x", "args": {}}"#).unwrap_err();
        assert!(err.diagnostic.contains("exactly the keys"));
    }

    #[test]
    fn signature_is_case_and_order_insensitive() {
        let a = ParsedAction::Invoke {
            tool: "Inspect".to_string(),
            args: vec![
                ("Target".to_string(), "Web-1".to_string()),
                ("ns".to_string(), "prod".to_string()),
            ],
        };
        let b = ParsedAction::Invoke {
            tool: "inspect".to_string(),
            args: vec![
                ("ns".to_string(), "PROD".to_string()),
                ("target".to_string(), "web-1".to_string()),
            ],
        };
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn conclusion_matching_single() {
        let labels = vec!["yes".to_string(), "no".to_string()];
        assert_eq!(match_conclusion("The answer is YES.", &labels), Ok("yes"));
    }

    #[test]
    fn conclusion_matching_ambiguous_and_empty() {
        let labels = vec!["yes".to_string(), "no".to_string()];
        assert_eq!(
            match_conclusion("yes and no", &labels),
            Err(vec!["yes", "no"])
        );
        assert_eq!(match_conclusion("maybe", &labels), Err(vec![]));
    }
}

//! Prompt templates and the startup-time template registry.
//!
//! Templates use `{name}` placeholders. Rendering is strict in both
//! directions: a variable the template needs but the caller omitted is an
//! error, and so is a variable the caller supplied that the template never
//! mentions — silent prompt drift is how extraction bugs hide.
//!
//! Templates are looked up by name in a [`PromptRegistry`] that is built
//! once at configuration time; nothing resolves template names at call
//! time.

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

/// Errors raised while registering or rendering a template.
#[derive(Debug, Error, Diagnostic)]
pub enum PromptError {
    #[error("prompt template must be a non-empty string")]
    #[diagnostic(code(triagegraph::stage::empty_template))]
    EmptyTemplate,

    #[error("missing required prompt variables: {names:?}")]
    #[diagnostic(
        code(triagegraph::stage::missing_variable),
        help("Every {{placeholder}} in the template must be supplied at render time.")
    )]
    MissingVariables { names: Vec<String> },

    #[error("unexpected prompt variables: {names:?}")]
    #[diagnostic(code(triagegraph::stage::unexpected_variable))]
    UnexpectedVariables { names: Vec<String> },

    #[error("unknown prompt template {name:?}")]
    #[diagnostic(
        code(triagegraph::stage::unknown_template),
        help("Register the template in the PromptRegistry before building stages.")
    )]
    UnknownTemplate { name: String },
}

/// A prompt with `{name}` placeholders, parsed once at construction.
///
/// # Examples
///
/// ```rust
/// use triagegraph::stage::PromptTemplate;
/// use rustc_hash::FxHashMap;
///
/// let template = PromptTemplate::new("Q: {question}\nData: {raw_input}").unwrap();
/// let mut vars = FxHashMap::default();
/// vars.insert("question".to_string(), "why?".to_string());
/// vars.insert("raw_input".to_string(), "because".to_string());
/// assert_eq!(template.render(&vars).unwrap(), "Q: why?\nData: because");
/// ```
#[derive(Clone, Debug)]
pub struct PromptTemplate {
    text: String,
    variables: FxHashSet<String>,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Result<Self, PromptError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(PromptError::EmptyTemplate);
        }
        let variables = scan_placeholders(&text);
        Ok(Self { text, variables })
    }

    /// The placeholder names this template requires.
    #[must_use]
    pub fn variables(&self) -> &FxHashSet<String> {
        &self.variables
    }

    /// Substitute every placeholder, enforcing an exact variable match.
    pub fn render(&self, variables: &FxHashMap<String, String>) -> Result<String, PromptError> {
        let provided: FxHashSet<String> = variables.keys().cloned().collect();

        let mut missing: Vec<String> = self.variables.difference(&provided).cloned().collect();
        if !missing.is_empty() {
            missing.sort();
            return Err(PromptError::MissingVariables { names: missing });
        }
        let mut unexpected: Vec<String> = provided.difference(&self.variables).cloned().collect();
        if !unexpected.is_empty() {
            unexpected.sort();
            return Err(PromptError::UnexpectedVariables { names: unexpected });
        }

        let mut rendered = self.text.clone();
        for (name, value) in variables {
            rendered = rendered.replace(&format!("{{{name}}}"), value);
        }
        Ok(rendered)
    }
}

fn scan_placeholders(text: &str) -> FxHashSet<String> {
    let mut names = FxHashSet::default();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{'
            && let Some(end) = text[i + 1..].find('}')
        {
            let candidate = &text[i + 1..i + 1 + end];
            if !candidate.is_empty()
                && candidate
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                names.insert(candidate.to_string());
            }
            i += end + 2;
        } else {
            i += 1;
        }
    }
    names
}

/// Named templates resolved once at startup.
#[derive(Clone, Debug, Default)]
pub struct PromptRegistry {
    templates: FxHashMap<String, PromptTemplate>,
}

impl PromptRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), PromptError> {
        self.templates
            .insert(name.into(), PromptTemplate::new(text)?);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&PromptTemplate, PromptError> {
        self.templates
            .get(name)
            .ok_or_else(|| PromptError::UnknownTemplate {
                name: name.to_string(),
            })
    }
}

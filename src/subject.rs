//! The workload under diagnosis.

use std::fmt;

/// Identity and context of the workload a graph run is diagnosing.
///
/// The engine treats the subject as opaque prompt context; inspection
/// commands referencing it are plain action strings executed by the
/// external collaborator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Subject {
    pub name: String,
    pub namespace: String,
    /// Resource kind, e.g. "pod".
    pub kind: String,
    /// Free-form detail block gathered by the caller (describe output,
    /// recent events, and the like).
    pub details: String,
}

impl Subject {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            kind: "pod".to_string(),
            details: String::new(),
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    /// Rendering used for the `details` prompt variable.
    #[must_use]
    pub fn info(&self) -> String {
        if self.details.is_empty() {
            format!("{} {}/{}", self.kind, self.namespace, self.name)
        } else {
            format!(
                "{} {}/{}\n{}",
                self.kind, self.namespace, self.name, self.details
            )
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_includes_details_when_present() {
        let bare = Subject::new("web-1", "prod");
        assert_eq!(bare.info(), "pod prod/web-1");

        let detailed = Subject::new("web-1", "prod").with_details("restarts: 4");
        assert_eq!(detailed.info(), "pod prod/web-1\nrestarts: 4");
    }
}

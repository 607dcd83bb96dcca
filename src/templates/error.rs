//! Template error types.

use thiserror::Error;

/// Errors produced while resolving, compiling or rendering a template.
///
/// None of these escape the public render APIs: the engine converts them to
/// empty output ([`TemplateError::NotFound`]) or to a visible marker.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// No tier holds a file for the requested name.
    #[error("Template not found: {name} (persona: {})", .persona.as_deref().unwrap_or("global"))]
    NotFound {
        name: String,
        persona: Option<String>,
    },

    /// The template body failed to compile.
    #[error("Template syntax error in {name}: {}", .diagnostics.join("; "))]
    Syntax {
        name: String,
        diagnostics: Vec<String>,
    },

    /// Evaluation failed (including panics raised by context hooks).
    #[error("Template render error in {name}: {message}")]
    Render { name: String, message: String },

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TemplateError {
    pub fn not_found(name: &str, persona: Option<&str>) -> Self {
        Self::NotFound {
            name: name.to_string(),
            persona: persona.map(str::to_string),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Diagnostic lines suitable for an inline development-mode marker.
    pub fn diagnostics(&self) -> Vec<String> {
        match self {
            Self::Syntax { diagnostics, .. } => diagnostics.clone(),
            other => vec![other.to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = TemplateError::not_found("Greeting", None);
        assert_eq!(err.to_string(), "Template not found: Greeting (persona: global)");
        assert!(err.is_not_found());

        let err = TemplateError::Syntax {
            name: "Card".to_string(),
            diagnostics: vec!["unexpected end".to_string(), "line 3".to_string()],
        };
        assert_eq!(err.to_string(), "Template syntax error in Card: unexpected end; line 3");
        assert_eq!(err.diagnostics().len(), 2);
    }
}

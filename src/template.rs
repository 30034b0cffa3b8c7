//! Prompt templates with `{{$name}}` variables

use std::collections::HashMap;

use tracing::debug;

/// Named values bound into a template
pub type TemplateArgs<'a> = HashMap<&'a str, String>;

/// A prompt template.
///
/// Variables are written `{{$name}}` (whitespace inside the braces is
/// allowed). A variable with no bound value renders as the empty string.
/// Text that is not a variable block, including an unterminated `{{`, is
/// copied through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    source: String,
}

impl PromptTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Substitute `args` into the template
    pub fn render(&self, args: &TemplateArgs<'_>) -> String {
        let mut out = String::with_capacity(self.source.len());
        let mut rest = self.source.as_str();

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];

            let Some(end) = after_open.find("}}") else {
                out.push_str(&rest[start..]);
                return out;
            };

            let block = after_open[..end].trim();
            match block.strip_prefix('$') {
                Some(name) if is_identifier(name) => match args.get(name) {
                    Some(value) => out.push_str(value),
                    None => debug!(variable = name, "Unbound template variable"),
                },
                _ => out.push_str(&rest[start..start + 2 + end + 2]),
            }

            rest = &after_open[end + 2..];
        }

        out.push_str(rest);
        out
    }
}

impl From<&str> for PromptTemplate {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

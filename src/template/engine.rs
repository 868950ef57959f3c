//! Template engine for manifest templates
//!
//! Uses minijinja with its default `{{ ... }}` / `{% ... %}` syntax and strict
//! undefined handling. Go-style field references with a leading dot
//! (`{{ .uniqueName }}`) are accepted by stripping the dot before rendering, so
//! manifests written for `text/template` keep working.

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

/// Template engine shared by all manifest templates
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// Create a new engine with strict undefined behavior
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        Self { env }
    }

    /// Normalize template source into the syntax accepted by [`TemplateEngine::render`]
    pub fn normalize(source: &str) -> String {
        normalize_field_references(source)
    }

    /// Check that normalized template source compiles
    ///
    /// Uses a scratch environment because the shared one only accepts
    /// `'static` template sources.
    pub fn check_syntax(&self, source: &str) -> Result<(), minijinja::Error> {
        Environment::new().template_from_str(source).map(|_| ())
    }

    /// Render normalized template source with the given context
    ///
    /// # Errors
    ///
    /// Fails if the syntax is invalid or a referenced field is undefined.
    pub fn render<S: Serialize>(&self, source: &str, ctx: S) -> Result<String, minijinja::Error> {
        self.env.render_str(source, ctx)
    }
}

/// Strip leading dots from field references inside `{{ }}` and `{% %}` tags.
fn normalize_field_references(template: &str) -> String {
    let mut result = String::with_capacity(template.len());
    let mut remaining = template;

    loop {
        let (start, close) = match (remaining.find("{{"), remaining.find("{%")) {
            (Some(v), Some(b)) if v < b => (v, "}}"),
            (_, Some(b)) => (b, "%}"),
            (Some(v), None) => (v, "}}"),
            (None, None) => break,
        };

        result.push_str(&remaining[..start + 2]);
        remaining = &remaining[start + 2..];

        match remaining.find(close) {
            Some(end) => {
                result.push_str(&strip_leading_dots(&remaining[..end]));
                result.push_str(close);
                remaining = &remaining[end + close.len()..];
            }
            None => {
                // Unclosed tag, leave it for the parser to report
                result.push_str(remaining);
                remaining = "";
            }
        }
    }

    result.push_str(remaining);
    result
}

/// Remove a `.` that starts a field reference, leaving attribute access,
/// numbers and quoted strings alone.
fn strip_leading_dots(expr: &str) -> String {
    let mut result = String::with_capacity(expr.len());
    let mut chars = expr.chars().peekable();
    let mut in_single_quote = false;
    let mut in_double_quote = false;

    while let Some(ch) = chars.next() {
        match ch {
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
                result.push(ch);
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
                result.push(ch);
            }
            '.' if !in_single_quote && !in_double_quote => {
                let follows_value = result
                    .chars()
                    .last()
                    .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | ')' | ']'));
                let starts_ident = chars
                    .peek()
                    .is_some_and(|c| c.is_alphabetic() || *c == '_');
                if follows_value || !starts_ident {
                    result.push('.');
                }
            }
            _ => result.push(ch),
        }
    }

    result
}

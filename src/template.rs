//! Sandboxed template rendering.
//!
//! Templates come from a fixed, code-controlled catalogue. The placeholder
//! grammar is deliberately tiny: `{ident}` substitutes a named variable and
//! `{{`/`}}` escape literal braces. Attribute access, indexing, filters,
//! and any other traversal are rejected at parse time, so untrusted
//! variable values can never steer rendering.
//!
//! Rendering refuses to proceed when a placeholder has no variable, and
//! the produced output is length-bounded. Failures are reported without
//! ever echoing variable values.

use std::collections::HashMap;

use tracing::warn;

use crate::error::{TemplateError, TemplateErrorKind};

/// How substituted values are escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Plain text; values are substituted verbatim.
    Text,
    /// Structured JSON; values are JSON-string-escaped on substitution.
    Json,
}

/// One entry in the code-controlled template catalogue.
#[derive(Debug, Clone)]
pub struct Template {
    /// Catalogue name, used in errors and logs.
    pub name: &'static str,
    /// Template body with `{ident}` placeholders.
    pub body: &'static str,
    /// Escaping discipline for substituted values.
    pub output: OutputKind,
}

/// Variables supplied to a render call.
///
/// Values are plain strings; anything untrusted must pass the secret
/// scanner before landing here.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    values: HashMap<String, String>,
}

impl TemplateVars {
    /// Creates an empty variable set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a variable, replacing any previous value.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    /// Sets a variable in place.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_string(), value.into());
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// Renders catalogue templates in a sandbox.
///
/// # Examples
///
/// ```
/// use mentor_rs::template::{OutputKind, Template, TemplateEngine, TemplateVars};
///
/// let engine = TemplateEngine::new(
///     vec![Template { name: "greet", body: "hello {name}", output: OutputKind::Text }],
///     4096,
/// );
/// let vars = TemplateVars::new().with("name", "world");
/// assert_eq!(engine.render("greet", &vars).unwrap(), "hello world");
/// ```
#[derive(Debug)]
pub struct TemplateEngine {
    templates: HashMap<&'static str, Template>,
    max_output_bytes: usize,
}

impl TemplateEngine {
    /// Builds an engine over a fixed catalogue.
    #[must_use]
    pub fn new(catalogue: Vec<Template>, max_output_bytes: usize) -> Self {
        let templates = catalogue.into_iter().map(|t| (t.name, t)).collect();
        Self {
            templates,
            max_output_bytes: max_output_bytes.max(1),
        }
    }

    /// Renders the named template with the given variables.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] naming the template and failure kind;
    /// variable values appear in neither the error nor the log entry.
    pub fn render(
        &self,
        name: &str,
        vars: &TemplateVars,
    ) -> std::result::Result<String, TemplateError> {
        let Some(template) = self.templates.get(name) else {
            let error = TemplateError::new(TemplateErrorKind::UnknownTemplate, name.to_string());
            warn!(template = name, kind = %error.kind, "template render failed");
            return Err(error);
        };

        match render_body(template, vars, self.max_output_bytes) {
            Ok(rendered) => Ok(rendered),
            Err(kind) => {
                let error = TemplateError::new(kind, template.name);
                warn!(template = template.name, kind = %error.kind, "template render failed");
                Err(error)
            }
        }
    }

    /// Whether the catalogue contains the named template.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }
}

fn render_body(
    template: &Template,
    vars: &TemplateVars,
    max_output_bytes: usize,
) -> std::result::Result<String, TemplateErrorKind> {
    let body = template.body;
    let mut output = String::with_capacity(body.len());
    let mut chars = body.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        match c {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    output.push('{');
                    continue;
                }
                let name = read_placeholder(&mut chars)?;
                let Some(value) = vars.get(&name) else {
                    return Err(TemplateErrorKind::MissingVariable);
                };
                match template.output {
                    OutputKind::Text => output.push_str(value),
                    OutputKind::Json => push_json_escaped(&mut output, value),
                }
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    output.push('}');
                } else {
                    // A stray closing brace means the body is malformed.
                    return Err(TemplateErrorKind::Syntax);
                }
            }
            _ => output.push(c),
        }

        if output.len() > max_output_bytes {
            return Err(TemplateErrorKind::OutputTooLarge);
        }
    }

    if output.len() > max_output_bytes {
        return Err(TemplateErrorKind::OutputTooLarge);
    }
    Ok(output)
}

/// Reads a `{ident}` placeholder after the opening brace.
///
/// Idents are `[a-z][a-z0-9_]*`. A dot, bracket, pipe, or any other
/// character is an unsafe construct, rejected before any lookup happens.
fn read_placeholder(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
) -> std::result::Result<String, TemplateErrorKind> {
    let mut name = String::new();
    for (_, c) in chars.by_ref() {
        match c {
            '}' => {
                if name.is_empty() {
                    return Err(TemplateErrorKind::Syntax);
                }
                return Ok(name);
            }
            'a'..='z' => name.push(c),
            '0'..='9' | '_' if !name.is_empty() => name.push(c),
            '.' | '[' | ']' | '|' | '(' | ')' | ':' => {
                return Err(TemplateErrorKind::UnsafeConstruct);
            }
            _ => return Err(TemplateErrorKind::Syntax),
        }
    }
    // Ran out of input before the closing brace.
    Err(TemplateErrorKind::Syntax)
}

/// Appends `value` JSON-string-escaped (without surrounding quotes).
fn push_json_escaped(output: &mut String, value: &str) {
    let quoted = serde_json::to_string(value).unwrap_or_default();
    // Strip the quotes serde adds around a bare string.
    if quoted.len() >= 2 {
        output.push_str(&quoted[1..quoted.len() - 1]);
    }
}

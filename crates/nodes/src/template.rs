//! String templates resolved against the run context.
//!
//! Node fields such as `endpoint` or `userPrompt` may reference earlier
//! results, e.g. `https://api.example.com/users/{{ lookup.data.id }}`.
//! Rendering is pure and fuel-bounded, so a retried step can re-render safely.

use std::borrow::Cow;

use minijinja::{AutoEscape, Environment, Error, ErrorKind, UndefinedBehavior, Value};

use crate::{Context, NodeError};

/// Upper bound on template instructions per render.
const TEMPLATE_FUEL: u64 = 50_000;

/// Sandboxed renderer shared by every executor.
#[derive(Debug)]
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_fuel(Some(TEMPLATE_FUEL));
        env.add_filter("json", to_pretty_json);
        env.add_function("json", to_pretty_json);
        Self { env }
    }

    /// Render `template` against `context`. Missing variables render empty.
    ///
    /// `field` is only used to label errors.
    pub fn render(&self, field: &str, template: &str, context: &Context) -> Result<String, NodeError> {
        let source = rewrite_json_helper(template);
        self.env
            .render_str(&source, context.as_map())
            .map_err(|e| NodeError::validation(format!("{field}: invalid template: {e}")))
    }

    /// Render a field that must produce a non-blank value.
    pub fn render_required(
        &self,
        field: &str,
        template: Option<&str>,
        context: &Context,
    ) -> Result<String, NodeError> {
        let rendered = match template {
            Some(t) if !t.trim().is_empty() => self.render(field, t, context)?,
            _ => String::new(),
        };
        if rendered.trim().is_empty() {
            return Err(NodeError::validation(format!("{field} is required")));
        }
        Ok(rendered)
    }
}

fn to_pretty_json(value: Value) -> Result<String, Error> {
    serde_json::to_string_pretty(&value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("json: {e}")))
}

/// Accept the helper-call form `{{json user}}` by rewriting it to
/// `{{ json(user) }}`. Other tags are left untouched.
fn rewrite_json_helper(source: &str) -> Cow<'_, str> {
    if !source.contains("json") {
        return Cow::Borrowed(source);
    }

    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return Cow::Owned(out);
        };
        let tag = &after[..end];
        match tag
            .trim()
            .strip_prefix("json")
            .filter(|arg| arg.starts_with(char::is_whitespace))
        {
            Some(arg) => {
                out.push_str("{{ json(");
                out.push_str(arg.trim());
                out.push_str(") }}");
            }
            None => {
                out.push_str("{{");
                out.push_str(tag);
                out.push_str("}}");
            }
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Cow::Owned(out)
}

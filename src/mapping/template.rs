//! Template engine for URIs, bodies, cache keys and transform output.
//!
//! Uses Handlebars. Templates are parsed once when a mapping is compiled and
//! rendered per request against the request context. A variable that does
//! not exist renders as empty text; only malformed syntax is an error.

use handlebars::Handlebars;
use serde::Serialize;
use thiserror::Error;

/// The templates a compiled mapping can own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Uri,
    Body,
    CacheKey,
    Output,
}

impl TemplateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateKind::Uri => "uri",
            TemplateKind::Body => "body",
            TemplateKind::CacheKey => "cache_key",
            TemplateKind::Output => "output",
        }
    }
}

impl std::fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request rendering failure.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to render {kind} template: {source}")]
    Template {
        kind: TemplateKind,
        #[source]
        source: handlebars::RenderError,
    },

    #[error("rendered uri {uri:?} is not a valid absolute uri")]
    InvalidUri { uri: String },

    #[error("header {name:?} has a value that cannot be sent")]
    InvalidHeader { name: String },
}

/// A set of pre-parsed templates belonging to one mapping.
pub struct TemplateSet {
    handlebars: Handlebars<'static>,
}

impl TemplateSet {
    /// Create an empty set with the gateway helpers registered.
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();

        handlebars.register_helper("json", Box::new(json_helper));
        handlebars.register_helper("default", Box::new(default_helper));
        handlebars.register_helper("upper", Box::new(upper_helper));
        handlebars.register_helper("lower", Box::new(lower_helper));

        // Output is URIs, JSON and plain text, never HTML.
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }

    /// Parse and store a template.
    pub fn register(
        &mut self,
        kind: TemplateKind,
        source: &str,
    ) -> Result<(), handlebars::TemplateError> {
        self.handlebars.register_template_string(kind.as_str(), source)
    }

    /// Whether a template of this kind was registered.
    pub fn contains(&self, kind: TemplateKind) -> bool {
        self.handlebars.has_template(kind.as_str())
    }

    /// Render a registered template.
    ///
    /// Rendering an unregistered kind yields empty text.
    pub fn render<T: Serialize>(&self, kind: TemplateKind, data: &T) -> Result<String, RenderError> {
        if !self.contains(kind) {
            return Ok(String::new());
        }
        self.handlebars
            .render(kind.as_str(), data)
            .map_err(|source| RenderError::Template { kind, source })
    }
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TemplateSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&String> = self.handlebars.get_templates().keys().collect();
        f.debug_struct("TemplateSet").field("templates", &names).finish()
    }
}

fn json_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).map(|v| v.value().clone()).unwrap_or_default();
    out.write(&serde_json::to_string(&value).unwrap_or_default())?;
    Ok(())
}

fn default_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).map(|v| v.value());
    let default = h.param(1).and_then(|v| v.value().as_str()).unwrap_or("");

    match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => out.write(s)?,
        Some(v) if !v.is_null() && !v.is_string() => out.write(&v.to_string())?,
        _ => out.write(default)?,
    }
    Ok(())
}

fn upper_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&value.to_uppercase())?;
    Ok(())
}

fn lower_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&value.to_lowercase())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set_with(kind: TemplateKind, source: &str) -> TemplateSet {
        let mut set = TemplateSet::new();
        set.register(kind, source).unwrap();
        set
    }

    #[test]
    fn test_dotted_paths() {
        let set = set_with(TemplateKind::Uri, "http://backend{{request.path}}?q={{query.q}}");
        let ctx = json!({ "request": { "path": "/users" }, "query": { "q": "bob" } });
        assert_eq!(
            set.render(TemplateKind::Uri, &ctx).unwrap(),
            "http://backend/users?q=bob"
        );
    }

    #[test]
    fn test_missing_variable_renders_empty() {
        let set = set_with(TemplateKind::Body, "[{{query.missing}}]");
        let ctx = json!({ "query": {} });
        assert_eq!(set.render(TemplateKind::Body, &ctx).unwrap(), "[]");
    }

    #[test]
    fn test_malformed_template_rejected() {
        let mut set = TemplateSet::new();
        assert!(set.register(TemplateKind::Body, "{{#if}}unclosed").is_err());
    }

    #[test]
    fn test_no_html_escaping() {
        let set = set_with(TemplateKind::Output, "{{data.v}}");
        let ctx = json!({ "data": { "v": "<a&b>" } });
        assert_eq!(set.render(TemplateKind::Output, &ctx).unwrap(), "<a&b>");
    }

    #[test]
    fn test_unregistered_kind_renders_empty() {
        let set = TemplateSet::new();
        assert_eq!(set.render(TemplateKind::CacheKey, &json!({})).unwrap(), "");
    }

    #[test]
    fn test_helpers() {
        let set = set_with(
            TemplateKind::Output,
            "{{upper data.name}} {{lower data.name}} {{default data.none \"n/a\"}} {{json data.obj}}",
        );
        let ctx = json!({ "data": { "name": "Alice", "obj": { "a": 1 } } });
        assert_eq!(
            set.render(TemplateKind::Output, &ctx).unwrap(),
            "ALICE alice n/a {\"a\":1}"
        );
    }
}

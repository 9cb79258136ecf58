//! Source identity and retrieval templates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a product source, from static configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One product origin (site or app), immutable after startup.
///
/// Templates contain `{query}` and `{locale}` placeholders expanded per
/// search. The registry that builds these is external; the core only
/// expands them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,

    /// Human-readable name for logs and events
    pub name: String,

    /// Base URL used to resolve relative image/detail links
    pub base_url: String,

    /// Primary search URL template
    pub search_template: String,

    /// Alternate URL variants tried after the primary, in order
    #[serde(default)]
    pub alternate_templates: Vec<String>,

    /// Source renders its listings with client-side scripts; static
    /// fetches return a shell document
    #[serde(default)]
    pub requires_rendering: bool,

    /// Selector the render collaborator should wait for before snapshotting
    #[serde(default)]
    pub wait_selector: Option<String>,
}

impl Source {
    /// Create a source with a primary search template.
    pub fn new(
        id: impl Into<SourceId>,
        name: impl Into<String>,
        base_url: impl Into<String>,
        search_template: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            base_url: base_url.into(),
            search_template: search_template.into(),
            alternate_templates: Vec::new(),
            requires_rendering: false,
            wait_selector: None,
        }
    }

    /// Mark the source as script-rendered.
    pub fn rendered(mut self) -> Self {
        self.requires_rendering = true;
        self
    }

    /// Add an alternate URL template.
    pub fn with_alternate(mut self, template: impl Into<String>) -> Self {
        self.alternate_templates.push(template.into());
        self
    }

    /// Set the render wait selector.
    pub fn with_wait_selector(mut self, selector: impl Into<String>) -> Self {
        self.wait_selector = Some(selector.into());
        self
    }

    /// Expand the primary search template for a query.
    pub fn search_url(&self, query: &str, locale: &str) -> String {
        expand_template(&self.search_template, query, locale)
    }

    /// Expand every alternate template, in configured order.
    pub fn alternate_urls(&self, query: &str, locale: &str) -> Vec<String> {
        self.alternate_templates
            .iter()
            .map(|t| expand_template(t, query, locale))
            .collect()
    }
}

impl From<String> for SourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

fn expand_template(template: &str, query: &str, locale: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    template
        .replace("{query}", &encoded)
        .replace("{locale}", locale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_and_encodes_query() {
        let source = Source::new(
            "freshmart",
            "FreshMart",
            "https://freshmart.example",
            "https://freshmart.example/search?q={query}&loc={locale}",
        );

        let url = source.search_url("toned milk 500ml", "en-IN");
        assert_eq!(
            url,
            "https://freshmart.example/search?q=toned+milk+500ml&loc=en-IN"
        );
    }

    #[test]
    fn alternate_urls_preserve_order() {
        let source = Source::new("s", "S", "https://s.example", "https://s.example/a?q={query}")
            .with_alternate("https://s.example/b?q={query}")
            .with_alternate("https://s.example/c?q={query}");

        let alts = source.alternate_urls("x", "en");
        assert_eq!(alts.len(), 2);
        assert!(alts[0].contains("/b?"));
        assert!(alts[1].contains("/c?"));
    }
}

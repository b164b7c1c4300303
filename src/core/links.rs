//! Link templates for item and list results.
//!
//! Hrefs are URI templates with two placeholder forms: `{var}` percent-encodes
//! the value and `{+var}` inserts it as-is (for base URLs). Variables are dotted
//! paths looked up in the expanded object first, then in the template context.
//! Undefined variables expand to the empty string.

use crate::core::record::{is_truthy, lookup_path};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\+?)([A-Za-z0-9_.]+)\}").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LinkRepr")]
pub struct LinkSpec {
    pub href: String,
    /// Render only when this path is truthy in the expanded object.
    pub when: Option<String>,
}

/// Links may be written as a bare href string or as `{ href, when }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum LinkRepr {
    Href(String),
    Full {
        href: String,
        #[serde(default)]
        when: Option<String>,
    },
}

impl From<LinkRepr> for LinkSpec {
    fn from(repr: LinkRepr) -> Self {
        match repr {
            LinkRepr::Href(href) => LinkSpec { href, when: None },
            LinkRepr::Full { href, when } => LinkSpec { href, when },
        }
    }
}

impl LinkSpec {
    pub fn new(href: &str) -> Self {
        Self {
            href: href.to_string(),
            when: None,
        }
    }

    pub fn when(mut self, path: &str) -> Self {
        self.when = Some(path.to_string());
        self
    }

    fn should_render(&self, obj: &Value, context: &Map<String, Value>) -> bool {
        match &self.when {
            Some(path) => resolve(path, obj, context).is_some_and(is_truthy),
            None => true,
        }
    }

    pub fn expand(&self, obj: &Value, context: &Map<String, Value>) -> String {
        PLACEHOLDER
            .replace_all(&self.href, |caps: &Captures<'_>| {
                let reserved = !caps[1].is_empty();
                match resolve(&caps[2], obj, context) {
                    Some(value) => {
                        let raw = scalar_text(value);
                        if reserved { raw } else { percent_encode(&raw) }
                    }
                    None => String::new(),
                }
            })
            .into_owned()
    }
}

/// Named links plus an optional `actions` sub-map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinksTemplate {
    links: BTreeMap<String, LinkSpec>,
    actions: BTreeMap<String, LinkSpec>,
    context: Map<String, Value>,
}

impl LinksTemplate {
    pub fn new(links: BTreeMap<String, LinkSpec>, context: Map<String, Value>) -> Self {
        Self {
            links,
            actions: BTreeMap::new(),
            context,
        }
    }

    /// Also render `actions` links under a nested `"actions"` key.
    pub fn with_actions(mut self, actions: BTreeMap<String, LinkSpec>) -> Self {
        self.actions = actions;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty() && self.actions.is_empty()
    }

    pub fn expand(&self, obj: &Value) -> Value {
        let mut out = Map::new();
        for (name, link) in &self.links {
            if link.should_render(obj, &self.context) {
                out.insert(name.clone(), Value::String(link.expand(obj, &self.context)));
            }
        }
        if !self.actions.is_empty() {
            let mut actions = Map::new();
            for (name, link) in &self.actions {
                if link.should_render(obj, &self.context) {
                    actions.insert(name.clone(), Value::String(link.expand(obj, &self.context)));
                }
            }
            out.insert("actions".to_string(), Value::Object(actions));
        }
        Value::Object(out)
    }
}

fn resolve<'v>(path: &str, obj: &'v Value, context: &'v Map<String, Value>) -> Option<&'v Value> {
    lookup_path(obj, path)
        .filter(|v| !v.is_null())
        .or_else(|| {
            let (head, rest) = match path.split_once('.') {
                Some((head, rest)) => (head, Some(rest)),
                None => (path, None),
            };
            let root = context.get(head)?;
            match rest {
                Some(rest) => lookup_path(root, rest),
                None => Some(root),
            }
        })
        .filter(|v| !v.is_null())
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn percent_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> Map<String, Value> {
        let mut ctx = Map::new();
        ctx.insert("api".to_string(), json!("https://host/api"));
        ctx
    }

    #[test]
    fn simple_and_reserved_expansion() {
        let link = LinkSpec::new("{+api}/records/{id}?q={metadata.title}");
        let obj = json!({"id": "01J", "metadata": {"title": "a b/c"}});
        assert_eq!(link.expand(&obj, &context()), "https://host/api/records/01J?q=a%20b%2Fc");
    }

    #[test]
    fn conditional_links_and_actions() {
        let mut links = BTreeMap::new();
        links.insert("self".to_string(), LinkSpec::new("{+api}/records/{id}"));
        links.insert(
            "finished".to_string(),
            LinkSpec::new("{+api}/records/{id}/report").when("is_finished"),
        );
        let mut actions = BTreeMap::new();
        actions.insert("finish".to_string(), LinkSpec::new("{+api}/records/{id}/actions/finish"));
        let tpl = LinksTemplate::new(links, context()).with_actions(actions);

        let open = tpl.expand(&json!({"id": "r1", "is_finished": false}));
        assert_eq!(open["self"], "https://host/api/records/r1");
        assert!(open.get("finished").is_none());
        assert_eq!(open["actions"]["finish"], "https://host/api/records/r1/actions/finish");

        let done = tpl.expand(&json!({"id": "r1", "is_finished": true}));
        assert_eq!(done["finished"], "https://host/api/records/r1/report");
    }

    #[test]
    fn links_deserialize_from_either_form() {
        let raw = r#"
            self = "{+api}/records"
            next = { href = "{+api}/records?page={next_page}", when = "next_page" }
        "#;
        let parsed: BTreeMap<String, LinkSpec> = toml::from_str(raw).unwrap();
        assert_eq!(parsed["self"].when, None);
        assert_eq!(parsed["next"].when.as_deref(), Some("next_page"));

        let tpl = LinksTemplate::new(parsed, context());
        let out = tpl.expand(&json!({"page": 1, "next_page": null}));
        assert!(out.get("next").is_none());
        assert_eq!(out["self"], "https://host/api/records");
    }
}

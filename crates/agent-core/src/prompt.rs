//! Prompt Templates
//!
//! System prompts are plain strings with `{slot}` placeholders, filled from
//! the keyword arguments of the current run. `{{` and `}}` produce literal
//! braces; slots without a value are left as written.

use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.

Use the available tools when they help answer the request. After receiving
tool results, synthesize them into a helpful response. If a tool reports an
error, correct the call or answer without it.
Be concise and accurate.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Fill slots from `vars`: strings verbatim, other values as JSON.
    pub fn render(&self, vars: &Map<String, Value>) -> String {
        let mut out = String::with_capacity(self.template.len());
        for segment in Segments::new(&self.template) {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Slot(name) => match vars.get(name) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(other) => out.push_str(&other.to_string()),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                },
            }
        }
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

impl From<&str> for PromptTemplate {
    fn from(template: &str) -> Self {
        Self::new(template)
    }
}

impl From<String> for PromptTemplate {
    fn from(template: String) -> Self {
        Self::new(template)
    }
}

enum Segment<'a> {
    Text(&'a str),
    Slot(&'a str),
}

/// Splits a template into literal text and `{name}` slots
struct Segments<'a> {
    rest: &'a str,
}

impl<'a> Segments<'a> {
    const fn new(template: &'a str) -> Self {
        Self { rest: template }
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }

        let rest = self.rest;
        if let Some(tail) = rest.strip_prefix("{{") {
            self.rest = tail;
            return Some(Segment::Text("{"));
        }
        if let Some(tail) = rest.strip_prefix("}}") {
            self.rest = tail;
            return Some(Segment::Text("}"));
        }
        if let Some(tail) = rest.strip_prefix('{') {
            if let Some(end) = tail.find('}') {
                let name = &tail[..end];
                if is_slot_name(name) {
                    self.rest = &tail[end + 1..];
                    return Some(Segment::Slot(name));
                }
            }
            self.rest = tail;
            return Some(Segment::Text("{"));
        }

        // Literal run up to the next brace; a lone '}' is literal too.
        let first = rest.chars().next().map_or(1, char::len_utf8);
        let end = rest[first..]
            .find(['{', '}'])
            .map_or(rest.len(), |i| i + first);
        self.rest = &rest[end..];
        Some(Segment::Text(&rest[..end]))
    }
}

fn is_slot_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// One template or several named ones.
///
/// Named templates keep their configured order; the first entry is the one
/// an agent uses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Prompts {
    Single(PromptTemplate),
    Named(Vec<(String, PromptTemplate)>),
}

impl Prompts {
    pub fn primary(&self) -> Option<&PromptTemplate> {
        match self {
            Self::Single(template) => Some(template),
            Self::Named(entries) => entries.first().map(|(_, template)| template),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Named(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'de> Deserialize<'de> for Prompts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PromptsVisitor;

        impl<'de> Visitor<'de> for PromptsVisitor {
            type Value = Prompts;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a prompt template or a map of named prompt templates")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Prompts, E> {
                Ok(Prompts::Single(PromptTemplate::new(value)))
            }

            fn visit_string<E: de::Error>(self, value: String) -> Result<Prompts, E> {
                Ok(Prompts::Single(PromptTemplate::new(value)))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Prompts, A::Error> {
                let mut entries = Vec::new();
                while let Some((name, template)) = map.next_entry::<String, String>()? {
                    entries.push((name, PromptTemplate::new(template)));
                }
                Ok(Prompts::Named(entries))
            }
        }

        deserializer.deserialize_any(PromptsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn renders_slots() {
        let template = PromptTemplate::new("You are {role}. Budget: {budget}.");
        let out = template.render(&vars(json!({"role": "a librarian", "budget": 3})));
        assert_eq!(out, "You are a librarian. Budget: 3.");
    }

    #[test]
    fn missing_slots_stay_verbatim() {
        let template = PromptTemplate::new("Hello {name}, today is {day}");
        let out = template.render(&vars(json!({"name": "Ada"})));
        assert_eq!(out, "Hello Ada, today is {day}");
    }

    #[test]
    fn escapes_and_non_slots() {
        let template = PromptTemplate::new(r#"Reply as {{"answer": {x}}} or { not a slot }"#);
        let out = template.render(&vars(json!({"x": 1})));
        assert_eq!(out, r#"Reply as {"answer": 1} or { not a slot }"#);
    }

    #[test]
    fn prompts_from_yaml_keep_order() {
        let prompts: Prompts = serde_yaml::from_str("zeta: first\nalpha: second\n").unwrap();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts.primary().unwrap().as_str(), "first");
        let Prompts::Named(entries) = &prompts else {
            panic!("expected named prompts");
        };
        assert_eq!(entries[1].0, "alpha");
        assert_eq!(entries[1].1.as_str(), "second");

        let single: Prompts = serde_yaml::from_str("\"just one {x}\"").unwrap();
        assert_eq!(single.primary().unwrap().as_str(), "just one {x}");
    }
}

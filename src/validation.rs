//! Validation: per-class rules, hooks, and the aggregate walk over casted
//! children.
//!
//! An object is valid when its own rules pass *and* every casted object it
//! owns (directly or through a collection) is valid. Each invalid child adds a
//! single `"is invalid"` message under the owning property.
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::model::Model;

pub const BLANK_MESSAGE: &str = "can't be blank";
pub const INVALID_MESSAGE: &str = "is invalid";

/// Runs before or after a validation pass; may mutate the object.
pub type Hook = Arc<dyn Fn(&Model) + Send + Sync>;

/// A custom rule records its failures into the error map.
pub type Check = Arc<dyn Fn(&Model, &mut Errors) + Send + Sync>;

#[derive(Clone)]
pub enum Rule {
    /// The property (or schemaless key) must not be blank.
    Presence { property: String, message: Option<String> },
    Custom(Check),
}

/// Ordered property name → messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Errors(IndexMap<String, Vec<String>>);

// ————————————————————————————————————————————————————————————————————————————
// ERRORS
// ————————————————————————————————————————————————————————————————————————————

impl Errors {
    pub fn add(&mut self, property: impl Into<String>, message: impl Into<String>) {
        self.0.entry(property.into()).or_default().push(message.into());
    }

    /// Messages recorded for `property`.
    pub fn on(&self, property: &str) -> &[String] {
        self.0.get(property).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of messages.
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// `"Client name can't be blank"` style messages.
    pub fn full_messages(&self) -> Vec<String> {
        self.iter()
            .flat_map(|(property, messages)| {
                let label = humanize(property);
                messages.iter().map(move |m| format!("{label} {m}"))
            })
            .collect()
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_messages().join(", "))
    }
}

fn humanize(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => spaced,
    }
}

// ————————————————————————————————————————————————————————————————————————————
// RULES
// ————————————————————————————————————————————————————————————————————————————

impl Rule {
    pub fn custom<F>(check: F) -> Rule
    where
        F: Fn(&Model, &mut Errors) + Send + Sync + 'static,
    {
        Rule::Custom(Arc::new(check))
    }

    fn apply(&self, model: &Model, errors: &mut Errors) {
        match self {
            Rule::Presence { property, message } => {
                let value = model.get(property).unwrap_or_else(|_| model.lookup(property));
                if value.is_blank() {
                    errors.add(property.as_str(), message.as_deref().unwrap_or(BLANK_MESSAGE));
                }
            }
            Rule::Custom(check) => check(model, errors),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Presence { property, message } => f
                .debug_struct("Presence")
                .field("property", property)
                .field("message", message)
                .finish(),
            Rule::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// AGGREGATE VALIDITY
// ————————————————————————————————————————————————————————————————————————————

impl Model {
    /// Run hooks and rules, then validate every owned child. Every child is
    /// visited even after a failure so each one carries its own errors.
    pub fn valid(&self) -> bool {
        let class = self.class();
        for hook in class.before_validation() {
            hook(self);
        }
        let mut errors = Errors::default();
        for rule in class.rules() {
            rule.apply(self, &mut errors);
        }
        let mut invalid: Vec<String> = Vec::new();
        for (property, child) in self.owned_children() {
            if !child.valid() && !invalid.iter().any(|p| p == property.name()) {
                invalid.push(property.name().to_string());
            }
        }
        for property in invalid {
            errors.add(property, INVALID_MESSAGE);
        }
        let ok = errors.is_empty();
        if !ok {
            tracing::debug!(class = class.name(), %errors, "validation failed");
        }
        self.set_errors(errors);
        for hook in class.after_validation() {
            hook(self);
        }
        ok
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

//! Attribute filters for `get_objects`.

use crate::selection::IdSelection;
use hostbase_object::Object;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A constraint on one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Matches if the attribute equals any listed value. An empty list
    /// leaves the attribute unconstrained.
    Any(Vec<Value>),
    /// Matches nothing.
    Nothing,
}

/// An attribute filter: every constrained attribute must match.
///
/// Values match exactly, string patterns may use `*` wildcards, and a
/// list-valued attribute matches if any of its elements does. The `type`
/// key matches subtypes too.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    constraints: BTreeMap<String, Constraint>,
}

impl Filter {
    /// Creates an unconstrained filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts `name` to any of `values`.
    #[must_use]
    pub fn with<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.constraints.insert(
            name.to_string(),
            Constraint::Any(values.into_iter().map(Into::into).collect()),
        );
        self
    }

    /// Restricts `name` to a single value.
    #[must_use]
    pub fn with_value(self, name: &str, value: impl Into<Value>) -> Self {
        self.with(name, [value.into()])
    }

    /// Restricts `name` by an id selection.
    #[must_use]
    pub fn with_selection(mut self, name: &str, selection: &IdSelection) -> Self {
        self.constraints
            .insert(name.to_string(), selection.to_constraint());
        self
    }

    /// Sets a raw constraint.
    #[must_use]
    pub fn with_constraint(mut self, name: &str, constraint: Constraint) -> Self {
        self.constraints.insert(name.to_string(), constraint);
        self
    }

    /// Builds a filter matching exactly the record `object` identifies.
    pub fn from_ident(object: &Object) -> Self {
        Self::from_ident_pairs(object.ident_pairs())
    }

    /// Builds a filter from ident pairs.
    pub fn from_ident_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            constraints: pairs
                .into_iter()
                .map(|(name, value)| (name.into(), Constraint::Any(vec![value])))
                .collect(),
        }
    }

    /// Decodes a JSON filter hash: list values mean "any of", scalars one
    /// value.
    pub fn from_json(hash: &Map<String, Value>) -> Self {
        Self {
            constraints: hash
                .iter()
                .map(|(name, value)| {
                    let values = match value {
                        Value::Array(items) => items.clone(),
                        other => vec![other.clone()],
                    };
                    (name.clone(), Constraint::Any(values))
                })
                .collect(),
        }
    }

    /// Returns the constraint on `name`, if any.
    pub fn constraint(&self, name: &str) -> Option<&Constraint> {
        self.constraints.get(name)
    }

    /// Returns the values `name` is restricted to. `None` if unconstrained.
    pub fn values(&self, name: &str) -> Option<&[Value]> {
        match self.constraints.get(name) {
            Some(Constraint::Any(values)) if !values.is_empty() => Some(values),
            Some(Constraint::Nothing) => Some(&[]),
            _ => None,
        }
    }

    /// Returns the string values `name` is restricted to.
    pub fn strings(&self, name: &str) -> Option<Vec<&str>> {
        self.values(name)
            .map(|values| values.iter().filter_map(Value::as_str).collect())
    }

    /// Iterates over every constrained value, for ownership lookups.
    pub fn referenced_values(&self) -> impl Iterator<Item = &Value> {
        self.constraints.values().flat_map(|constraint| match constraint {
            Constraint::Any(values) => values.as_slice(),
            Constraint::Nothing => &[],
        })
    }

    /// Returns true if the filter cannot match anything.
    pub fn matches_nothing(&self) -> bool {
        self.constraints
            .values()
            .any(|constraint| matches!(constraint, Constraint::Nothing))
    }

    /// Returns true if `object` passes every constraint.
    pub fn matches(&self, object: &Object) -> bool {
        self.constraints.iter().all(|(name, constraint)| {
            let candidates = match constraint {
                Constraint::Nothing => return false,
                Constraint::Any(values) if values.is_empty() => return true,
                Constraint::Any(values) => values,
            };
            if name == "type" {
                return candidates
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|type_name| object.is_a(type_name));
            }
            let actual = object.get(name).unwrap_or(&NULL);
            candidates
                .iter()
                .any(|candidate| value_matches(actual, candidate))
        })
    }
}

static NULL: Value = Value::Null;

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn wildcard_matches(pattern: &str, text: &str) -> bool {
    let expression = format!("^{}$", regex::escape(pattern).replace("\\*", ".*"));
    Regex::new(&expression)
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

fn value_matches(actual: &Value, candidate: &Value) -> bool {
    if let Value::Array(items) = actual {
        if items.is_empty() {
            return candidate.is_null();
        }
        return items.iter().any(|item| value_matches(item, candidate));
    }
    match (scalar_text(actual), candidate) {
        (None, Value::Null) => actual.is_null(),
        (None, _) => false,
        (Some(_), Value::Null) => false,
        (Some(text), Value::String(pattern)) if pattern.contains('*') => {
            wildcard_matches(pattern, &text)
        }
        (Some(text), other) => scalar_text(other).is_some_and(|expected| expected == text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(id: &str) -> Object {
        Object::opsi_client(id)
    }

    #[test]
    fn unconstrained_matches_all() {
        assert!(Filter::new().matches(&client("a")));
        assert!(Filter::new().with("id", Vec::<Value>::new()).matches(&client("a")));
    }

    #[test]
    fn any_of_values() {
        let filter = Filter::new().with("id", ["a", "b"]);
        assert!(filter.matches(&client("a")));
        assert!(!filter.matches(&client("c")));
    }

    #[test]
    fn nothing_matches_nothing() {
        let filter = Filter::new().with_selection("id", &IdSelection::None);
        assert!(!filter.matches(&client("a")));
        assert!(filter.matches_nothing());
    }

    #[test]
    fn wildcards() {
        let filter = Filter::new().with_value("id", "*.lab.example.org");
        assert!(filter.matches(&client("pc1.lab.example.org")));
        assert!(!filter.matches(&client("pc1.office.example.org")));
        let dotted = Filter::new().with_value("id", "pc1.lab*");
        assert!(!dotted.matches(&client("pc1xlab")));
    }

    #[test]
    fn type_matches_subtypes() {
        let depots = Filter::new().with_value("type", "OpsiDepotserver");
        assert!(depots.matches(&Object::opsi_configserver("s")));
        assert!(depots.matches(&Object::opsi_depotserver("d")));
        assert!(!depots.matches(&client("c")));
    }

    #[test]
    fn list_attributes_match_any_element() {
        let pool = Object::license_pool("p").with("productIds", json!(["office", "visio"]));
        assert!(Filter::new().with_value("productIds", "visio").matches(&pool));
        assert!(!Filter::new().with_value("productIds", "gimp").matches(&pool));
    }

    #[test]
    fn null_and_numbers() {
        let license = Object::retail_software_license("l", "c").with("maxInstallations", 2);
        assert!(Filter::new().with_value("boundToHost", Value::Null).matches(&license));
        assert!(Filter::new().with_value("maxInstallations", 2).matches(&license));
        assert!(Filter::new().with_value("maxInstallations", "2").matches(&license));
    }

    #[test]
    fn from_ident_selects_one_record() {
        let poc = Object::product_on_client("p", "LocalbootProduct", "c");
        let filter = Filter::from_ident(&poc);
        assert!(filter.matches(&poc.clone().with("actionRequest", "setup")));
        assert!(!filter.matches(&Object::product_on_client("q", "LocalbootProduct", "c")));
    }

    #[test]
    fn json_filter() {
        let hash = json!({"id": ["a", "b"], "type": "OpsiClient"});
        let filter = Filter::from_json(hash.as_object().unwrap());
        assert!(filter.matches(&client("b")));
        assert_eq!(filter.referenced_values().count(), 3);
    }
}

// src/task/spec.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::result::TaskError;
use crate::types::TaskKind;

/// One unit of work as submitted to the scheduler, before instantiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub kind: TaskKind,
    /// Human label; defaults to the kind.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "params")]
    pub parameters: Params,
    /// Position in the run queue. The scheduler rewrites this to the
    /// submission index when a run starts.
    #[serde(default)]
    pub order: usize,
}

impl TaskSpec {
    pub fn new(kind: impl Into<TaskKind>) -> Self {
        Self {
            kind: kind.into(),
            name: None,
            parameters: Params::default(),
            order: 0,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key, value);
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.kind.as_str())
    }

    /// Specs listed under the [`NESTED_TASKS_KEY`] parameter, each written as
    /// `{ kind, name?, params? }`. Empty when the parameter is absent.
    pub fn nested_specs(&self) -> Result<Vec<TaskSpec>, TaskError> {
        let Some(value) = self.parameters.get(NESTED_TASKS_KEY) else {
            return Ok(Vec::new());
        };
        let mut nested: Vec<TaskSpec> = serde_json::from_value(value.clone())
            .map_err(|e| TaskError::invalid_parameter(NESTED_TASKS_KEY, e.to_string()))?;
        for (order, spec) in nested.iter_mut().enumerate() {
            spec.kind = TaskKind::new(spec.kind.as_str());
            spec.order = order;
        }
        Ok(nested)
    }
}

/// Parameter of composite kinds that lists their nested specs.
pub const NESTED_TASKS_KEY: &str = "tasks";

/// Task parameters with typed, validating accessors.
///
/// Missing keys and explicit `null` fall back to the supplied default; values
/// of the wrong shape are a [`TaskError`] (permanent, never retried). Numbers
/// may also be given as numeric strings, the way form inputs arrive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Set parameters in key order; explicit `null`s are left out like in
    /// [`get`](Self::get).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn u64_or(&self, key: &str, default: u64) -> Result<u64, TaskError> {
        match self.get(key) {
            None => Ok(default),
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
                .ok_or_else(|| TaskError::invalid_parameter(key, "expected a non-negative integer")),
            Some(Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| TaskError::invalid_parameter(key, format!("'{s}' is not an integer"))),
            Some(_) => Err(TaskError::invalid_parameter(key, "expected a non-negative integer")),
        }
    }

    /// Like [`Params::u64_or`], additionally checking `min..=max`.
    pub fn u64_in(&self, key: &str, default: u64, min: u64, max: u64) -> Result<u64, TaskError> {
        let value = self.u64_or(key, default)?;
        if value < min || value > max {
            return Err(TaskError::invalid_parameter(
                key,
                format!("{value} is outside {min}..={max}"),
            ));
        }
        Ok(value)
    }

    pub fn f64_or(&self, key: &str, default: f64) -> Result<f64, TaskError> {
        match self.get(key) {
            None => Ok(default),
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| TaskError::invalid_parameter(key, "expected a number")),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| TaskError::invalid_parameter(key, format!("'{s}' is not a number"))),
            Some(_) => Err(TaskError::invalid_parameter(key, "expected a number")),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, TaskError> {
        match self.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(TaskError::invalid_parameter(key, format!("'{s}' is not a boolean"))),
            },
            Some(_) => Err(TaskError::invalid_parameter(key, "expected a boolean")),
        }
    }

    /// Optional string; empty strings count as missing.
    pub fn str_opt(&self, key: &str) -> Result<Option<String>, TaskError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
            Some(_) => Err(TaskError::invalid_parameter(key, "expected a string")),
        }
    }

    pub fn require_str(&self, key: &str) -> Result<String, TaskError> {
        self.str_opt(key)?
            .ok_or_else(|| TaskError::invalid_parameter(key, "is required"))
    }

    /// A list of strings, given either as an array or as one string with one
    /// entry per line.
    pub fn str_list(&self, key: &str) -> Result<Vec<String>, TaskError> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(s
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.trim().to_string()),
                    _ => Err(TaskError::invalid_parameter(key, "expected a list of strings")),
                })
                .filter(|r| !matches!(r, Ok(s) if s.is_empty()))
                .collect(),
            Some(_) => Err(TaskError::invalid_parameter(key, "expected a list of strings")),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use serde_json::json;

    fn params(value: Value) -> Params {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn numbers_accept_form_strings_and_defaults() {
        let p = params(json!({ "count": "12", "delay": 2.5, "none": null }));
        assert_eq!(p.u64_or("count", 1).unwrap(), 12);
        assert_eq!(p.u64_or("none", 7).unwrap(), 7);
        assert_eq!(p.u64_or("missing", 3).unwrap(), 3);
        assert_eq!(p.f64_or("delay", 0.0).unwrap(), 2.5);
    }

    #[test]
    fn nested_specs_accept_params_and_normalise_kinds() {
        let spec = TaskSpec::new(TaskKind::LOOP).param(
            NESTED_TASKS_KEY,
            json!([
                { "kind": " Like ", "params": { "max_likes": 2 } },
                { "kind": "wait", "name": "breather" }
            ]),
        );
        let nested = spec.nested_specs().unwrap();
        assert_eq!(nested.len(), 2);
        assert_eq!(nested[0].kind.as_str(), "like");
        assert_eq!(nested[0].parameters.u64_or("max_likes", 1).unwrap(), 2);
        assert_eq!(nested[1].display_name(), "breather");
        assert_eq!(nested[1].order, 1);

        let bad = TaskSpec::new(TaskKind::LOOP).param(NESTED_TASKS_KEY, "like");
        assert!(bad.nested_specs().unwrap_err().message().contains(NESTED_TASKS_KEY));
        assert!(TaskSpec::new(TaskKind::WAIT).nested_specs().unwrap().is_empty());
    }

    #[test]
    fn iter_yields_set_pairs_in_key_order() {
        let p = params(json!({ "url": "https://blog.test", "count": 3, "skip": null }));
        let pairs: Vec<(&str, &Value)> = p.iter().collect();
        assert_eq!(
            pairs,
            vec![("count", &json!(3)), ("url", &json!("https://blog.test"))]
        );
    }

    #[test]
    fn wrong_shapes_are_permanent_errors() {
        let p = params(json!({ "count": "many", "urls": 5 }));
        let err = p.u64_or("count", 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert!(err.message().contains("count"));
        assert!(p.str_list("urls").is_err());
        assert!(p.u64_in("missing", 0, 1, 10).is_err());
    }

    #[test]
    fn string_lists_from_arrays_or_lines() {
        let p = params(json!({
            "a": ["https://a", " https://b ", ""],
            "b": "https://c\n\n https://d \n",
        }));
        assert_eq!(p.str_list("a").unwrap(), vec!["https://a", "https://b"]);
        assert_eq!(p.str_list("b").unwrap(), vec!["https://c", "https://d"]);
    }

    #[test]
    fn display_name_falls_back_to_kind() {
        let spec = TaskSpec::new(TaskKind::WAIT).param("duration_secs", 1);
        assert_eq!(spec.display_name(), "wait");
        assert_eq!(spec.named("coffee").display_name(), "coffee");
    }
}

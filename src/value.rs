//! Runtime values flowing through scopes, expressions and shapes.

use std::{any::Any, collections::BTreeMap, fmt::{Debug, Display}, sync::Arc};

use kstring::KString;

use crate::html::Markup;

/// A host supplied value the engine passes around without looking
/// into it.
#[derive(Clone)]
pub struct HostValue {
    pub type_name: KString,
    pub value: Arc<dyn Any + Send + Sync>,
}

impl Debug for HostValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HostValue({})", self.type_name)
    }
}

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(KString),
    Html(Markup),
    Array(Vec<Value>),
    Object(BTreeMap<KString, Value>),
    Host(HostValue),
}

pub type Vars = BTreeMap<KString, Value>;

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Number(a), Number(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Html(a), Html(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            (Host(a), Host(b)) => Arc::ptr_eq(&a.value, &b.value),
            _ => false
        }
    }
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::String(KString::from_ref(s))
    }

    /// Name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Html(_) => "html",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Host(_) => "host value",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0. && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Html(m) => !m.is_empty(),
            Value::Array(v) => !v.is_empty(),
            Value::Object(m) => !m.is_empty(),
            Value::Host(_) => true,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None
        }
    }

    /// Member lookup for objects, `length` for arrays and strings.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(m) => m.get(key),
            _ => None
        }
    }

    /// The text an interpolation of this value produces.
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(KString::from_string(s)),
            serde_json::Value::Array(v) => Value::Array(v.into_iter().map(Value::from_json).collect()),
            serde_json::Value::Object(m) => Value::Object(
                m.into_iter()
                    .map(|(k, v)| (KString::from_string(k), Value::from_json(v)))
                    .collect()),
        }
    }

    /// Markup turns into its HTML string, host values into null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Host(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Html(m) => serde_json::Value::String(m.to_html_string().unwrap_or_default()),
            Value::Array(v) => serde_json::Value::Array(v.iter().map(Value::to_json).collect()),
            Value::Object(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.to_string(), v.to_json())).collect()),
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0. && n.abs() < 9.007_199_254_740_992e15 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

/// Integral numbers print without fraction.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0. && n.abs() < 1e21 {
        format!("{}", n as i128)
    } else if n.is_nan() {
        "NaN".into()
    } else {
        format!("{n}")
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => f.write_str(s),
            Value::Html(m) => f.write_str(&m.to_plain_string()),
            Value::Array(_) | Value::Object(_) => write!(f, "{}", self.to_json()),
            Value::Host(h) => write!(f, "[{}]", h.type_name),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}
impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(KString::from_string(s))
    }
}
impl From<KString> for Value {
    fn from(s: KString) -> Self {
        Value::String(s)
    }
}
impl From<Markup> for Value {
    fn from(m: Markup) -> Self {
        Value::Html(m)
    }
}
impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}
impl From<Vars> for Value {
    fn from(m: Vars) -> Self {
        Value::Object(m)
    }
}
impl From<serde_json::Value> for Value {
    fn from(j: serde_json::Value) -> Self {
        Value::from_json(j)
    }
}

/// Build `Vars` from pairs; keys are used as given.
pub fn vars<'a>(pairs: impl IntoIterator<Item = (&'a str, Value)>) -> Vars {
    pairs.into_iter().map(|(k, v)| (KString::from_ref(k), v)).collect()
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn t_truthiness() {
        for v in [Value::Null, Value::Bool(false), Value::Number(0.), Value::str(""),
                  Value::Array(vec![]), Value::Object(Vars::new()),
                  Value::Html(Markup::empty())] {
            assert!(!v.is_truthy(), "{v:?}");
        }
        for v in [Value::Bool(true), Value::Number(-1.), Value::str("0"),
                  Value::Array(vec![Value::Null])] {
            assert!(v.is_truthy(), "{v:?}");
        }
    }

    #[test]
    fn t_display() {
        assert_eq!(Value::Number(43.).to_string(), "43");
        assert_eq!(Value::Number(-2.5).to_string(), "-2.5");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::from_json(json!([1, "a"])).to_string(), "[1,\"a\"]");
    }

    #[test]
    fn t_json() {
        let j = json!({"a": [1, 2.5, null], "b": {"c": true}});
        let v = Value::from_json(j.clone());
        assert_eq!(v.to_json(), j);
        assert_eq!(v.get("b").and_then(|b| b.get("c")), Some(&Value::Bool(true)));
    }
}

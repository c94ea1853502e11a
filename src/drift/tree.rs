//! Typed configuration trees with loose scalar equality

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// A leaf value in a configuration document.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    /// Loose equality, applied uniformly to every leaf comparison.
    ///
    /// The search backend echoes most settings back as strings, so a desired
    /// `5` has to equal a live `"5"`. The rules:
    ///
    /// - numbers compare by numeric value regardless of integer/float form;
    /// - a string equals a number when it parses (after trimming) to the same value;
    /// - two strings are equal when identical, or when both parse to the same number;
    /// - a boolean equals the strings `"true"`/`"false"` (case-insensitive) and
    ///   the numbers `1`/`0`;
    /// - `Null` equals `Null`, the empty string, `false` and zero.
    pub fn loosely_eq(&self, other: &Scalar) -> bool {
        use Scalar::*;
        match (self, other) {
            (Null, Null) => true,
            (Null, other) | (other, Null) => match other {
                Bool(b) => !b,
                Str(s) => s.is_empty(),
                Int(i) => *i == 0,
                Float(f) => *f == 0.0,
                Null => true,
            },
            (Bool(a), Bool(b)) => a == b,
            (Bool(b), Str(s)) | (Str(s), Bool(b)) => parse_bool(s) == Some(*b),
            (Bool(b), num) | (num, Bool(b)) => num.as_f64().map(|n| (n != 0.0) == *b).unwrap_or(false),
            (Int(a), Int(b)) => a == b,
            (Str(a), Str(b)) => {
                a == b
                    || matches!((parse_number(a), parse_number(b)), (Some(x), Some(y)) if x == y)
            }
            (Str(s), num) | (num, Str(s)) => match (parse_number(s), num.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
            (a, b) => matches!((a.as_f64(), b.as_f64()), (Some(x), Some(y)) if x == y),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::Number((*i).into()),
            Scalar::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            Scalar::Str(s) => Value::String(s.clone()),
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Str(s) => write!(f, "{}", s),
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// A configuration value: a scalar leaf, an ordered list, or a nested tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Scalar(Scalar),
    List(Vec<ConfigValue>),
    Tree(ConfigTree),
}

impl ConfigValue {
    /// Loose structural equality. Lists compare element-wise and must have the
    /// same length; trees must have exactly the same keys.
    pub fn loosely_eq(&self, other: &ConfigValue) -> bool {
        match (self, other) {
            (ConfigValue::Scalar(a), ConfigValue::Scalar(b)) => a.loosely_eq(b),
            (ConfigValue::List(a), ConfigValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_eq(y))
            }
            (ConfigValue::Tree(a), ConfigValue::Tree(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.loosely_eq(w)))
            }
            _ => false,
        }
    }

    pub fn as_tree(&self) -> Option<&ConfigTree> {
        match self {
            ConfigValue::Tree(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            ConfigValue::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ConfigValue::Scalar(s) => s.to_json(),
            ConfigValue::List(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
            ConfigValue::Tree(tree) => tree.to_json(),
        }
    }
}

impl std::fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValue::Scalar(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<Value> for ConfigValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ConfigValue::Scalar(Scalar::Null),
            Value::Bool(b) => ConfigValue::Scalar(Scalar::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ConfigValue::Scalar(Scalar::Int(i)),
                None => ConfigValue::Scalar(Scalar::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            Value::String(s) => ConfigValue::Scalar(Scalar::Str(s)),
            Value::Array(items) => ConfigValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => ConfigValue::Tree(ConfigTree::from(map)),
        }
    }
}

macro_rules! scalar_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ConfigValue {
                fn from(value: $ty) -> Self {
                    ConfigValue::Scalar(Scalar::$variant(value.into()))
                }
            }
        )*
    };
}

scalar_from!(bool => Bool, i64 => Int, u32 => Int, i32 => Int, f64 => Float, String => Str, &str => Str);

impl From<ConfigTree> for ConfigValue {
    fn from(tree: ConfigTree) -> Self {
        ConfigValue::Tree(tree)
    }
}

/// A nested key → value document (settings, analysis or mapping).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTree(BTreeMap<String, ConfigValue>);

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object. Anything other than an object yields `None`.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self::from(map)),
            _ => None,
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.0.get(key)
    }

    /// Walk a dotted path through nested trees.
    pub fn get_path(&self, path: &str) -> Option<&ConfigValue> {
        let mut parts = path.split('.');
        let mut current = self.get(parts.next()?)?;
        for part in parts {
            current = current.as_tree()?.get(part)?;
        }
        Some(current)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ConfigValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deep-merge `other` into `self`; on conflicting leaves `other` wins.
    pub fn merge(&mut self, other: &ConfigTree) {
        for (key, value) in other.iter() {
            match (self.0.get_mut(key), value) {
                (Some(ConfigValue::Tree(mine)), ConfigValue::Tree(theirs)) => mine.merge(theirs),
                _ => {
                    self.0.insert(key.clone(), value.clone());
                }
            }
        }
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect::<Map<String, Value>>(),
        )
    }
}

impl From<Map<String, Value>> for ConfigTree {
    fn from(map: Map<String, Value>) -> Self {
        ConfigTree(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl Serialize for ConfigTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ConfigTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        ConfigTree::from_json(value)
            .ok_or_else(|| serde::de::Error::custom("configuration document must be an object"))
    }
}

/// Live settings as a flat `dotted.key → value` view.
///
/// Nested trees are flattened; lists and scalars are leaves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatSettings(BTreeMap<String, ConfigValue>);

impl FlatSettings {
    pub fn from_nested(tree: &ConfigTree) -> Self {
        let mut flat = BTreeMap::new();
        flatten_into("", tree, &mut flat);
        FlatSettings(flat)
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.0.get(key)
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        match self.get(key)?.as_scalar()? {
            Scalar::Int(i) => u32::try_from(*i).ok(),
            Scalar::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn flatten_into(prefix: &str, tree: &ConfigTree, out: &mut BTreeMap<String, ConfigValue>) {
    for (key, value) in tree.iter() {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            ConfigValue::Tree(child) => flatten_into(&path, child, out),
            leaf => {
                out.insert(path, leaf.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_and_integer_are_loosely_equal() {
        assert!(Scalar::Str("5".into()).loosely_eq(&Scalar::Int(5)));
        assert!(Scalar::Int(5).loosely_eq(&Scalar::Str(" 5 ".into())));
        assert!(Scalar::Str("5".into()).loosely_eq(&Scalar::Str("5.0".into())));
        assert!(Scalar::Float(5.0).loosely_eq(&Scalar::Int(5)));
        assert!(!Scalar::Str("five".into()).loosely_eq(&Scalar::Int(5)));
        assert!(!Scalar::Str("6".into()).loosely_eq(&Scalar::Int(5)));
    }

    #[test]
    fn test_boolean_loose_equality() {
        assert!(Scalar::Bool(false).loosely_eq(&Scalar::Str("false".into())));
        assert!(Scalar::Str("TRUE".into()).loosely_eq(&Scalar::Bool(true)));
        assert!(Scalar::Bool(true).loosely_eq(&Scalar::Int(1)));
        assert!(!Scalar::Bool(true).loosely_eq(&Scalar::Str("yes".into())));
        assert!(Scalar::Null.loosely_eq(&Scalar::Bool(false)));
        assert!(Scalar::Null.loosely_eq(&Scalar::Str(String::new())));
    }

    #[test]
    fn test_flatten_nested_settings() {
        let tree = ConfigTree::from_json(json!({
            "index": {
                "number_of_shards": "5",
                "analysis": {"analyzer": {"plain": {"filter": ["lowercase"]}}}
            }
        }))
        .unwrap();

        let flat = FlatSettings::from_nested(&tree);
        assert_eq!(flat.get_u32("index.number_of_shards"), Some(5));
        assert!(matches!(
            flat.get("index.analysis.analyzer.plain.filter"),
            Some(ConfigValue::List(items)) if items.len() == 1
        ));
    }

    #[test]
    fn test_merge_prefers_other_leaves() {
        let mut base = ConfigTree::from_json(json!({"a": {"b": 1, "c": 2}})).unwrap();
        let other = ConfigTree::from_json(json!({"a": {"c": 3, "d": 4}})).unwrap();
        base.merge(&other);
        assert_eq!(base.to_json(), json!({"a": {"b": 1, "c": 3, "d": 4}}));
    }

    #[test]
    fn test_get_path() {
        let tree = ConfigTree::from_json(json!({"properties": {"title": {"type": "text"}}})).unwrap();
        assert_eq!(
            tree.get_path("properties.title.type").and_then(|v| v.as_scalar()),
            Some(&Scalar::Str("text".into()))
        );
        assert!(tree.get_path("properties.missing.type").is_none());
    }
}

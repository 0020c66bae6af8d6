//! Property values of declared lookups and resources.
//!
//! References (`${node.property}`) are the only way one declaration can read
//! another's outputs, so they double as the edges of the resource graph.

use serde_yaml::{Mapping, Value as Yaml};

/// A read of one output property of another declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub node: String,
    pub property: String,
}

impl Reference {
    pub fn new(node: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            property: property.into(),
        }
    }

    fn interpolation(&self) -> String {
        format!("${{{}.{}}}", self.node, self.property)
    }
}

/// One piece of a string template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Ref(Reference),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Bool(bool),
    Int(i64),
    List(Vec<Value>),
    /// Ordered map; rendering keeps insertion order
    Map(Vec<(String, Value)>),
    Ref(Reference),
    Template(Vec<Segment>),
    Secret(Box<Value>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn reference(node: &str, property: &str) -> Self {
        Value::Ref(Reference::new(node, property))
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn secret(inner: Value) -> Self {
        Value::Secret(Box::new(inner))
    }

    /// Collect every reference reachable from this value, in order of appearance
    pub fn references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Value::Str(_) | Value::Bool(_) | Value::Int(_) => {}
            Value::List(items) => items.iter().for_each(|v| v.references(out)),
            Value::Map(entries) => entries.iter().for_each(|(_, v)| v.references(out)),
            Value::Ref(r) => out.push(r),
            Value::Template(segments) => {
                for segment in segments {
                    if let Segment::Ref(r) = segment {
                        out.push(r);
                    }
                }
            }
            Value::Secret(inner) => inner.references(out),
        }
    }

    /// Convert to the YAML shape the Pulumi YAML runtime expects
    pub fn to_yaml(&self) -> Yaml {
        match self {
            Value::Str(s) => Yaml::String(escape_literal(s)),
            Value::Bool(b) => Yaml::Bool(*b),
            Value::Int(i) => Yaml::Number((*i).into()),
            Value::List(items) => Yaml::Sequence(items.iter().map(Value::to_yaml).collect()),
            Value::Map(entries) => {
                let mut mapping = Mapping::new();
                for (key, value) in entries {
                    mapping.insert(Yaml::String(key.clone()), value.to_yaml());
                }
                Yaml::Mapping(mapping)
            }
            Value::Ref(r) => Yaml::String(r.interpolation()),
            Value::Template(segments) => {
                let rendered: String = segments
                    .iter()
                    .map(|segment| match segment {
                        Segment::Literal(s) => escape_literal(s),
                        Segment::Ref(r) => r.interpolation(),
                    })
                    .collect();
                Yaml::String(rendered)
            }
            Value::Secret(inner) => {
                let mut mapping = Mapping::new();
                mapping.insert(Yaml::String("fn::secret".to_string()), inner.to_yaml());
                Yaml::Mapping(mapping)
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

/// `$` starts an interpolation in Pulumi YAML; a literal dollar is written `$$`
fn escape_literal(s: &str) -> String {
    s.replace('$', "$$")
}

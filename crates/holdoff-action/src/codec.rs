//! Flat-text encoding of heterogeneous argument lists.
//!
//! Wire form is a JSON object `{"params":[...]}`. String arrays and ordered
//! lists share the [`Param::List`] kind; sets are written as arrays and come
//! back as lists, so [`Params::get_string_set`] converts on read.

use std::collections::BTreeSet;

use serde_json::{Map, Number, Value};

use crate::error::CodecError;

/// One positional argument of a gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Str(String),
    List(Vec<String>),
    Set(BTreeSet<String>),
}

impl Param {
    fn kind(&self) -> &'static str {
        match self {
            Param::Null => "null",
            Param::Bool(_) => "bool",
            Param::Int(_) => "int",
            Param::Long(_) => "long",
            Param::Str(_) => "string",
            Param::List(_) => "list",
            Param::Set(_) => "set",
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Param::Null => Value::Null,
            Param::Bool(b) => Value::Bool(*b),
            Param::Int(i) => Value::Number(Number::from(*i)),
            Param::Long(l) => Value::Number(Number::from(*l)),
            Param::Str(s) => Value::String(s.clone()),
            Param::List(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
            Param::Set(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        }
    }

    fn from_json(index: usize, value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Null => Ok(Param::Null),
            Value::Bool(b) => Ok(Param::Bool(b)),
            Value::Number(n) => {
                let wide = n.as_i64().ok_or_else(|| {
                    CodecError::Malformed(format!("parameter {} is not an integer: {}", index, n))
                })?;
                Ok(match i32::try_from(wide) {
                    Ok(narrow) => Param::Int(narrow),
                    Err(_) => Param::Long(wide),
                })
            }
            Value::String(s) => Ok(Param::Str(s)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    other => Err(CodecError::Malformed(format!(
                        "parameter {} holds a non-string element: {}",
                        index, other
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Param::List),
            Value::Object(_) => Err(CodecError::Malformed(format!(
                "parameter {} is an object",
                index
            ))),
        }
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Param::Bool(value)
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Param::Int(value)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Long(value)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Str(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Str(value)
    }
}

impl From<Option<String>> for Param {
    fn from(value: Option<String>) -> Self {
        value.map_or(Param::Null, Param::Str)
    }
}

impl From<Vec<String>> for Param {
    fn from(value: Vec<String>) -> Self {
        Param::List(value)
    }
}

impl From<Option<Vec<String>>> for Param {
    fn from(value: Option<Vec<String>>) -> Self {
        value.map_or(Param::Null, Param::List)
    }
}

impl From<BTreeSet<String>> for Param {
    fn from(value: BTreeSet<String>) -> Self {
        Param::Set(value)
    }
}

/// Serialize an argument list.
pub fn encode(params: &[Param]) -> Result<String, CodecError> {
    let mut root = Map::new();
    root.insert(
        "params".to_string(),
        Value::Array(params.iter().map(Param::to_json).collect()),
    );
    serde_json::to_string(&Value::Object(root)).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Parse text produced by [`encode`]. Anything else is a hard error.
pub fn decode(text: &str) -> Result<Params, CodecError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| CodecError::Malformed(e.to_string()))?;
    let mut root = match value {
        Value::Object(map) => map,
        _ => return Err(CodecError::Malformed("payload is not an object".to_string())),
    };
    let items = match root.remove("params") {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(CodecError::Malformed("\"params\" is not an array".to_string())),
        None => return Err(CodecError::Malformed("missing \"params\"".to_string())),
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| Param::from_json(index, item))
        .collect::<Result<Vec<_>, _>>()
        .map(Params)
}

/// Decoded argument list with positional, type-checked accessors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<Param>);

impl Params {
    pub fn new(params: Vec<Param>) -> Self {
        Self(params)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Param] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<Param> {
        self.0
    }

    fn at(&self, index: usize) -> Result<&Param, CodecError> {
        self.0.get(index).ok_or(CodecError::IndexOutOfRange {
            index,
            len: self.0.len(),
        })
    }

    fn mismatch(&self, index: usize, expected: &'static str) -> CodecError {
        CodecError::TypeMismatch {
            index,
            expected,
            found: self.0.get(index).map_or("nothing", Param::kind),
        }
    }

    pub fn get_bool(&self, index: usize) -> Result<bool, CodecError> {
        match self.at(index)? {
            Param::Bool(b) => Ok(*b),
            _ => Err(self.mismatch(index, "bool")),
        }
    }

    /// 32-bit integer; a 64-bit value is accepted when it fits.
    pub fn get_int(&self, index: usize) -> Result<i32, CodecError> {
        match self.at(index)? {
            Param::Int(i) => Ok(*i),
            Param::Long(l) => {
                i32::try_from(*l).map_err(|_| CodecError::Overflow { index, value: *l })
            }
            _ => Err(self.mismatch(index, "int")),
        }
    }

    pub fn get_long(&self, index: usize) -> Result<i64, CodecError> {
        match self.at(index)? {
            Param::Int(i) => Ok(i64::from(*i)),
            Param::Long(l) => Ok(*l),
            _ => Err(self.mismatch(index, "long")),
        }
    }

    pub fn get_string(&self, index: usize) -> Result<String, CodecError> {
        match self.at(index)? {
            Param::Str(s) => Ok(s.clone()),
            _ => Err(self.mismatch(index, "string")),
        }
    }

    /// String or explicit `null`.
    pub fn get_optional_string(&self, index: usize) -> Result<Option<String>, CodecError> {
        match self.at(index)? {
            Param::Null => Ok(None),
            Param::Str(s) => Ok(Some(s.clone())),
            _ => Err(self.mismatch(index, "string or null")),
        }
    }

    pub fn get_string_list(&self, index: usize) -> Result<Vec<String>, CodecError> {
        match self.at(index)? {
            Param::List(items) => Ok(items.clone()),
            Param::Set(items) => Ok(items.iter().cloned().collect()),
            _ => Err(self.mismatch(index, "list")),
        }
    }

    /// List or explicit `null`.
    pub fn get_optional_string_list(
        &self,
        index: usize,
    ) -> Result<Option<Vec<String>>, CodecError> {
        match self.at(index)? {
            Param::Null => Ok(None),
            _ => self.get_string_list(index).map(Some),
        }
    }

    pub fn get_string_set(&self, index: usize) -> Result<BTreeSet<String>, CodecError> {
        match self.at(index)? {
            Param::List(items) => Ok(items.iter().cloned().collect()),
            Param::Set(items) => Ok(items.clone()),
            _ => Err(self.mismatch(index, "set")),
        }
    }
}

impl From<Vec<Param>> for Params {
    fn from(params: Vec<Param>) -> Self {
        Self(params)
    }
}

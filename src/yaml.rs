//! YAML loading for manifests, status documents and settings files
//!
//! Everything is lowered to `serde_json::Value` so typed decoding has a
//! single serde path whether the input was YAML or JSON. Errors say where
//! the problem is: syntax errors carry the scanner's line and column,
//! conversion errors the document number and the key path inside it.

use serde_json::{Map, Number, Value};
use thiserror::Error;
use yaml_rust2::{ScanError, Yaml, YamlLoader};

/// Why a YAML stream could not be loaded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum YamlError {
    /// The text is not well-formed YAML
    #[error("line {line}, column {column}: {message}")]
    Syntax {
        /// 1-based line of the offending character
        line: usize,
        /// 1-based column of the offending character
        column: usize,
        /// Scanner message
        message: String,
    },

    /// Well-formed YAML with no JSON equivalent
    #[error("document {document} at {path}: {message}")]
    Unrepresentable {
        /// 1-based position of the document in the stream
        document: usize,
        /// Key path of the value, `$` for the document root
        path: String,
        /// What could not be represented
        message: String,
    },
}

impl From<ScanError> for YamlError {
    fn from(e: ScanError) -> Self {
        let marker = e.marker();
        YamlError::Syntax {
            line: marker.line(),
            column: marker.col() + 1,
            message: e.info().to_string(),
        }
    }
}

/// A non-empty document from a stream
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// 1-based position in the stream, counting empty documents
    pub index: usize,
    /// The document as JSON
    pub value: Value,
}

/// Load the first document of `input`; `Value::Null` if there is none
pub fn load_first(input: &str) -> Result<Value, YamlError> {
    match YamlLoader::load_from_str(input)?.into_iter().next() {
        Some(node) => Lowering { document: 1 }.value(node, "$"),
        None => Ok(Value::Null),
    }
}

/// Load every non-empty document of a `---` separated stream, in order.
///
/// Blank and comment-only documents load as null and are dropped; the
/// remaining documents keep their original position.
pub fn load_documents(input: &str) -> Result<Vec<Document>, YamlError> {
    let mut documents = Vec::new();
    for (i, node) in YamlLoader::load_from_str(input)?.into_iter().enumerate() {
        if node.is_null() {
            continue;
        }
        let index = i + 1;
        let value = Lowering { document: index }.value(node, "$")?;
        documents.push(Document { index, value });
    }
    Ok(documents)
}

/// Converts one document's node tree, tracking where it is for errors
struct Lowering {
    document: usize,
}

impl Lowering {
    fn value(&self, node: Yaml, path: &str) -> Result<Value, YamlError> {
        Ok(match node {
            Yaml::Null => Value::Null,
            Yaml::Boolean(b) => Value::Bool(b),
            Yaml::Integer(i) => Value::from(i),
            Yaml::String(s) => Value::String(s),
            real @ Yaml::Real(_) => {
                let number = real.as_f64().and_then(Number::from_f64);
                Value::Number(number.ok_or_else(|| self.fail(path, "non-finite number"))?)
            }
            Yaml::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    out.push(self.value(item, &format!("{}[{}]", path, i))?);
                }
                Value::Array(out)
            }
            Yaml::Hash(entries) => {
                let mut out = Map::with_capacity(entries.len());
                for (key, item) in entries {
                    let key = self.key(key, path)?;
                    let child = format!("{}.{}", path, key);
                    out.insert(key, self.value(item, &child)?);
                }
                Value::Object(out)
            }
            Yaml::Alias(_) => return Err(self.fail(path, "unresolved alias")),
            Yaml::BadValue => return Err(self.fail(path, "invalid value")),
        })
    }

    /// JSON keys are strings; scalar YAML keys are spelled out, others rejected
    fn key(&self, key: Yaml, path: &str) -> Result<String, YamlError> {
        match key {
            Yaml::String(s) | Yaml::Real(s) => Ok(s),
            Yaml::Integer(i) => Ok(i.to_string()),
            Yaml::Boolean(b) => Ok(b.to_string()),
            _ => Err(self.fail(path, "mapping key is not a scalar")),
        }
    }

    fn fail(&self, path: &str, message: &str) -> YamlError {
        YamlError::Unrepresentable {
            document: self.document,
            path: path.to_string(),
            message: message.to_string(),
        }
    }
}

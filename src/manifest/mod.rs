//! Generated manifest parsing
//!
//! A manifest is a multi-document YAML stream of Kubernetes resources, as
//! produced by the installer's manifest generator. Each document becomes a
//! [`K8sObject`]; reconciliation only needs kind, namespace and name, but the
//! decoded content is kept for diagnostics.

use std::fmt;

use serde_json::Value;

use crate::Error;

const DECODE_CONTEXT: &str = "manifest";

/// Identity of one resource: kind, namespace and name
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Resource kind
    pub kind: String,
    /// Namespace, empty for cluster-scoped resources
    pub namespace: String,
    /// Resource name
    pub name: String,
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// One resource decoded from a manifest
#[derive(Clone, Debug, PartialEq)]
pub struct K8sObject {
    /// `apiVersion`, empty if the document omits it
    pub api_version: String,
    /// `kind`
    pub kind: String,
    /// `metadata.namespace`, empty for cluster-scoped resources
    pub namespace: String,
    /// `metadata.name`
    pub name: String,
    /// The whole decoded document
    pub content: Value,
}

impl K8sObject {
    /// Decode one manifest document
    pub fn from_value(content: Value) -> Result<Self, Error> {
        if !content.is_object() {
            return Err(Error::decode(DECODE_CONTEXT, "document is not a mapping"));
        }

        let kind = content
            .get("kind")
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::decode(DECODE_CONTEXT, "document missing kind"))?
            .to_string();

        let name = content
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                Error::decode(DECODE_CONTEXT, format!("{} document missing metadata.name", kind))
            })?
            .to_string();

        let namespace = content
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let api_version = content
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            api_version,
            kind,
            namespace,
            name,
            content,
        })
    }

    /// Kind, namespace and name of this object
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            kind: self.kind.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for K8sObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Parse a manifest into its objects, in document order.
///
/// Empty documents are skipped. Any undecodable document fails the whole
/// parse.
pub fn parse_k8s_objects(manifest: &str) -> Result<Vec<K8sObject>, Error> {
    let docs = crate::yaml::load_documents(manifest)
        .map_err(|e| Error::decode(DECODE_CONTEXT, e.to_string()))?;

    docs.into_iter()
        .map(|doc| {
            K8sObject::from_value(doc.value).map_err(|e| match e {
                Error::Decode { context, message } => Error::Decode {
                    context,
                    message: format!("document {}: {}", doc.index, message),
                },
                other => other,
            })
        })
        .collect()
}

//! Typed claim maps
//!
//! Identity documents from the upstream provider are loosely typed JSON. They
//! are narrowed to a closed set of value shapes before being copied into an
//! issued credential.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Claim name to value.
pub type Claims = BTreeMap<String, ClaimValue>;

/// A single claim value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    Bool(bool),
    Number(f64),
    String(String),
    Map(Claims),
}

impl ClaimValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ClaimValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ClaimValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Narrow a JSON value. Nulls and arrays have no counterpart and yield `None`.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(ClaimValue::Bool(b)),
            serde_json::Value::Number(n) => n.as_f64().map(ClaimValue::Number),
            serde_json::Value::String(s) => Some(ClaimValue::String(s)),
            serde_json::Value::Object(map) => Some(ClaimValue::Map(claims_from_object(map))),
            serde_json::Value::Null | serde_json::Value::Array(_) => None,
        }
    }
}

impl From<&str> for ClaimValue {
    fn from(s: &str) -> Self {
        ClaimValue::String(s.to_string())
    }
}

impl From<String> for ClaimValue {
    fn from(s: String) -> Self {
        ClaimValue::String(s)
    }
}

impl From<bool> for ClaimValue {
    fn from(b: bool) -> Self {
        ClaimValue::Bool(b)
    }
}

impl From<f64> for ClaimValue {
    fn from(n: f64) -> Self {
        ClaimValue::Number(n)
    }
}

impl From<u64> for ClaimValue {
    fn from(n: u64) -> Self {
        ClaimValue::Number(n as f64)
    }
}

/// Convert an identity document into claims.
///
/// Anything other than a JSON object produces an empty map.
pub fn claims_from_json(value: serde_json::Value) -> Claims {
    match value {
        serde_json::Value::Object(map) => claims_from_object(map),
        other => {
            debug!(kind = json_kind(&other), "identity document is not an object");
            Claims::new()
        }
    }
}

fn claims_from_object(map: serde_json::Map<String, serde_json::Value>) -> Claims {
    let mut claims = Claims::new();
    for (name, value) in map {
        let kind = json_kind(&value);
        match ClaimValue::from_json(value) {
            Some(v) => {
                claims.insert(name, v);
            }
            None => debug!(claim = %name, kind, "dropping unsupported claim value"),
        }
    }
    claims
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn userinfo_document_is_narrowed() {
        let doc = serde_json::json!({
            "sub": "110169484474386276334",
            "email": "user@example.com",
            "email_verified": true,
            "age": 42,
            "picture": null,
            "groups": ["a", "b"],
            "address": {"country": "NZ", "postal": null}
        });

        let claims = claims_from_json(doc);
        assert_eq!(claims["sub"].as_str(), Some("110169484474386276334"));
        assert_eq!(claims["email_verified"], ClaimValue::Bool(true));
        assert_eq!(claims["age"].as_f64(), Some(42.0));
        assert!(!claims.contains_key("picture"));
        assert!(!claims.contains_key("groups"));

        let ClaimValue::Map(address) = &claims["address"] else {
            panic!("address must stay a nested map");
        };
        assert_eq!(address.len(), 1);
        assert_eq!(address["country"].as_str(), Some("NZ"));
    }

    #[test]
    fn non_object_document_yields_empty_claims() {
        assert!(claims_from_json(serde_json::json!("just a string")).is_empty());
        assert!(claims_from_json(serde_json::json!([1, 2])).is_empty());
    }

    #[test]
    fn claims_serialize_without_tags() {
        let mut claims = Claims::new();
        claims.insert("name".into(), "Ada".into());
        claims.insert("admin".into(), false.into());
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json, serde_json::json!({"admin": false, "name": "Ada"}));

        let back: Claims = serde_json::from_value(json).unwrap();
        assert_eq!(back, claims);
    }
}

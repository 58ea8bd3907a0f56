//! Subject identity for object instances.

use crate::binding::Binding;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

const ALPHABET: &[u8; 62] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// How to name an object that carries no natural key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectPolicy {
    /// A fresh random URN per instance. Reruns produce new subjects.
    #[default]
    Random,
    /// A URN derived from the object's content, stable across reruns.
    ContentHash,
}

/// Random subject URN: `urn:` followed by the base-62 digits of a v4 UUID,
/// least significant digit first.
pub fn make_id() -> String {
    urn(Uuid::new_v4().as_u128())
}

/// Deterministic subject URN from the first 16 bytes of a SHA-256 over the
/// canonical (sorted-key) JSON of `data`.
pub fn content_id(data: &Value) -> String {
    let mut text = String::new();
    write_canonical(data, &mut text);
    let digest = Sha256::digest(text.as_bytes());
    let mut head = [0u8; 16];
    head.copy_from_slice(&digest[..16]);
    urn(u128::from_be_bytes(head))
}

fn urn(mut num: u128) -> String {
    let mut out = String::from("urn:");
    while num > 0 {
        out.push(ALPHABET[(num % 62) as usize] as char);
        num /= 62;
    }
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// The object's own key from its subject field: a non-blank string
/// (trimmed) or a number.
pub fn natural_key(binding: &Binding<'_>, data: &Value) -> Option<String> {
    match data.get(binding.subject_field())? {
        Value::String(key) => {
            let key = key.trim();
            (!key.is_empty()).then(|| key.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Subject for one object instance: its natural key, else one synthesized
/// under `policy`.
pub fn resolve_subject(binding: &Binding<'_>, data: &Value, policy: SubjectPolicy) -> String {
    natural_key(binding, data).unwrap_or_else(|| match policy {
        SubjectPolicy::Random => make_id(),
        SubjectPolicy::ContentHash => content_id(data),
    })
}

//! `application/x-www-form-urlencoded` decoding into typed destinations.
//!
//! A destination declares its fields by implementing [`FormTarget`]: one
//! `(name, Slot)` pair per field, where the slot borrows the field mutably
//! and names its type. [`decode`] fills each slot from the submitted pairs:
//!
//! - a field with no submitted key keeps its current (zero) value
//! - submitted keys no field asks for are ignored
//! - a value that cannot be coerced to the slot's type is a request error
//! - a destination that declares the same name twice, or an empty name, is a
//!   programming error and reported as [`FormError::InvalidTarget`], which
//!   [`FormError::is_fatal`] tags as never-the-client's-fault

use std::collections::HashSet;

use percent_encoding::percent_decode_str;

#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("malformed form body: {0}")]
    Malformed(String),

    #[error("invalid value for field `{field}`")]
    InvalidValue { field: String },

    #[error("invalid decode target: {0}")]
    InvalidTarget(String),
}

impl FormError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidTarget(_))
    }
}

/// A mutable view of one destination field.
pub enum Slot<'a> {
    Text(&'a mut String),
    Int(&'a mut i64),
    Bool(&'a mut bool),
    /// Every submitted value for the key, in order (checkbox groups).
    List(&'a mut Vec<String>),
}

/// A structure form values can be decoded into.
pub trait FormTarget {
    fn slots(&mut self) -> Vec<(&'static str, Slot<'_>)>;
}

/// Splits a urlencoded body into decoded key/value pairs, keeping order and
/// duplicates.
pub fn parse_pairs(body: &[u8]) -> Result<Vec<(String, String)>, FormError> {
    let body = std::str::from_utf8(body)
        .map_err(|_| FormError::Malformed("body is not valid UTF-8".to_owned()))?;

    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            Ok((unescape(k)?, unescape(v)?))
        })
        .collect()
}

fn unescape(raw: &str) -> Result<String, FormError> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| FormError::Malformed("percent-encoded value is not valid UTF-8".to_owned()))
}

/// First submitted value for `key`.
pub fn first<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

/// Populates `target` from `pairs`.
pub fn decode<T: FormTarget + ?Sized>(
    pairs: &[(String, String)],
    target: &mut T,
) -> Result<(), FormError> {
    let slots = target.slots();

    let mut seen = HashSet::with_capacity(slots.len());
    for (name, _) in &slots {
        if name.is_empty() {
            return Err(FormError::InvalidTarget("field with an empty name".to_owned()));
        }
        if !seen.insert(*name) {
            return Err(FormError::InvalidTarget(format!("field `{name}` is declared twice")));
        }
    }

    for (name, slot) in slots {
        let mut values = pairs.iter().filter(|(k, _)| k == name).map(|(_, v)| v.as_str());
        match slot {
            Slot::List(dest) => *dest = values.map(str::to_owned).collect(),
            Slot::Text(dest) => {
                if let Some(v) = values.next() {
                    *dest = v.to_owned();
                }
            }
            Slot::Int(dest) => {
                if let Some(v) = values.next().map(str::trim).filter(|v| !v.is_empty()) {
                    *dest = v.parse().map_err(|_| invalid(name))?;
                }
            }
            Slot::Bool(dest) => {
                if let Some(v) = values.next() {
                    *dest = match v.trim().to_ascii_lowercase().as_str() {
                        "1" | "on" | "true" | "yes" => true,
                        "" | "0" | "off" | "false" | "no" => false,
                        _ => return Err(invalid(name)),
                    };
                }
            }
        }
    }
    Ok(())
}

fn invalid(field: &str) -> FormError {
    FormError::InvalidValue { field: field.to_owned() }
}

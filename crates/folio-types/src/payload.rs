use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::object::ObjectRef;

/// In-memory value of an indirect object.
///
/// Containers own their children. Links to other indirect objects are
/// [`Payload::Reference`] values, never nested ownership, so cyclic graphs
/// are representable without shared pointers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    /// Name without the leading solidus.
    Name(String),
    /// Raw string bytes (no encoding is assumed).
    String(Vec<u8>),
    Array(Vec<Payload>),
    Dictionary(Dictionary),
    Stream(Stream),
    Reference(ObjectRef),
}

impl Payload {
    /// Convenience constructor for a name value.
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Convenience constructor for a string value.
    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Self::String(bytes.into())
    }

    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Self::Reference(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Payload]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The dictionary of a dictionary or stream payload.
    pub fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            Self::Dictionary(d) => Some(d),
            Self::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Every reference reachable inside this payload, in document order.
    ///
    /// Only direct containment is walked; referenced objects are not
    /// resolved.
    pub fn references(&self) -> Vec<ObjectRef> {
        let mut out = Vec::new();
        self.collect_references(None, &mut out);
        out
    }

    /// Like [`references`](Self::references) but skips the values of
    /// dictionary entries whose key is in `skip_keys`.
    pub fn references_except(&self, skip_keys: &[&str]) -> Vec<ObjectRef> {
        let mut out = Vec::new();
        self.collect_references(Some(skip_keys), &mut out);
        out
    }

    fn collect_references(&self, skip_keys: Option<&[&str]>, out: &mut Vec<ObjectRef>) {
        match self {
            Self::Reference(r) => out.push(*r),
            Self::Array(items) => {
                for item in items {
                    item.collect_references(skip_keys, out);
                }
            }
            Self::Dictionary(d) => d.collect_references(skip_keys, out),
            Self::Stream(s) => s.dict.collect_references(skip_keys, out),
            _ => {}
        }
    }
}

impl From<bool> for Payload {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i64> for Payload {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<ObjectRef> for Payload {
    fn from(r: ObjectRef) -> Self {
        Self::Reference(r)
    }
}

impl From<Dictionary> for Payload {
    fn from(d: Dictionary) -> Self {
        Self::Dictionary(d)
    }
}

/// Ordered name → payload map.
///
/// Keys are stored without the leading solidus. Ordering is by key so
/// serialization is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dictionary(BTreeMap<String, Payload>);

impl Dictionary {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&Payload> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Payload> {
        self.0.get_mut(key)
    }

    /// Insert or replace an entry, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Payload>) -> Option<Payload> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Payload>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<Payload> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Payload)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Payload)> {
        self.0.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The referenced object of `key`, if the entry is a reference.
    pub fn get_reference(&self, key: &str) -> Option<ObjectRef> {
        self.get(key).and_then(Payload::as_reference)
    }

    fn collect_references(&self, skip_keys: Option<&[&str]>, out: &mut Vec<ObjectRef>) {
        for (key, value) in &self.0 {
            if skip_keys.is_some_and(|skip| skip.contains(&key.as_str())) {
                continue;
            }
            value.collect_references(skip_keys, out);
        }
    }
}

impl FromIterator<(String, Payload)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (String, Payload)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Stream object: a dictionary plus raw (still encoded) bytes.
///
/// `/Length` in `dict` is rewritten from `data` on serialization.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub dict: Dictionary,
    pub data: Vec<u8>,
}

impl Stream {
    /// Build a stream with `/Length` set from `data`.
    pub fn new(mut dict: Dictionary, data: Vec<u8>) -> Self {
        dict.insert("Length", data.len() as i64);
        Self { dict, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_builder_and_lookup() {
        let dict = Dictionary::new()
            .with("Type", Payload::name("Page"))
            .with("Parent", ObjectRef::new(2, 0))
            .with("Rotate", 90i64);
        assert_eq!(dict.len(), 3);
        assert_eq!(dict.get("Type").and_then(Payload::as_name), Some("Page"));
        assert_eq!(dict.get_reference("Parent"), Some(ObjectRef::new(2, 0)));
        assert_eq!(dict.get("Rotate").and_then(Payload::as_integer), Some(90));
        assert!(dict.get("Missing").is_none());
    }

    #[test]
    fn references_walks_nested_containers() {
        let payload = Payload::Array(vec![
            Payload::Reference(ObjectRef::new(1, 0)),
            Payload::Dictionary(
                Dictionary::new().with("Kid", ObjectRef::new(2, 0)).with("N", 3i64),
            ),
            Payload::Stream(Stream::new(
                Dictionary::new().with("Res", ObjectRef::new(3, 1)),
                b"data".to_vec(),
            )),
        ]);
        assert_eq!(
            payload.references(),
            vec![ObjectRef::new(1, 0), ObjectRef::new(2, 0), ObjectRef::new(3, 1)]
        );
    }

    #[test]
    fn references_except_skips_keys() {
        let payload = Payload::Dictionary(
            Dictionary::new()
                .with("Parent", ObjectRef::new(1, 0))
                .with("Contents", ObjectRef::new(5, 0)),
        );
        assert_eq!(payload.references_except(&["Parent"]), vec![ObjectRef::new(5, 0)]);
    }

    #[test]
    fn stream_exposes_its_dictionary() {
        let payload = Payload::Stream(Stream::new(Dictionary::new().with("A", 1i64), vec![]));
        assert!(payload.as_dictionary().unwrap().contains_key("A"));
        assert_eq!(
            payload.as_dictionary().unwrap().get("Length"),
            Some(&Payload::Integer(0))
        );
        assert!(Payload::Null.as_dictionary().is_none());
    }

    #[test]
    fn dictionary_iterates_in_key_order() {
        let dict = Dictionary::new().with("b", 1i64).with("a", 2i64).with("c", 3i64);
        let keys: Vec<&str> = dict.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }
}

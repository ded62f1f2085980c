use folio_types::{Dictionary, Fingerprint, ObjectRef, Payload, RevisionId};

/// Typed view of a trailer dictionary.
///
/// Keys this crate does not interpret are kept in `extra` and written back
/// unchanged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Trailer {
    /// One greater than the highest object number.
    pub size: u32,
    pub root: Option<ObjectRef>,
    pub info: Option<ObjectRef>,
    /// Offset of the previous cross-reference section.
    pub prev: Option<u64>,
    pub id: Option<RevisionId>,
    pub encrypt: Option<Payload>,
    pub extra: Dictionary,
}

const KNOWN_KEYS: [&str; 6] = ["Size", "Root", "Info", "Prev", "ID", "Encrypt"];

impl Trailer {
    /// Read a trailer dictionary. Malformed known keys are dropped.
    pub fn from_dictionary(dict: &Dictionary) -> Self {
        let size = dict
            .get("Size")
            .and_then(Payload::as_integer)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0);
        let prev = dict
            .get("Prev")
            .and_then(Payload::as_integer)
            .and_then(|n| u64::try_from(n).ok());
        let extra = dict
            .iter()
            .filter(|(key, _)| !KNOWN_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Self {
            size,
            root: dict.get_reference("Root"),
            info: dict.get_reference("Info"),
            prev,
            id: dict.get("ID").and_then(parse_id),
            encrypt: dict.get("Encrypt").cloned(),
            extra,
        }
    }

    pub fn to_dictionary(&self) -> Dictionary {
        let mut dict = self.extra.clone();
        dict.insert("Size", i64::from(self.size));
        if let Some(root) = self.root {
            dict.insert("Root", root);
        }
        if let Some(info) = self.info {
            dict.insert("Info", info);
        }
        if let Some(prev) = self.prev {
            dict.insert("Prev", prev as i64);
        }
        if let Some(id) = &self.id {
            dict.insert(
                "ID",
                Payload::Array(vec![
                    Payload::string(id.base.as_bytes().to_vec()),
                    Payload::string(id.version.as_bytes().to_vec()),
                ]),
            );
        }
        if let Some(encrypt) = &self.encrypt {
            dict.insert("Encrypt", encrypt.clone());
        }
        dict
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypt.is_some()
    }
}

fn parse_id(value: &Payload) -> Option<RevisionId> {
    let [base, version] = value.as_array()? else {
        return None;
    };
    let fingerprint = |p: &Payload| match p {
        Payload::String(bytes) => Fingerprint::from_slice(bytes).ok(),
        _ => None,
    };
    Some(RevisionId::new(fingerprint(base)?, fingerprint(version)?))
}

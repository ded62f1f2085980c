use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};

use folio_crypto::ContentHasher;
use folio_types::{Dictionary, Fingerprint, Payload, RevisionId};
use folio_xref::encode_payload;

/// Inputs to one version fingerprint.
#[derive(Clone, Copy, Debug)]
pub struct RevisionInputs<'a> {
    pub timestamp: DateTime<Utc>,
    pub path: Option<&'a Path>,
    /// Length of the serialized object data.
    pub length: u64,
    pub info: Option<&'a Dictionary>,
    /// Per-session save counter, so two saves in the same clock tick still
    /// differ.
    pub sequence: u64,
}

/// Digest of the save event described by `inputs`.
pub fn version_fingerprint(inputs: &RevisionInputs<'_>) -> Fingerprint {
    let mut builder = ContentHasher::REVISION.builder();
    builder
        .field(
            inputs
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Nanos, true)
                .as_bytes(),
        )
        .field(
            inputs
                .path
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default()
                .as_bytes(),
        )
        .u64_field(inputs.length);
    match inputs.info {
        Some(info) => builder.field(&encode_payload(&Payload::Dictionary(info.clone()))),
        None => builder.field(&[]),
    };
    builder.u64_field(inputs.sequence);
    builder.finish_fingerprint()
}

/// The revision that follows `previous`. The base half is inherited, or
/// taken from the first version when there is no previous revision.
pub fn next_revision(previous: Option<RevisionId>, inputs: &RevisionInputs<'_>) -> RevisionId {
    let version = version_fingerprint(inputs);
    let base = previous.map_or(version, |p| p.base);
    RevisionId::new(base, version)
}

/// `D:YYYYMMDDHHmmSSZ`, the date string form used in Info dictionaries.
pub fn format_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("D:%Y%m%d%H%M%SZ").to_string()
}

use folio_types::Fingerprint;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"folio-revision-v1"`) that is
/// prepended to every digest, so digests from different domains over
/// identical fields never collide.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for revision fingerprints (file identifiers).
    pub const REVISION: Self = Self {
        domain: "folio-revision-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Start an incremental digest over several fields.
    pub fn builder(&self) -> DigestBuilder {
        let mut inner = blake3::Hasher::new();
        inner.update(self.domain.as_bytes());
        inner.update(b":");
        DigestBuilder { inner }
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Incremental digest; fields are length-prefixed so `("ab", "c")` and
/// `("a", "bc")` hash differently.
pub struct DigestBuilder {
    inner: blake3::Hasher,
}

impl DigestBuilder {
    /// Append one length-prefixed field.
    pub fn field(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(&(data.len() as u64).to_be_bytes());
        self.inner.update(data);
        self
    }

    /// Append a u64 field.
    pub fn u64_field(&mut self, value: u64) -> &mut Self {
        self.field(&value.to_be_bytes())
    }

    pub fn finish(&self) -> [u8; 32] {
        *self.inner.finalize().as_bytes()
    }

    /// The first 16 bytes of [`finish`](Self::finish).
    pub fn finish_fingerprint(&self) -> Fingerprint {
        Fingerprint::from_digest(&self.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let a = ContentHasher::REVISION.builder().field(b"hello").finish();
        let b = ContentHasher::REVISION.builder().field(b"hello").finish();
        assert_eq!(a, b);
    }

    #[test]
    fn different_domains_produce_different_digests() {
        let other = ContentHasher::new("folio-test-v1");
        assert_eq!(other.domain(), "folio-test-v1");
        assert_ne!(
            other.builder().field(b"same").finish(),
            ContentHasher::REVISION.builder().field(b"same").finish()
        );
    }

    #[test]
    fn fields_are_length_prefixed() {
        let a = ContentHasher::REVISION
            .builder()
            .field(b"ab")
            .field(b"c")
            .finish();
        let b = ContentHasher::REVISION
            .builder()
            .field(b"a")
            .field(b"bc")
            .finish();
        assert_ne!(a, b);
    }

    #[test]
    fn u64_field_is_big_endian_bytes() {
        let a = ContentHasher::REVISION.builder().u64_field(7).finish();
        let b = ContentHasher::REVISION
            .builder()
            .field(&7u64.to_be_bytes())
            .finish();
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_is_digest_prefix() {
        let mut builder = ContentHasher::REVISION.builder();
        builder.field(b"x");
        assert_eq!(&builder.finish()[..16], builder.finish_fingerprint().as_bytes());
    }
}

use std::rc::Rc;

use tracing::debug;

use folio_types::{Dictionary, Payload, Stream};

use crate::error::{RegistryError, RegistryResult};
use crate::handle::{ObjectHandle, RegistryId};
use crate::registry::ObjectRegistry;

/// Deep-copies payload graphs from one registry into another.
///
/// An importer is bound to a source registry (borrowed for its lifetime)
/// and to the id of one target registry. References met during a copy are
/// imported through [`ObjectRegistry::add_external`], which owns the dedup
/// cache, so copying the same foreign object twice yields the same local
/// object.
pub struct Importer<'a> {
    source: &'a ObjectRegistry,
    target: RegistryId,
    copies: usize,
}

impl<'a> Importer<'a> {
    /// Bind an importer to `source` → `target`.
    pub fn new(source: &'a ObjectRegistry, target: &ObjectRegistry) -> Self {
        Self {
            source,
            target: target.id(),
            copies: 0,
        }
    }

    pub fn source(&self) -> &'a ObjectRegistry {
        self.source
    }

    pub fn target(&self) -> RegistryId {
        self.target
    }

    /// Number of foreign handles whose payload was deep-copied.
    pub fn copies(&self) -> usize {
        self.copies
    }

    /// Import source object `number` into `target`.
    pub fn import(
        &mut self,
        number: u32,
        target: &mut ObjectRegistry,
    ) -> RegistryResult<Rc<ObjectHandle>> {
        let foreign = self.source.get(number)?;
        target.add_external(&foreign, self)
    }

    /// Copy `payload` into `target`, importing every referenced object.
    ///
    /// Scalars are copied verbatim. References to free numbers or with a
    /// stale generation become `null`.
    pub fn clone_payload(
        &mut self,
        payload: &Payload,
        target: &mut ObjectRegistry,
    ) -> RegistryResult<Payload> {
        self.check_target(target)?;
        let copied = match payload {
            Payload::Reference(reference) => match self.source.lookup(*reference)? {
                Some(foreign) => {
                    let local = target.add_external(&foreign, self)?;
                    Payload::Reference(local.object_ref())
                }
                None => {
                    debug!(reference = %reference, "dangling reference imported as null");
                    Payload::Null
                }
            },
            Payload::Array(items) => Payload::Array(
                items
                    .iter()
                    .map(|item| self.clone_payload(item, target))
                    .collect::<RegistryResult<Vec<_>>>()?,
            ),
            Payload::Dictionary(dict) => Payload::Dictionary(self.clone_dictionary(dict, target)?),
            Payload::Stream(stream) => Payload::Stream(Stream::new(
                self.clone_dictionary(&stream.dict, target)?,
                stream.data.clone(),
            )),
            scalar => scalar.clone(),
        };
        Ok(copied)
    }

    fn clone_dictionary(
        &mut self,
        dict: &Dictionary,
        target: &mut ObjectRegistry,
    ) -> RegistryResult<Dictionary> {
        dict.iter()
            .map(|(key, value)| Ok((key.clone(), self.clone_payload(value, target)?)))
            .collect()
    }

    pub(crate) fn check_target(&self, target: &ObjectRegistry) -> RegistryResult<()> {
        if target.id() == self.target {
            Ok(())
        } else {
            Err(RegistryError::IncompatibleTarget)
        }
    }

    pub(crate) fn record_copy(&mut self) {
        self.copies += 1;
    }
}

impl std::fmt::Debug for Importer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Importer")
            .field("source", &self.source.id())
            .field("target", &self.target)
            .field("copies", &self.copies)
            .finish()
    }
}

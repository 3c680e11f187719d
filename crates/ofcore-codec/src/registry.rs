use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{CodecError, Result};

/// Decodes one experimenter payload: `(exp_type, data) -> value`.
pub type ExperimenterDecoder =
    Arc<dyn Fn(u32, &[u8]) -> std::result::Result<Value, String> + Send + Sync>;

/// Experimenter-id keyed payload decoders.
///
/// Built once and handed to the codec; there is no process-wide registry.
#[derive(Clone, Default)]
pub struct ExperimenterRegistry {
    decoders: HashMap<u32, ExperimenterDecoder>,
}

impl ExperimenterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoder, replacing any previous one for `experimenter`.
    pub fn register<F>(&mut self, experimenter: u32, decoder: F)
    where
        F: Fn(u32, &[u8]) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.decoders.insert(experimenter, Arc::new(decoder));
    }

    /// Builder form of [`ExperimenterRegistry::register`].
    pub fn with_decoder<F>(mut self, experimenter: u32, decoder: F) -> Self
    where
        F: Fn(u32, &[u8]) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.register(experimenter, decoder);
        self
    }

    /// Decode a payload. `Ok(None)` when nothing is registered for `experimenter`.
    pub fn decode(&self, experimenter: u32, exp_type: u32, data: &[u8]) -> Result<Option<Value>> {
        match self.decoders.get(&experimenter) {
            Some(decoder) => decoder(exp_type, data)
                .map(Some)
                .map_err(|reason| CodecError::Experimenter {
                    experimenter,
                    reason,
                }),
            None => Ok(None),
        }
    }

    pub fn has_decoder(&self, experimenter: u32) -> bool {
        self.decoders.contains_key(&experimenter)
    }

    /// Registered experimenter ids, sorted.
    pub fn experimenters(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.decoders.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl fmt::Debug for ExperimenterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExperimenterRegistry")
            .field("experimenters", &self.experimenters())
            .finish()
    }
}

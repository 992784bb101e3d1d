//! Primary + mirror write decorator.

use super::{BackendKind, BarStore, SeriesKey};
use crate::error::StoreError;
use patternlab_core::BarFrame;
use std::sync::Arc;
use tracing::warn;

/// Writes go to `primary`, then are replicated to `mirror`. A mirror failure
/// is logged and does not fail the write. Reads only touch `primary`.
pub struct DualWrite {
    primary: Arc<dyn BarStore>,
    mirror: Arc<dyn BarStore>,
}

/// Result of a dual write whose primary write succeeded.
#[derive(Debug)]
pub struct MirroredWrite {
    pub rows: usize,
    pub mirror_error: Option<StoreError>,
}

impl DualWrite {
    pub fn new(primary: Arc<dyn BarStore>, mirror: Arc<dyn BarStore>) -> Self {
        Self { primary, mirror }
    }

    pub fn save_mirrored(
        &self,
        key: &SeriesKey,
        frame: &BarFrame,
    ) -> Result<MirroredWrite, StoreError> {
        let rows = self.primary.save(key, frame)?;
        let mirror_error = match self.mirror.save(key, frame) {
            Ok(_) => None,
            Err(e) => {
                warn!(
                    series = %key,
                    mirror = %self.mirror.kind(),
                    error = %e,
                    "mirror write failed"
                );
                Some(e)
            }
        };
        Ok(MirroredWrite { rows, mirror_error })
    }
}

impl BarStore for DualWrite {
    fn kind(&self) -> BackendKind {
        self.primary.kind()
    }

    fn save(&self, key: &SeriesKey, frame: &BarFrame) -> Result<usize, StoreError> {
        self.save_mirrored(key, frame).map(|w| w.rows)
    }

    fn get(&self, key: &SeriesKey, limit: usize) -> Result<Option<BarFrame>, StoreError> {
        self.primary.get(key, limit)
    }
}

//! Sensor handle namespacing
//!
//! Every backend numbers its own sensors. The proxy exposes one handle space
//! to the framework by storing the backend index in the top byte of the
//! 32-bit handle and the backend-local handle in the low 24 bits:
//!
//! ```text
//!  31      24 23                      0
//! +----------+-------------------------+
//! | backend  |   backend-local handle  |
//! +----------+-------------------------+
//! ```

use crate::HalError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a backend in the proxy's backend table
pub type BackendIndex = u8;

pub const BACKEND_INDEX_SHIFT: u32 = 24;
pub const BACKEND_INDEX_MASK: u32 = 0xFF00_0000;

/// A sensor handle, either backend-local or proxy-global
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorHandle(pub u32);

impl SensorHandle {
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for SensorHandle {
    fn from(raw: u32) -> Self {
        SensorHandle(raw)
    }
}

impl fmt::Display for SensorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Put `index` in the namespace byte of `local`.
///
/// The caller guarantees `local` has a clear namespace; use [`try_encode`]
/// for handles that have not been checked yet.
pub fn encode(local: SensorHandle, index: BackendIndex) -> SensorHandle {
    debug_assert!(has_clear_namespace(local), "handle {} already namespaced", local);
    SensorHandle(local.0 | (u32::from(index) << BACKEND_INDEX_SHIFT))
}

/// Like [`encode`], but refuses handles whose namespace byte is already set
pub fn try_encode(local: SensorHandle, index: BackendIndex) -> Result<SensorHandle, HalError> {
    if !has_clear_namespace(local) {
        return Err(HalError::ConfigurationError(format!(
            "backend {} reported handle {} with a non-zero namespace byte",
            index, local
        )));
    }
    Ok(encode(local, index))
}

/// Strip the namespace byte, giving back the backend-local handle
pub fn decode(global: SensorHandle) -> SensorHandle {
    SensorHandle(global.0 & !BACKEND_INDEX_MASK)
}

/// Index of the backend owning `global`
pub fn backend_index_of(global: SensorHandle) -> BackendIndex {
    (global.0 >> BACKEND_INDEX_SHIFT) as BackendIndex
}

/// True iff the namespace byte is zero
pub fn has_clear_namespace(handle: SensorHandle) -> bool {
    handle.0 & BACKEND_INDEX_MASK == 0
}

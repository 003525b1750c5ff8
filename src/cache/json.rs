//! JSON helpers on top of the byte interface.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::ByteCache;
use crate::error::Result;

impl ByteCache {
    /// Serializes `value` as JSON and stores it under `key`.
    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, &bytes)
    }

    /// Reads the value under `key` and deserializes it from JSON.
    ///
    /// # Errors
    /// `NotFound` as for `get`, or `Serialization` if the stored bytes are
    /// not valid JSON for `T`.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let bytes = self.get(key)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

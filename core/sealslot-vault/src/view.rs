//! Read-only, wipeable view of decrypted data.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Owns one decrypted payload until [`SecureDataView::clear`] wipes it.
///
/// After `clear()`, every accessor returns [`Error::Locked`]; re-reading the
/// store produces a fresh view. Values are returned by reference or by value;
/// nested objects are not individually wrapped.
pub struct SecureDataView {
    payload: Option<Map<String, Value>>,
}

impl SecureDataView {
    pub(crate) fn new(payload: Map<String, Value>) -> Self {
        Self {
            payload: Some(payload),
        }
    }

    fn payload(&self) -> Result<&Map<String, Value>> {
        self.payload.as_ref().ok_or(Error::Locked)
    }

    /// Looks up a top-level field.
    pub fn get(&self, key: &str) -> Result<Option<&Value>> {
        Ok(self.payload()?.get(key))
    }

    pub fn contains_key(&self, key: &str) -> Result<bool> {
        Ok(self.payload()?.contains_key(key))
    }

    /// The payload's top-level field names.
    pub fn keys(&self) -> Result<Vec<&str>> {
        Ok(self.payload()?.keys().map(String::as_str).collect())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.payload()?.is_empty())
    }

    /// The whole payload as a JSON value.
    pub fn to_value(&self) -> Result<Value> {
        Ok(Value::Object(self.payload()?.clone()))
    }

    /// Deserializes the payload into a caller type.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.payload()?.clone()))
            .map_err(|e| Error::Validation(format!("payload does not match target type: {e}")))
    }

    /// Wipes the plaintext. Further access fails with [`Error::Locked`].
    pub fn clear(&mut self) {
        self.payload = None;
    }

    pub fn is_cleared(&self) -> bool {
        self.payload.is_none()
    }
}

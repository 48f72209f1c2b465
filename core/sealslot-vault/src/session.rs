//! Session cache for the derived master-password KEK.

use sealslot_crypto::SymmetricKey;

/// Holds at most one derived KEK, keyed by the exact (salt, rounds) pair it
/// was derived with. Cleared on lock and on every mode change.
#[derive(Default)]
pub(crate) struct SessionCache {
    entry: Option<SessionEntry>,
}

struct SessionEntry {
    kek: SymmetricKey,
    salt: String,
    rounds: u32,
}

impl SessionCache {
    pub fn set(&mut self, kek: SymmetricKey, salt: &str, rounds: u32) {
        self.entry = Some(SessionEntry {
            kek,
            salt: salt.to_string(),
            rounds,
        });
    }

    /// Returns the cached KEK only on an exact (salt, rounds) match.
    pub fn matching(&self, salt: &str, rounds: u32) -> Option<SymmetricKey> {
        self.entry
            .as_ref()
            .filter(|e| e.salt == salt && e.rounds == rounds)
            .map(|e| e.kek.clone())
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}

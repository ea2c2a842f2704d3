//! Auxiliary lookup abstraction

use crate::error::Result;
use crate::record::Value;
use std::collections::HashMap;
use std::future::Future;

/// Zero-or-one value lookup keyed by an exact-match identifier
///
/// `Ok(None)` means "no row": a valid answer, not a failure. Errors are
/// reserved for the lookup itself failing.
pub trait Lookup: Send + Sync {
    fn lookup(&self, key: &str) -> impl Future<Output = Result<Option<Value>>> + Send;

    /// Look up several keys at once; keys without a row are absent from the map
    ///
    /// The default issues one [`Lookup::lookup`] per key. Override this when
    /// the store can answer a key set in one round-trip.
    fn lookup_many(
        &self,
        keys: &[String],
    ) -> impl Future<Output = Result<HashMap<String, Value>>> + Send {
        async move {
            let mut found = HashMap::new();
            for key in keys {
                if let Some(value) = self.lookup(key).await? {
                    found.insert(key.clone(), value);
                }
            }
            Ok(found)
        }
    }
}

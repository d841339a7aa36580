//! Request fingerprints.

use std::fmt;

use serde::Serialize;

/// Deterministic fingerprint of a logical request: the target followed by
/// the JSON serialization of its options.
///
/// Serialization is literal. Options that are equivalent but list their
/// parameters or headers in a different order yield different keys and are
/// cached separately.
///
/// # Examples
///
/// ```
/// use rttp_coord::coordinator::RequestKey;
/// use rttp_coord::http::RequestOptions;
///
/// let key = RequestKey::new("/sample.json", &RequestOptions::new().param("key", 1)).unwrap();
/// assert_eq!(key.as_str(), r#"/sample.json{"params":{"key":1}}"#);
///
/// let bare = RequestKey::new("/sample.json", &RequestOptions::new()).unwrap();
/// assert_eq!(bare.as_str(), "/sample.json{}");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(String);

impl RequestKey {
    /// Derives the key for `target` requested with `options`.
    ///
    /// # Errors
    ///
    /// Fails only if `options` cannot be represented as JSON (for example a
    /// map with non-string keys).
    pub fn new<O>(target: &str, options: &O) -> Result<Self, serde_json::Error>
    where
        O: Serialize + ?Sized,
    {
        let serialized = serde_json::to_string(options)?;
        let mut key = String::with_capacity(target.len() + serialized.len());
        key.push_str(target);
        key.push_str(&serialized);
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RequestKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

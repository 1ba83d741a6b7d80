//! Provider adapter boundary
//!
//! The engine treats a provider as an opaque, possibly slow, possibly failing
//! RPC. Everything about protocols, auth and serialization lives behind it.

use crate::error::ProviderError;
use crate::node::ResourceKey;
use crate::property::PropertyMap;
use std::sync::Arc;
use std::time::Duration;

/// Remote control plane that can realize and delete resources.
///
/// Implementations must be idempotent for identical desired properties: the
/// engine retries transient failures with the same request.
pub trait Provider: Send + Sync {
    /// Create the resource, or update it in place if it already exists.
    ///
    /// The returned map must contain a string `id` holding the remote identifier.
    fn create_or_update(
        &self,
        key: &ResourceKey,
        desired: &PropertyMap,
        timeout: Duration,
    ) -> Result<PropertyMap, ProviderError>;

    /// Delete a previously realized resource by its remote identifier.
    fn delete(&self, kind: &str, remote_id: &str, timeout: Duration) -> Result<(), ProviderError>;
}

impl<P: Provider + ?Sized> Provider for Arc<P> {
    fn create_or_update(
        &self,
        key: &ResourceKey,
        desired: &PropertyMap,
        timeout: Duration,
    ) -> Result<PropertyMap, ProviderError> {
        (**self).create_or_update(key, desired, timeout)
    }

    fn delete(&self, kind: &str, remote_id: &str, timeout: Duration) -> Result<(), ProviderError> {
        (**self).delete(kind, remote_id, timeout)
    }
}

/// Extract the remote identifier from realized properties
pub fn remote_id(realized: &PropertyMap) -> Option<&str> {
    realized.get("id").and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_id_requires_non_empty_string() {
        let mut props = PropertyMap::new();
        assert_eq!(remote_id(&props), None);
        props.insert("id".into(), json!(42));
        assert_eq!(remote_id(&props), None);
        props.insert("id".into(), json!(""));
        assert_eq!(remote_id(&props), None);
        props.insert("id".into(), json!("/rg/vnet"));
        assert_eq!(remote_id(&props), Some("/rg/vnet"));
    }
}

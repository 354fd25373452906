//! Per-call context handed to service implementations.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Metadata and cancellation for one in-flight call.
///
/// Header names are case-insensitive; they are stored lowercased.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    metadata: Arc<HashMap<String, String>>,
    cancel: CancellationToken,
}

impl CallContext {
    #[must_use]
    pub fn new(metadata: HashMap<String, String>, cancel: CancellationToken) -> Self {
        let metadata = metadata
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self {
            metadata: Arc::new(metadata),
            cancel,
        }
    }

    /// Look up one metadata field.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.metadata
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    #[must_use]
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Token cancelled when the caller aborts the call or disconnects.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

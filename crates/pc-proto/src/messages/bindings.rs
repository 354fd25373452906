//! `OutputBinding` service messages.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::hex_bytes;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokeRequest {
    #[serde(with = "hex_bytes")]
    pub data: Bytes,
    pub metadata: HashMap<String, String>,
    pub operation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokeResponse {
    #[serde(with = "hex_bytes")]
    pub data: Bytes,
    pub metadata: HashMap<String, String>,
    pub content_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOperationsRequest {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListOperationsResponse {
    pub operations: Vec<String>,
}

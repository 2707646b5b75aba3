use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct GetResource<T> {
    #[serde(rename = "items")]
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
/// https://github.com/kubernetes/community/blob/master/contributors/devel/sig-architecture/api-conventions.md#metadata
pub struct ResourceMetadata {
    pub name: String,

    pub namespace: String,

    #[serde(with = "time::serde::rfc3339")]
    pub creation_timestamp: time::OffsetDateTime,

    /// Set when the object has been asked to be deleted but still exists, e.g. while its pods are being removed.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deletion_timestamp: Option<time::OffsetDateTime>,

    #[serde(default)]
    pub labels: HashMap<String, String>,

    #[serde(default)]
    pub annotations: HashMap<String, String>,

    #[serde(default)]
    pub generate_name: Option<String>,
}

impl ResourceMetadata {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

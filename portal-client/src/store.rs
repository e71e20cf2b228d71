use std::fmt;

use async_trait::async_trait;
use portal_fhir::BundleResources;
use serde_json::Value;

use crate::{FhirError, SearchQuery};

/// Credentials attached to every request of one store handle.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    #[default]
    None,
    Bearer(String),
    Basic { username: String, password: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::None => f.write_str("None"),
            Credentials::Bearer(_) => f.write_str("Bearer(***)"),
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

/// Read-only access to a clinical resource store.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// One page of a search, grouped by resource type.
    async fn search(
        &self,
        resource_type: &str,
        query: &SearchQuery,
    ) -> Result<BundleResources, FhirError>;

    /// Every page of a search.
    async fn search_all(
        &self,
        resource_type: &str,
        query: &SearchQuery,
    ) -> Result<BundleResources, FhirError> {
        self.search(resource_type, query).await
    }

    /// A single resource by type and id.
    async fn read(&self, resource_type: &str, id: &str) -> Result<Value, FhirError>;
}

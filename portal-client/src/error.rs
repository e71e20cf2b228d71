use portal_core::PortalError;

/// Errors raised while querying the FHIR server.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("FHIR server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Search still had more results after {0} pages")]
    PageLimit(u32),

    #[error(transparent)]
    Portal(#[from] PortalError),
}

impl FhirError {
    /// HTTP status of a rejected request, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            FhirError::Status { status, .. } => Some(*status),
            FhirError::Network(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

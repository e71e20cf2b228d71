//! Launching a questionnaire for a patient, signed in or anonymous.

use portal_core::{PortalConfig, PortalError};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::{Credentials, FhirError, ResourceStore};

/// Identifiers carried in the questionnaire page URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionnaireLaunch {
    pub patient_id: String,
    pub questionnaire_id: String,
    pub encounter_id: Option<String>,
}

impl QuestionnaireLaunch {
    /// Parse `patient`, `questionnaire` and `encounter` from a query string.
    pub fn from_query(query: &str) -> Result<Self, PortalError> {
        let mut patient_id = None;
        let mut questionnaire_id = None;
        let mut encounter_id = None;

        let pairs = url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes());
        for (key, value) in pairs {
            let value = Some(value.into_owned()).filter(|v| !v.is_empty());
            match key.as_ref() {
                "patient" => patient_id = patient_id.or(value),
                "questionnaire" => questionnaire_id = questionnaire_id.or(value),
                "encounter" => encounter_id = encounter_id.or(value),
                _ => {}
            }
        }

        Ok(Self {
            patient_id: patient_id.ok_or_else(|| PortalError::MissingData("patient".into()))?,
            questionnaire_id: questionnaire_id
                .ok_or_else(|| PortalError::MissingData("questionnaire".into()))?,
            encounter_id,
        })
    }
}

/// The caller of a questionnaire page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub token: Option<String>,
    /// Resource of the signed-in user's current role.
    pub role: Option<Value>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(token: impl Into<String>, role: Value) -> Self {
        Self {
            token: Some(token.into()),
            role: Some(role),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.token.as_deref().map_or(true, str::is_empty)
    }

    /// Credentials for this session's requests.
    ///
    /// Anonymous callers use the dedicated questionnaire client account.
    pub fn credentials(&self, config: &PortalConfig) -> Credentials {
        match self.token.as_deref() {
            Some(token) if !token.is_empty() => Credentials::Bearer(token.to_string()),
            _ => Credentials::Basic {
                username: config.anonymous_client_id.clone(),
                password: config.anonymous_client_secret.clone(),
            },
        }
    }
}

/// Everything a questionnaire form needs to start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchContext {
    pub patient: Value,
    pub author: Value,
    pub questionnaire_id: String,
    pub encounter_id: Option<String>,
}

/// Read the patient and pick the author: the role resource when signed in,
/// the patient when anonymous.
pub async fn load_launch_context<S>(
    store: &S,
    launch: &QuestionnaireLaunch,
    session: &Session,
) -> Result<LaunchContext, FhirError>
where
    S: ResourceStore + ?Sized,
{
    debug!(
        patient_id = %launch.patient_id,
        questionnaire_id = %launch.questionnaire_id,
        anonymous = session.is_anonymous(),
        "loading questionnaire launch"
    );
    let patient = store.read("Patient", &launch.patient_id).await?;

    let author = if session.is_anonymous() {
        patient.clone()
    } else {
        session
            .role
            .clone()
            .ok_or_else(|| PortalError::MissingData("session role".into()))?
    };

    Ok(LaunchContext {
        patient,
        author,
        questionnaire_id: launch.questionnaire_id.clone(),
        encounter_id: launch.encounter_id.clone(),
    })
}

//! Patient overview: BMI plus the clinical cards and today's appointments.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use portal_core::{
    Category, LoadState, ObservationSeries, OverviewData, PatientDetail, PortalConfig,
};
use portal_fhir::{
    build_overview, latest_observation_value, observation_series, patient_details, patient_id,
    OverviewBundles, EXCLUDED_APPOINTMENT_STATUSES,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{FhirError, ResourceStore, SearchQuery};

const MOST_RECENT_FIRST: &str = "-_lastUpdated";

/// Midnight UTC of the day `now` falls on.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

pub fn bmi_query(patient_id: &str, config: &PortalConfig) -> SearchQuery {
    SearchQuery::new()
        .subject(patient_id)
        .code(&config.bmi_code)
        .sort(MOST_RECENT_FIRST)
}

/// Upcoming appointments with the encounters that reference them.
pub fn appointments_query(patient_id: &str, since: DateTime<Utc>) -> SearchQuery {
    SearchQuery::new()
        .actor(patient_id)
        .date_from(since)
        .revinclude("Encounter:appointment")
        .status_not(&EXCLUDED_APPOINTMENT_STATUSES)
}

/// Records of one category with their provenance.
pub fn category_query(category: Category, patient_id: &str) -> SearchQuery {
    let query = SearchQuery::new().patient(patient_id);
    let query = match category {
        Category::Consents => query.status("active"),
        _ => query,
    };
    query
        .sort(MOST_RECENT_FIRST)
        .revinclude("Provenance:target")
}

/// Most recent BMI value, `None` when the patient has no BMI observation.
pub async fn load_bmi<S>(
    store: &S,
    patient_id: &str,
    config: &PortalConfig,
) -> Result<Option<f64>, FhirError>
where
    S: ResourceStore + ?Sized,
{
    let resources = store
        .search("Observation", &bmi_query(patient_id, config))
        .await?;
    Ok(latest_observation_value(resources.of_type("Observation")))
}

/// Run the six overview searches concurrently and shape the result.
///
/// Any failed search fails the whole overview; partial results are never
/// returned.
pub async fn load_overview<S>(
    store: &S,
    patient_id: &str,
    since: DateTime<Utc>,
) -> Result<OverviewData, FhirError>
where
    S: ResourceStore + ?Sized,
{
    let appointments = appointments_query(patient_id, since);
    let allergies = category_query(Category::Allergies, patient_id);
    let conditions = category_query(Category::Conditions, patient_id);
    let immunizations = category_query(Category::Immunizations, patient_id);
    let medications = category_query(Category::Medications, patient_id);
    let consents = category_query(Category::Consents, patient_id);

    debug!(patient_id, "loading overview");
    let result = tokio::try_join!(
        store.search_all("Appointment", &appointments),
        store.search(Category::Allergies.resource_type(), &allergies),
        store.search(Category::Conditions.resource_type(), &conditions),
        store.search(Category::Immunizations.resource_type(), &immunizations),
        store.search(Category::Medications.resource_type(), &medications),
        store.search(Category::Consents.resource_type(), &consents),
    );

    let (appointments, allergies, conditions, immunizations, medications, consents) =
        result.inspect_err(|err| warn!(patient_id, error = %err, "overview failed"))?;

    Ok(build_overview(&OverviewBundles {
        appointments,
        allergies,
        conditions,
        immunizations,
        medications,
        consents,
    }))
}

/// Chart data for one observation code, oldest first.
pub async fn load_observation_series<S>(
    store: &S,
    patient_id: &str,
    code: &str,
) -> Result<ObservationSeries, FhirError>
where
    S: ResourceStore + ?Sized,
{
    let query = SearchQuery::new()
        .subject(patient_id)
        .code(code)
        .sort(MOST_RECENT_FIRST);
    let resources = store.search_all("Observation", &query).await?;
    Ok(observation_series(resources.of_type("Observation")))
}

/// Load states backing the overview screen of one patient.
///
/// The BMI and the overview fail independently of each other.
pub struct PatientOverview<S: ?Sized> {
    store: Arc<S>,
    patient: Value,
    config: PortalConfig,
    bmi: LoadState<Option<f64>, FhirError>,
    response: LoadState<OverviewData, FhirError>,
}

impl<S> PatientOverview<S>
where
    S: ResourceStore + ?Sized,
{
    pub fn new(store: Arc<S>, patient: Value, config: PortalConfig) -> Self {
        Self {
            store,
            patient,
            config,
            bmi: LoadState::Loading,
            response: LoadState::Loading,
        }
    }

    pub async fn reload(&mut self) {
        self.reload_at(Utc::now()).await;
    }

    /// Reload as if the current time were `now`.
    pub async fn reload_at(&mut self, now: DateTime<Utc>) {
        self.bmi = LoadState::Loading;
        self.response = LoadState::Loading;

        let patient_id = match patient_id(&self.patient) {
            Ok(id) => id,
            Err(err) => {
                self.bmi = LoadState::Failure(err.clone().into());
                self.response = LoadState::Failure(err.into());
                return;
            }
        };

        let store = self.store.as_ref();
        let (bmi, response) = tokio::join!(
            load_bmi(store, patient_id, &self.config),
            load_overview(store, patient_id, start_of_day(now)),
        );

        self.bmi = bmi.into();
        self.response = response.into();
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn patient(&self) -> &Value {
        &self.patient
    }

    pub fn bmi(&self) -> &LoadState<Option<f64>, FhirError> {
        &self.bmi
    }

    pub fn response(&self) -> &LoadState<OverviewData, FhirError> {
        &self.response
    }

    /// Administrative details; BMI is blank until its load succeeds.
    pub fn patient_details(&self, today: NaiveDate) -> Vec<PatientDetail> {
        let bmi = self.bmi.success().copied().flatten();
        patient_details(&self.patient, bmi, today)
    }
}

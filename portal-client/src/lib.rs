//! Async query layer over a FHIR server and the patient overview aggregator.

pub mod error;
pub mod http;
pub mod launch;
pub mod overview;
pub mod query;
pub mod store;

pub use error::FhirError;
pub use http::HttpFhirStore;
pub use launch::{load_launch_context, LaunchContext, QuestionnaireLaunch, Session};
pub use overview::{
    appointments_query, bmi_query, category_query, load_bmi, load_observation_series,
    load_overview, start_of_day, PatientOverview,
};
pub use query::SearchQuery;
pub use store::{Credentials, ResourceStore};

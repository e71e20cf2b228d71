//! Bridge WASM <-> JavaScript cho các hàm dựng dữ liệu hiển thị.

use chrono::NaiveDate;
use portal_core::PortalError;
use portal_fhir::{extract_bundle_resources, BundleResources, OverviewBundles};
use serde::Deserialize;
use serde_json::Value;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsOverviewBundles {
    #[serde(default)]
    appointments_bundle: Option<Value>,
    #[serde(default)]
    allergies_bundle: Option<Value>,
    #[serde(default)]
    conditions_bundle: Option<Value>,
    #[serde(default)]
    immunizations_bundle: Option<Value>,
    #[serde(default)]
    medications_bundle: Option<Value>,
    #[serde(default)]
    consents_bundle: Option<Value>,
}

impl TryFrom<JsOverviewBundles> for OverviewBundles {
    type Error = PortalError;

    fn try_from(js: JsOverviewBundles) -> Result<Self, Self::Error> {
        Ok(OverviewBundles {
            appointments: extract_optional(js.appointments_bundle)?,
            allergies: extract_optional(js.allergies_bundle)?,
            conditions: extract_optional(js.conditions_bundle)?,
            immunizations: extract_optional(js.immunizations_bundle)?,
            medications: extract_optional(js.medications_bundle)?,
            consents: extract_optional(js.consents_bundle)?,
        })
    }
}

fn extract_optional(bundle: Option<Value>) -> Result<BundleResources, PortalError> {
    match bundle {
        Some(bundle) => extract_bundle_resources(&bundle),
        None => Ok(BundleResources::default()),
    }
}

/// `{ appointments, cards }` from the six search bundles fetched by the page.
#[wasm_bindgen(js_name = prepareOverview)]
pub fn prepare_overview(bundles: JsValue) -> Result<JsValue, JsValue> {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let js: JsOverviewBundles = from_value(bundles)
        .map_err(|err| JsValue::from_str(&format!("Không đọc được bundles: {err}")))?;
    let bundles = OverviewBundles::try_from(js).map_err(portal_error)?;

    to_value(&portal_fhir::build_overview(&bundles))
        .map_err(|err| JsValue::from_str(&format!("Không serialize overview: {err}")))
}

/// Patient details list; `today` is an ISO date (`YYYY-MM-DD`).
#[wasm_bindgen(js_name = patientDetails)]
pub fn patient_details(
    patient: JsValue,
    bmi: Option<f64>,
    today: &str,
) -> Result<JsValue, JsValue> {
    let patient = from_value::<Value>(patient)
        .map_err(|err| JsValue::from_str(&format!("Không đọc được Patient: {err}")))?;
    let today = parse_today(today).map_err(portal_error)?;

    to_value(&portal_fhir::patient_details(&patient, bmi, today))
        .map_err(|err| JsValue::from_str(&format!("Không serialize details: {err}")))
}

/// Most recent BMI from an Observation search bundle.
#[wasm_bindgen(js_name = latestBmi)]
pub fn latest_bmi(bundle: JsValue) -> Result<Option<f64>, JsValue> {
    let resources = bundle_from_js(bundle)?;
    Ok(portal_fhir::latest_observation_value(
        resources.of_type("Observation"),
    ))
}

/// Chart series from an Observation search bundle.
#[wasm_bindgen(js_name = observationSeries)]
pub fn observation_series(bundle: JsValue) -> Result<JsValue, JsValue> {
    let resources = bundle_from_js(bundle)?;
    to_value(&portal_fhir::observation_series(
        resources.of_type("Observation"),
    ))
    .map_err(|err| JsValue::from_str(&format!("Không serialize series: {err}")))
}

#[wasm_bindgen(js_name = answerOptionDisplay)]
pub fn answer_option_display(option: JsValue) -> Result<JsValue, JsValue> {
    let option = from_value::<Value>(option)
        .map_err(|err| JsValue::from_str(&format!("Không đọc được answerOption: {err}")))?;
    to_value(&portal_fhir::answer_option_display(&option))
        .map_err(|err| JsValue::from_str(&format!("Không serialize display: {err}")))
}

fn bundle_from_js(bundle: JsValue) -> Result<BundleResources, JsValue> {
    let bundle = from_value::<Value>(bundle)
        .map_err(|err| JsValue::from_str(&format!("Không đọc được JSON bundle: {err}")))?;
    extract_bundle_resources(&bundle).map_err(portal_error)
}

fn parse_today(today: &str) -> Result<NaiveDate, PortalError> {
    NaiveDate::parse_from_str(today, "%Y-%m-%d")
        .map_err(|err| PortalError::Parse(format!("today '{today}': {err}")))
}

fn portal_error(err: PortalError) -> JsValue {
    JsValue::from_str(&format!("Portal error: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_bundles_are_empty() {
        let js: JsOverviewBundles = serde_json::from_value(json!({
            "conditionsBundle": {
                "resourceType": "Bundle",
                "entry": [{"resource": {"resourceType": "Condition", "id": "c1"}}]
            }
        }))
        .unwrap();

        let bundles = OverviewBundles::try_from(js).unwrap();
        assert_eq!(bundles.conditions.of_type("Condition").len(), 1);
        assert!(bundles.appointments.is_empty());
        assert!(bundles.consents.is_empty());
    }

    #[test]
    fn malformed_bundle_is_rejected() {
        let js: JsOverviewBundles = serde_json::from_value(json!({
            "consentsBundle": {"resourceType": "Consent"}
        }))
        .unwrap();
        assert!(OverviewBundles::try_from(js).is_err());
    }

    #[test]
    fn today_must_be_iso_date() {
        assert!(parse_today("2026-10-18").is_ok());
        assert!(matches!(parse_today("18/10/2026"), Err(PortalError::Parse(_))));
    }
}

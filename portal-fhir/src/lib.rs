//! FHIR JSON to portal view models: cards, appointments and patient details.

pub mod questionnaire;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use portal_core::{
    AppointmentEntry, Card, CardRow, Category, ObservationSeries, OverviewData, PatientDetail,
    PortalError, SeriesPoint,
};
use serde_json::Value;

pub use questionnaire::answer_option_display;

/// Appointment statuses that never show up in the appointments list.
pub const EXCLUDED_APPOINTMENT_STATUSES: [&str; 2] = ["entered-in-error", "cancelled"];

/// Resources of a bundle grouped by `resourceType`, in entry order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundleResources {
    by_type: BTreeMap<String, Vec<Value>>,
}

impl BundleResources {
    pub fn of_type(&self, resource_type: &str) -> &[Value] {
        self.by_type
            .get(resource_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn provenance(&self) -> &[Value] {
        self.of_type("Provenance")
    }

    pub fn len(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append resources from another page of the same search.
    pub fn extend(&mut self, other: BundleResources) {
        for (resource_type, resources) in other.by_type {
            self.by_type
                .entry(resource_type)
                .or_default()
                .extend(resources);
        }
    }

    fn push(&mut self, resource_type: &str, resource: Value) {
        self.by_type
            .entry(resource_type.to_string())
            .or_default()
            .push(resource);
    }
}

/// Parse a bundle from a JSON string and group its resources.
pub fn extract_bundle_str(bundle_json: &str) -> Result<BundleResources, PortalError> {
    let value: Value =
        serde_json::from_str(bundle_json).map_err(|err| PortalError::Parse(err.to_string()))?;
    extract_bundle_resources(&value)
}

/// Group the entries of a searchset bundle by resource type.
///
/// A bundle without `entry` is empty rather than an error.
pub fn extract_bundle_resources(bundle: &Value) -> Result<BundleResources, PortalError> {
    let bundle_type = bundle
        .get("resourceType")
        .and_then(Value::as_str)
        .ok_or_else(|| PortalError::MissingData("resourceType".into()))?;

    if bundle_type != "Bundle" {
        return Err(PortalError::Parse(format!(
            "Expected resourceType Bundle, received {bundle_type}"
        )));
    }

    let mut resources = BundleResources::default();
    let Some(entries) = bundle.get("entry") else {
        return Ok(resources);
    };
    let entries = entries
        .as_array()
        .ok_or_else(|| PortalError::Parse("Bundle entry must be an array".into()))?;

    for (idx, entry) in entries.iter().enumerate() {
        let Some(resource) = entry.get("resource") else {
            continue;
        };
        let resource_type = resource
            .get("resourceType")
            .and_then(Value::as_str)
            .ok_or_else(|| PortalError::Parse(format!("entry {idx} has no resourceType")))?;
        resources.push(resource_type, resource.clone());
    }

    Ok(resources)
}

/// Per-category bundles feeding the overview.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverviewBundles {
    pub appointments: BundleResources,
    pub allergies: BundleResources,
    pub conditions: BundleResources,
    pub immunizations: BundleResources,
    pub medications: BundleResources,
    pub consents: BundleResources,
}

/// Build the sorted cards and the appointments list.
pub fn build_overview(bundles: &OverviewBundles) -> OverviewData {
    let cards = Category::ALL
        .iter()
        .map(|category| {
            let bundle = match category {
                Category::Allergies => &bundles.allergies,
                Category::Conditions => &bundles.conditions,
                Category::Immunizations => &bundles.immunizations,
                Category::Medications => &bundles.medications,
                Category::Consents => &bundles.consents,
            };
            prepare_category(
                *category,
                bundle.of_type(category.resource_type()),
                bundle.provenance(),
            )
        })
        .collect();

    OverviewData::new(prepare_appointments(&bundles.appointments), cards)
}

fn prepare_category(category: Category, records: &[Value], provenance: &[Value]) -> Card {
    match category {
        Category::Allergies => prepare_allergies(records, provenance),
        Category::Conditions => prepare_conditions(records, provenance),
        Category::Immunizations => prepare_immunizations(records, provenance),
        Category::Medications => prepare_medications(records, provenance),
        Category::Consents => prepare_consents(records, provenance),
    }
}

fn prepare_card(
    category: Category,
    records: &[Value],
    provenance: &[Value],
    row: impl Fn(&Value) -> (String, Option<String>, Option<String>),
) -> Card {
    let rows = records
        .iter()
        .map(|resource| {
            let (title, date, detail) = row(resource);
            CardRow {
                id: resource_id(resource, category.resource_type()),
                title,
                date,
                detail,
                recorded_by: provenance_author(resource, provenance),
            }
        })
        .collect();
    Card::new(category, rows)
}

pub fn prepare_allergies(records: &[Value], provenance: &[Value]) -> Card {
    prepare_card(Category::Allergies, records, provenance, |resource| {
        let title = resource
            .get("code")
            .and_then(extract_codeable_text)
            .unwrap_or_else(|| "Unknown allergy".to_string());

        let mut phrases = Vec::new();
        if let Some(category) = resource
            .get("category")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).collect::<Vec<_>>())
        {
            if !category.is_empty() {
                phrases.push(format!(
                    "Category: {}.",
                    category
                        .into_iter()
                        .map(capitalize_first)
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
        }
        if let Some(reactions) = summarize_reactions(resource) {
            phrases.push(format!("Reaction: {reactions}."));
        }
        if let Some(criticality) = resource.get("criticality").and_then(Value::as_str) {
            phrases.push(format!("Criticality {}.", criticality.to_uppercase()));
        }

        let date = extract_date_display(resource, &["recordedDate", "onsetDateTime"]);
        (title, date, join_phrases(phrases))
    })
}

pub fn prepare_conditions(records: &[Value], provenance: &[Value]) -> Card {
    prepare_card(Category::Conditions, records, provenance, |resource| {
        let title = resource
            .get("code")
            .and_then(extract_codeable_text)
            .unwrap_or_else(|| "Unknown condition".to_string());

        let mut phrases = Vec::new();
        if let Some(status) = extract_status_code(resource.get("clinicalStatus")) {
            phrases.push(format!("Status {status}."));
        }
        if let Some(severity) = extract_status_code(resource.get("severity")) {
            phrases.push(format!("Severity {severity}."));
        }

        let date = extract_date_display(
            resource,
            &["recordedDate", "onsetDateTime", "onsetDate", "assertedDate"],
        );
        (title, date, join_phrases(phrases))
    })
}

pub fn prepare_immunizations(records: &[Value], provenance: &[Value]) -> Card {
    prepare_card(Category::Immunizations, records, provenance, |resource| {
        let title = resource
            .get("vaccineCode")
            .and_then(extract_codeable_text)
            .unwrap_or_else(|| "Unknown vaccine".to_string());

        let mut phrases = Vec::new();
        if let Some(status) = resource.get("status").and_then(Value::as_str) {
            phrases.push(format!("Status {status}."));
        }
        if let Some(lot) = resource.get("lotNumber").and_then(Value::as_str) {
            phrases.push(format!("Lot {lot}."));
        }

        let date = extract_date_display(resource, &["occurrenceDateTime", "recorded"]);
        (title, date, join_phrases(phrases))
    })
}

pub fn prepare_medications(records: &[Value], provenance: &[Value]) -> Card {
    prepare_card(Category::Medications, records, provenance, |resource| {
        let title = resource
            .get("medicationCodeableConcept")
            .and_then(extract_codeable_text)
            .or_else(|| {
                resource
                    .get("medicationReference")
                    .and_then(|value| value.get("display"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "Medication not specified".to_string());

        let date = extract_date_display(
            resource,
            &["effectiveDateTime", "effectivePeriod", "dateAsserted"],
        );
        let detail = summarize_dosage(resource).and_then(join_phrases);
        (title, date, detail)
    })
}

pub fn prepare_consents(records: &[Value], provenance: &[Value]) -> Card {
    prepare_card(Category::Consents, records, provenance, |resource| {
        let title = resource
            .get("category")
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
            .and_then(extract_codeable_text)
            .or_else(|| resource.get("scope").and_then(extract_codeable_text))
            .unwrap_or_else(|| "Consent".to_string());

        let mut phrases = Vec::new();
        if let Some(status) = resource.get("status").and_then(Value::as_str) {
            phrases.push(format!("Status {status}."));
        }
        if let Some(policy) = resource.get("policyRule").and_then(extract_codeable_text) {
            phrases.push(format!("Policy {policy}."));
        }

        let date = extract_date_display(resource, &["dateTime"]);
        (title, date, join_phrases(phrases))
    })
}

/// Merge appointments with the encounters that reference them.
///
/// Cancelled and entered-in-error appointments are dropped; the rest are
/// ordered by start time with unknown starts last.
pub fn prepare_appointments(resources: &BundleResources) -> Vec<AppointmentEntry> {
    let mut encounters: HashMap<String, &Value> = HashMap::new();
    for encounter in resources.of_type("Encounter") {
        let references = encounter
            .get("appointment")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|reference| reference.get("reference").and_then(Value::as_str));
        for reference in references {
            encounters.entry(reference.to_string()).or_insert(encounter);
        }
    }

    let mut appointments: Vec<AppointmentEntry> = resources
        .of_type("Appointment")
        .iter()
        .filter_map(|appointment| {
            let status = appointment
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            if EXCLUDED_APPOINTMENT_STATUSES.contains(&status) {
                return None;
            }

            let id = resource_id(appointment, "Appointment");
            let encounter = encounters.get(&format!("Appointment/{id}")).copied();

            Some(AppointmentEntry {
                status: status.to_string(),
                start: extract_datetime(appointment, &["start"]),
                end: extract_datetime(appointment, &["end"]),
                service: appointment
                    .get("serviceType")
                    .and_then(Value::as_array)
                    .and_then(|arr| arr.first())
                    .and_then(extract_codeable_text),
                practitioner: appointment_practitioner(appointment),
                encounter_id: encounter
                    .and_then(|enc| enc.get("id"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                encounter_status: encounter
                    .and_then(|enc| enc.get("status"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                id,
            })
        })
        .collect();

    appointments.sort_by_key(|entry| (entry.start.is_none(), entry.start));
    appointments
}

fn appointment_practitioner(appointment: &Value) -> Option<String> {
    appointment
        .get("participant")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|participant| participant.get("actor"))
        .find(|actor| {
            actor
                .get("reference")
                .and_then(Value::as_str)
                .is_some_and(|reference| reference.starts_with("Practitioner/"))
        })
        .and_then(|actor| {
            actor
                .get("display")
                .or_else(|| actor.get("reference"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
}

/// Value of the most recently updated Observation (`meta.lastUpdated`).
///
/// Ties and missing timestamps keep the earlier entry, so a server-sorted
/// list yields its first element.
pub fn latest_observation_value(observations: &[Value]) -> Option<f64> {
    let mut latest: Option<(&Value, Option<DateTime<Utc>>)> = None;
    for observation in observations {
        let updated = last_updated(observation);
        let replace = match latest {
            Some((_, current)) => is_more_recent(updated, current),
            None => true,
        };
        if replace {
            latest = Some((observation, updated));
        }
    }

    latest
        .and_then(|(observation, _)| observation.get("valueQuantity"))
        .and_then(|quantity| quantity.get("value"))
        .and_then(Value::as_f64)
}

/// Administrative details shown next to the overview cards.
pub fn patient_details(patient: &Value, bmi: Option<f64>, today: NaiveDate) -> Vec<PatientDetail> {
    let birth_date = patient
        .get("birthDate")
        .and_then(Value::as_str)
        .and_then(parse_date);
    let birth_display = birth_date.map(|date| {
        let human = format_human_date(date);
        match person_age(date, today) {
            Some(age) => format!("{human} • {age} y.o."),
            None => human,
        }
    });

    let phone = patient
        .get("telecom")
        .and_then(Value::as_array)
        .and_then(|telecom| {
            telecom
                .iter()
                .find(|contact| contact.get("system").and_then(Value::as_str) == Some("phone"))
        })
        .and_then(|contact| contact.get("value"))
        .and_then(Value::as_str)
        .map(str::to_string);

    vec![
        PatientDetail::new("Birth date", birth_display),
        PatientDetail::new(
            "Sex",
            patient
                .get("gender")
                .and_then(Value::as_str)
                .map(capitalize_first),
        ),
        PatientDetail::new("BMI", bmi.map(format_numeric)),
        PatientDetail::new("Phone number", phone),
        // Not collected yet.
        PatientDetail::new("SSN", None),
    ]
}

/// The patient id, required for every query.
pub fn patient_id(patient: &Value) -> Result<&str, PortalError> {
    patient
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| PortalError::MissingData("Patient.id".into()))
}

/// Chart points ordered by effective time, oldest first.
pub fn observation_series(observations: &[Value]) -> ObservationSeries {
    let mut points: Vec<SeriesPoint> = observations
        .iter()
        .map(|observation| SeriesPoint {
            effective: extract_observation_timestamp(observation),
            value: observation
                .get("valueQuantity")
                .and_then(|quantity| quantity.get("value"))
                .and_then(Value::as_f64),
        })
        .collect();
    points.sort_by_key(|point| point.effective);

    ObservationSeries {
        total: points.len(),
        points,
    }
}

fn provenance_author(resource: &Value, provenance: &[Value]) -> Option<String> {
    let resource_type = resource.get("resourceType").and_then(Value::as_str)?;
    let id = resource.get("id").and_then(Value::as_str)?;
    let reference = format!("{resource_type}/{id}");
    let versioned = format!("{reference}/_history/");

    provenance
        .iter()
        .find(|record| {
            record
                .get("target")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|target| target.get("reference").and_then(Value::as_str))
                .any(|target| target == reference || target.starts_with(&versioned))
        })
        .and_then(|record| record.get("agent"))
        .and_then(Value::as_array)
        .and_then(|agents| agents.first())
        .and_then(|agent| agent.get("who"))
        .and_then(|who| who.get("display").or_else(|| who.get("reference")))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn last_updated(resource: &Value) -> Option<DateTime<Utc>> {
    resource
        .get("meta")
        .and_then(|meta| meta.get("lastUpdated"))
        .and_then(Value::as_str)
        .and_then(parse_datetime)
}

fn person_age(birth_date: NaiveDate, today: NaiveDate) -> Option<i32> {
    let mut age = today.year() - birth_date.year();
    if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }

    if age >= 0 {
        Some(age)
    } else {
        None
    }
}

fn format_human_date(date: NaiveDate) -> String {
    date.format("%d %b %Y").to_string()
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn extract_codeable_text(value: &Value) -> Option<String> {
    if let Some(text) = value.get("text").and_then(Value::as_str) {
        if !text.trim().is_empty() {
            return Some(text.trim().to_string());
        }
    }

    if let Some(codings) = value.get("coding").and_then(Value::as_array) {
        for coding in codings {
            if let Some(display) = coding.get("display").and_then(Value::as_str) {
                if !display.trim().is_empty() {
                    return Some(display.trim().to_string());
                }
            }
            if let Some(code) = coding.get("code").and_then(Value::as_str) {
                if !code.trim().is_empty() {
                    return Some(code.trim().to_string());
                }
            }
        }
    }

    None
}

fn extract_status_code(value: Option<&Value>) -> Option<String> {
    let value = value?;
    if let Some(text) = extract_codeable_text(value) {
        return Some(text);
    }
    value.as_str().map(str::to_string)
}

fn resource_id(resource: &Value, fallback: &str) -> String {
    resource
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{fallback}-unknown"))
}

fn capitalize_first(input: &str) -> String {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn join_phrases(phrases: Vec<String>) -> Option<String> {
    if phrases.is_empty() {
        None
    } else {
        Some(phrases.join(" "))
    }
}

fn summarize_reactions(resource: &Value) -> Option<String> {
    let reactions = resource.get("reaction")?.as_array()?;
    let parts: Vec<String> = reactions
        .iter()
        .filter_map(|reaction| reaction.get("manifestation").and_then(Value::as_array))
        .flatten()
        .filter_map(extract_codeable_text)
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

fn summarize_dosage(resource: &Value) -> Option<Vec<String>> {
    let dosage = resource.get("dosage")?.as_array()?.first()?;
    let mut phrases = Vec::new();

    if let Some(text) = dosage.get("text").and_then(Value::as_str) {
        let cleaned = text.trim().trim_end_matches('.').to_string();
        if !cleaned.is_empty() {
            phrases.push(format!("{cleaned}."));
        }
    }

    if let Some(route) = dosage
        .get("route")
        .and_then(extract_codeable_text)
        .filter(|s| !s.is_empty())
    {
        phrases.push(format!("Administer via {route}."));
    }

    Some(phrases)
}

fn format_numeric(value: f64) -> String {
    if value.fract().abs() < f64::EPSILON {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

fn extract_date_display(resource: &Value, fields: &[&str]) -> Option<String> {
    extract_datetime(resource, fields).map(|dt| format_human_date(dt.date_naive()))
}

fn extract_datetime(resource: &Value, fields: &[&str]) -> Option<DateTime<Utc>> {
    for field in fields {
        let Some(value) = resource.get(*field) else {
            continue;
        };

        if let Some(text) = value.as_str() {
            if let Some(dt) = parse_datetime(text) {
                return Some(dt);
            }
        }

        if let Some(obj) = value.as_object() {
            if let Some(start) = obj.get("start").and_then(Value::as_str) {
                if let Some(dt) = parse_datetime(start) {
                    return Some(dt);
                }
            }
            if let Some(end) = obj.get("end").and_then(Value::as_str) {
                if let Some(dt) = parse_datetime(end) {
                    return Some(dt);
                }
            }
        }
    }
    None
}

/// RFC 3339 instants, or plain dates taken as midnight UTC.
fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            parse_date(value)
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

fn extract_observation_timestamp(resource: &Value) -> Option<DateTime<Utc>> {
    extract_datetime(
        resource,
        &[
            "effectiveDateTime",
            "effectiveInstant",
            "effectivePeriod",
            "issued",
        ],
    )
}

fn is_more_recent(candidate: Option<DateTime<Utc>>, current: Option<DateTime<Utc>>) -> bool {
    match (candidate, current) {
        (Some(a), Some(b)) => a > b,
        (Some(_), None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bundle(resources: Vec<Value>) -> Value {
        json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "entry": resources
                .into_iter()
                .map(|resource| json!({ "resource": resource }))
                .collect::<Vec<_>>(),
        })
    }

    #[test]
    fn extract_groups_by_resource_type() {
        let resources = extract_bundle_resources(&bundle(vec![
            json!({"resourceType": "Condition", "id": "c1"}),
            json!({"resourceType": "Provenance", "id": "p1"}),
            json!({"resourceType": "Condition", "id": "c2"}),
        ]))
        .unwrap();

        assert_eq!(resources.of_type("Condition").len(), 2);
        assert_eq!(resources.provenance().len(), 1);
        assert_eq!(resources.of_type("Consent").len(), 0);
        assert_eq!(resources.of_type("Condition")[1]["id"], "c2");
    }

    #[test]
    fn extract_rejects_non_bundle() {
        let err = extract_bundle_resources(&json!({"resourceType": "Patient"})).unwrap_err();
        assert!(matches!(err, PortalError::Parse(_)));

        let err = extract_bundle_resources(&json!({"entry": []})).unwrap_err();
        assert!(matches!(err, PortalError::MissingData(_)));
    }

    #[test]
    fn extract_rejects_entry_without_resource_type() {
        let err = extract_bundle_resources(&bundle(vec![json!({"id": "x"})])).unwrap_err();
        assert!(matches!(err, PortalError::Parse(_)));
    }

    #[test]
    fn bundle_without_entries_is_empty() {
        let resources =
            extract_bundle_resources(&json!({"resourceType": "Bundle", "total": 0})).unwrap();
        assert!(resources.is_empty());
    }

    #[test]
    fn formatter_keeps_one_row_per_record() {
        let records = vec![
            json!({"resourceType": "Condition", "id": "c1"}),
            json!({"resourceType": "Condition", "id": "c2", "code": {"text": "Asthma"}}),
        ];
        let card = prepare_conditions(&records, &[]);
        assert_eq!(card.len(), 2);
        assert_eq!(card.rows[0].title, "Unknown condition");
        assert_eq!(card.rows[1].title, "Asthma");
    }

    #[test]
    fn provenance_author_matches_versioned_target() {
        let records = vec![json!({
            "resourceType": "AllergyIntolerance",
            "id": "a1",
            "code": {"coding": [{"display": "Peanut"}]}
        })];
        let provenance = vec![json!({
            "resourceType": "Provenance",
            "target": [{"reference": "AllergyIntolerance/a1/_history/2"}],
            "agent": [{"who": {"reference": "Practitioner/9", "display": "Dr. Lee"}}]
        })];

        let card = prepare_allergies(&records, &provenance);
        assert_eq!(card.rows[0].recorded_by.as_deref(), Some("Dr. Lee"));
    }

    #[test]
    fn cancelled_appointments_are_excluded() {
        let resources = extract_bundle_resources(&bundle(vec![
            json!({"resourceType": "Appointment", "id": "a1", "status": "booked",
                   "start": "2026-10-18T10:00:00Z"}),
            json!({"resourceType": "Appointment", "id": "a2", "status": "cancelled",
                   "start": "2026-10-18T09:00:00Z"}),
            json!({"resourceType": "Appointment", "id": "a3", "status": "entered-in-error",
                   "start": "2026-10-18T11:00:00Z"}),
        ]))
        .unwrap();

        let appointments = prepare_appointments(&resources);
        let ids: Vec<&str> = appointments.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a1"]);
    }

    #[test]
    fn appointments_join_encounters_and_sort_by_start() {
        let resources = extract_bundle_resources(&bundle(vec![
            json!({"resourceType": "Appointment", "id": "late", "status": "booked",
                   "start": "2026-10-18T15:00:00Z"}),
            json!({"resourceType": "Appointment", "id": "unscheduled", "status": "proposed"}),
            json!({"resourceType": "Appointment", "id": "early", "status": "arrived",
                   "start": "2026-10-18T08:30:00Z",
                   "participant": [
                       {"actor": {"reference": "Patient/p1", "display": "Ann"}},
                       {"actor": {"reference": "Practitioner/d1", "display": "Dr. Moss"}}
                   ]}),
            json!({"resourceType": "Encounter", "id": "e1", "status": "in-progress",
                   "appointment": [{"reference": "Appointment/early"}]}),
        ]))
        .unwrap();

        let appointments = prepare_appointments(&resources);
        let ids: Vec<&str> = appointments.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late", "unscheduled"]);
        assert_eq!(appointments[0].encounter_id.as_deref(), Some("e1"));
        assert_eq!(appointments[0].encounter_status.as_deref(), Some("in-progress"));
        assert_eq!(appointments[0].practitioner.as_deref(), Some("Dr. Moss"));
        assert_eq!(appointments[1].encounter_id, None);
    }

    #[test]
    fn bmi_uses_most_recently_updated_observation() {
        let observations = vec![
            json!({"resourceType": "Observation", "meta": {"lastUpdated": "2024-01-01T00:00:00Z"},
                   "valueQuantity": {"value": 22.1}}),
            json!({"resourceType": "Observation", "meta": {"lastUpdated": "2025-06-01T00:00:00Z"},
                   "valueQuantity": {"value": 24.5}}),
            json!({"resourceType": "Observation", "meta": {"lastUpdated": "2023-03-01T00:00:00Z"},
                   "valueQuantity": {"value": 21.0}}),
        ];
        assert_eq!(latest_observation_value(&observations), Some(24.5));
        assert_eq!(latest_observation_value(&[]), None);
    }

    #[test]
    fn bmi_without_timestamps_takes_first_entry() {
        let observations = vec![
            json!({"valueQuantity": {"value": 30.0}}),
            json!({"valueQuantity": {"value": 31.0}}),
        ];
        assert_eq!(latest_observation_value(&observations), Some(30.0));
    }

    #[test]
    fn patient_details_layout() {
        let patient = json!({
            "resourceType": "Patient",
            "id": "p1",
            "birthDate": "1990-03-02",
            "gender": "female",
            "telecom": [
                {"system": "email", "value": "ann@example.org"},
                {"system": "phone", "value": "+1 555 0100"}
            ]
        });
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let details = patient_details(&patient, Some(24.5), today);

        let values: Vec<(&str, Option<&str>)> = details
            .iter()
            .map(|d| (d.title.as_str(), d.value.as_deref()))
            .collect();
        assert_eq!(
            values,
            vec![
                ("Birth date", Some("02 Mar 1990 • 35 y.o.")),
                ("Sex", Some("Female")),
                ("BMI", Some("24.5")),
                ("Phone number", Some("+1 555 0100")),
                ("SSN", None),
            ]
        );
    }

    #[test]
    fn patient_id_is_required() {
        assert_eq!(patient_id(&json!({"id": "p1"})).unwrap(), "p1");
        assert!(patient_id(&json!({"resourceType": "Patient"})).is_err());
    }

    #[test]
    fn series_sorted_by_effective_time() {
        let observations = vec![
            json!({"effectiveDateTime": "2026-02-01T08:00:00Z", "valueQuantity": {"value": 1.4}}),
            json!({"effectiveDateTime": "2026-01-01T08:00:00Z", "valueQuantity": {"value": 1.1}}),
            json!({"effectiveDateTime": "2026-01-15", "valueQuantity": {"value": 1.2}}),
        ];
        let series = observation_series(&observations);
        assert_eq!(series.total, 3);
        let values: Vec<Option<f64>> = series.points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![Some(1.1), Some(1.2), Some(1.4)]);
    }
}

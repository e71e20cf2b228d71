use chrono::{DateTime, SecondsFormat, Utc};

/// Ordered search parameters for one FHIR search interaction.
///
/// Repeated names are kept as separate pairs, the way FHIR expects
/// `_revinclude=A&_revinclude=B`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    params: Vec<(String, String)>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.push((name.to_string(), value.into()));
        self
    }

    pub fn patient(self, patient_id: &str) -> Self {
        self.param("patient", patient_id)
    }

    pub fn subject(self, patient_id: &str) -> Self {
        self.param("subject", format!("Patient/{patient_id}"))
    }

    pub fn actor(self, patient_id: &str) -> Self {
        self.param("actor", patient_id)
    }

    pub fn code(self, code: &str) -> Self {
        self.param("code", code)
    }

    pub fn status(self, status: &str) -> Self {
        self.param("status", status)
    }

    pub fn status_not(self, statuses: &[&str]) -> Self {
        self.param("status:not", statuses.join(","))
    }

    pub fn sort(self, key: &str) -> Self {
        self.param("_sort", key)
    }

    pub fn revinclude(self, directive: &str) -> Self {
        self.param("_revinclude", directive)
    }

    /// `date=ge<instant>`
    pub fn date_from(self, since: DateTime<Utc>) -> Self {
        self.param(
            "date",
            format!("ge{}", since.to_rfc3339_opts(SecondsFormat::Secs, true)),
        )
    }

    pub fn count(self, count: u32) -> Self {
        self.param("_count", count.to_string())
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// First value of a parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn builds_params_in_order() {
        let query = SearchQuery::new()
            .patient("p1")
            .sort("-_lastUpdated")
            .revinclude("Provenance:target");

        assert_eq!(query.get("patient"), Some("p1"));
        assert_eq!(query.get("_revinclude"), Some("Provenance:target"));
        assert_eq!(
            query.to_query_string(),
            "patient=p1&_sort=-_lastUpdated&_revinclude=Provenance%3Atarget"
        );
    }

    #[test]
    fn date_lower_bound_uses_utc_instant() {
        let since = Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap();
        let query = SearchQuery::new().date_from(since);
        assert_eq!(query.get("date"), Some("ge2026-10-18T00:00:00Z"));
    }

    #[test]
    fn status_not_joins_values() {
        let query = SearchQuery::new().status_not(&["entered-in-error", "cancelled"]);
        assert_eq!(query.get("status:not"), Some("entered-in-error,cancelled"));
    }
}

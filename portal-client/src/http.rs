use std::time::Duration;

use async_trait::async_trait;
use portal_core::PortalConfig;
use portal_fhir::{extract_bundle_resources, BundleResources};
use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::{Credentials, FhirError, ResourceStore, SearchQuery};

const FHIR_JSON: &str = "application/fhir+json";

/// FHIR REST store over HTTP.
///
/// Cloning is cheap and shares the connection pool; each clone carries its
/// own credentials.
#[derive(Debug, Clone)]
pub struct HttpFhirStore {
    http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
    page_limit: u32,
}

impl HttpFhirStore {
    pub fn new(base_url: &str, config: &PortalConfig) -> Result<Self, FhirError> {
        let base_url = parse_base_url(base_url)?;
        debug!(%base_url, "creating FHIR store");

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.request_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url,
            credentials: Credentials::None,
            page_limit: config.page_limit,
        })
    }

    /// A handle on the same client that sends `credentials` with every request.
    pub fn with_credentials(&self, credentials: Credentials) -> Self {
        Self {
            credentials,
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn search_url(&self, resource_type: &str, query: &SearchQuery) -> Result<Url, FhirError> {
        let mut url = self.join(resource_type)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.params().iter());
        }
        Ok(url)
    }

    pub fn resource_url(&self, resource_type: &str, id: &str) -> Result<Url, FhirError> {
        self.join(&format!("{resource_type}/{id}"))
    }

    /// Resolve a paging link; credentials never leave the base URL's origin.
    fn follow(&self, link: &str) -> Result<Url, FhirError> {
        let url = self.join(link)?;
        if url.origin() != self.base_url.origin() {
            warn!(%url, base_url = %self.base_url, "next link points at another origin");
            return Err(FhirError::InvalidUrl(format!(
                "next link {url} is outside {}",
                self.base_url
            )));
        }
        Ok(url)
    }

    fn join(&self, path: &str) -> Result<Url, FhirError> {
        self.base_url
            .join(path)
            .map_err(|err| FhirError::InvalidUrl(format!("{path}: {err}")))
    }

    async fn get_json(&self, url: Url) -> Result<Value, FhirError> {
        debug!(%url, "GET");
        let request = self.http.get(url.clone()).header(ACCEPT, FHIR_JSON);
        let request = match &self.credentials {
            Credentials::None => request,
            Credentials::Bearer(token) => request.bearer_auth(token),
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        };

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            let body = response.bytes().await?;
            return Ok(serde_json::from_slice(&body)?);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(%url, status = status.as_u16(), "FHIR request rejected");
        Err(FhirError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ResourceStore for HttpFhirStore {
    async fn search(
        &self,
        resource_type: &str,
        query: &SearchQuery,
    ) -> Result<BundleResources, FhirError> {
        let url = self.search_url(resource_type, query)?;
        let bundle = self.get_json(url).await?;
        Ok(extract_bundle_resources(&bundle)?)
    }

    async fn search_all(
        &self,
        resource_type: &str,
        query: &SearchQuery,
    ) -> Result<BundleResources, FhirError> {
        let mut url = self.search_url(resource_type, query)?;
        let mut resources = BundleResources::default();

        for page in 1..=self.page_limit {
            let bundle = self.get_json(url).await?;
            resources.extend(extract_bundle_resources(&bundle)?);

            let Some(next) = next_link(&bundle) else {
                debug!(resource_type, pages = page, "search complete");
                return Ok(resources);
            };
            url = self.follow(next)?;
        }

        warn!(resource_type, limit = self.page_limit, "page limit reached");
        Err(FhirError::PageLimit(self.page_limit))
    }

    async fn read(&self, resource_type: &str, id: &str) -> Result<Value, FhirError> {
        let url = self.resource_url(resource_type, id)?;
        self.get_json(url).await
    }
}

fn parse_base_url(raw: &str) -> Result<Url, FhirError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|err| FhirError::InvalidUrl(format!("'{raw}': {err}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(FhirError::InvalidUrl(format!(
            "URL must use http or https scheme, got: {}",
            url.scheme()
        )));
    }

    // `Url::join` replaces the last segment unless the path ends with '/'.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// `link[relation=next].url` of a searchset bundle.
fn next_link(bundle: &Value) -> Option<&str> {
    bundle
        .get("link")
        .and_then(Value::as_array)?
        .iter()
        .find(|link| link.get("relation").and_then(Value::as_str) == Some("next"))
        .and_then(|link| link.get("url"))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(base: &str) -> HttpFhirStore {
        HttpFhirStore::new(base, &PortalConfig::default()).unwrap()
    }

    #[test]
    fn search_url_keeps_base_path() {
        let store = store("https://fhir.example.org/fhir");
        let query = SearchQuery::new().patient("p1").status("active");
        let url = store.search_url("Consent", &query).unwrap();
        assert_eq!(
            url.as_str(),
            "https://fhir.example.org/fhir/Consent?patient=p1&status=active"
        );
    }

    #[test]
    fn resource_url() {
        let store = store("http://localhost:8080/fhir/");
        let url = store.resource_url("Patient", "p1").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/fhir/Patient/p1");
    }

    #[test]
    fn rejects_non_http_scheme() {
        let err = HttpFhirStore::new("ftp://fhir.example.org", &PortalConfig::default())
            .unwrap_err();
        assert!(matches!(err, FhirError::InvalidUrl(_)));
    }

    #[test]
    fn credentials_are_scoped_to_the_handle() {
        let anonymous = store("https://fhir.example.org/fhir");
        let signed_in = anonymous.with_credentials(Credentials::Bearer("abc".into()));

        assert_eq!(anonymous.credentials(), &Credentials::None);
        assert_eq!(signed_in.credentials(), &Credentials::Bearer("abc".into()));
        assert_eq!(anonymous.base_url(), signed_in.base_url());
    }

    #[test]
    fn paging_stays_on_base_origin() {
        let store = store("https://fhir.example.org/fhir/");

        let relative = store.follow("Appointment?page=2").unwrap();
        assert_eq!(
            relative.as_str(),
            "https://fhir.example.org/fhir/Appointment?page=2"
        );
        assert!(store
            .follow("https://fhir.example.org/fhir/Appointment?page=3")
            .is_ok());

        for link in [
            "https://attacker.example.net/fhir/Appointment?page=2",
            "http://fhir.example.org/fhir/Appointment?page=2",
            "https://fhir.example.org:8443/fhir/Appointment?page=2",
        ] {
            assert!(
                matches!(store.follow(link), Err(FhirError::InvalidUrl(_))),
                "{link}"
            );
        }
    }

    #[test]
    fn finds_next_link() {
        let bundle = json!({
            "resourceType": "Bundle",
            "link": [
                {"relation": "self", "url": "https://fhir.example.org/fhir/Appointment?page=1"},
                {"relation": "next", "url": "https://fhir.example.org/fhir/Appointment?page=2"}
            ]
        });
        assert_eq!(
            next_link(&bundle),
            Some("https://fhir.example.org/fhir/Appointment?page=2")
        );
        assert_eq!(next_link(&json!({"resourceType": "Bundle"})), None);
    }
}

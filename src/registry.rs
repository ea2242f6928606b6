use std::env;
use std::fs;

use directories::BaseDirs;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::RegistryConfig;
use crate::domain::ResourceId;
use crate::error::CatalogError;
use crate::payload::{
    ALTERNATE_ID_TYPE, DoiAttributes, DoiDocument, RelatedIdentifier, RelationAttributes,
};

pub const USER_ENV: &str = "REGISTRY_USER";
pub const PASSWORD_ENV: &str = "REGISTRY_PASSWORD";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryDates {
    pub created: Option<String>,
    pub updated: Option<String>,
    pub publication_year: Option<String>,
}

pub trait RegistryClient: Send + Sync {
    fn check_available(&self) -> Result<(), CatalogError>;
    fn find_by_alternate_id(&self, id: &ResourceId) -> Result<Option<String>, CatalogError>;
    fn fetch_dates(&self, doi: &str) -> Result<RegistryDates, CatalogError>;
    fn create(&self, attributes: &DoiAttributes) -> Result<String, CatalogError>;
    fn update(&self, doi: &str, attributes: &DoiAttributes) -> Result<(), CatalogError>;
    /// Replaces the whole related-identifier list of `doi`.
    fn replace_related(
        &self,
        doi: &str,
        related: &[RelatedIdentifier],
    ) -> Result<(), CatalogError>;
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

impl Credentials {
    pub fn resolve(machine: &str) -> Result<Self, CatalogError> {
        if let (Ok(user), Ok(password)) = (env::var(USER_ENV), env::var(PASSWORD_ENV)) {
            if !user.trim().is_empty() {
                return Ok(Self { user, password });
            }
        }

        let netrc = BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".netrc"))
            .ok_or_else(|| CatalogError::MissingCredentials(machine.to_string()))?;
        let content = fs::read_to_string(&netrc)
            .map_err(|_| CatalogError::MissingCredentials(machine.to_string()))?;
        parse_netrc(&content, machine)
            .ok_or_else(|| CatalogError::MissingCredentials(machine.to_string()))
    }
}

pub fn parse_netrc(content: &str, machine: &str) -> Option<Credentials> {
    let mut tokens = content.split_whitespace();
    let mut in_entry = false;
    let mut login = None;
    let mut password = None;
    let mut fallback = None;

    while let Some(token) = tokens.next() {
        match token {
            "machine" => {
                if in_entry {
                    break;
                }
                in_entry = tokens.next() == Some(machine);
            }
            "default" => {
                if in_entry {
                    break;
                }
                fallback = Some((None::<String>, None::<String>));
            }
            "login" | "password" => {
                let value = tokens.next().map(str::to_string);
                if in_entry {
                    if token == "login" {
                        login = value;
                    } else {
                        password = value;
                    }
                } else if let Some(entry) = fallback.as_mut() {
                    if token == "login" {
                        entry.0 = value;
                    } else {
                        entry.1 = value;
                    }
                }
            }
            _ => {}
        }
    }

    match (login, password) {
        (Some(user), Some(password)) if in_entry => Some(Credentials { user, password }),
        _ => match fallback {
            Some((Some(user), Some(password))) => Some(Credentials { user, password }),
            _ => None,
        },
    }
}

#[derive(Clone)]
pub struct DataCiteClient {
    client: Client,
    api_url: String,
    client_id: String,
    credentials: Option<Credentials>,
}

impl DataCiteClient {
    pub fn new(
        config: &RegistryConfig,
        credentials: Option<Credentials>,
    ) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("rescat/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CatalogError::RegistryHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(|err| CatalogError::RegistryHttp(err.to_string()))?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            credentials,
        })
    }

    fn doi_url(&self, doi: &str) -> String {
        format!("{}/{doi}", self.api_url)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, CatalogError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| CatalogError::MissingCredentials(self.api_url.clone()))?;
        Ok(request.basic_auth(&credentials.user, Some(&credentials.password)))
    }

    fn put_document<A: Serialize>(
        &self,
        doi: &str,
        document: &DoiDocument<A>,
    ) -> Result<(), CatalogError> {
        let url = self.doi_url(doi);
        let response = Self::send(self.authorized(self.client.put(&url).json(document))?)?;
        Self::handle_status(response).map(|_| ())
    }

    fn handle_status(response: Response) -> Result<Response, CatalogError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "registry request failed".to_string());
        Err(CatalogError::RegistryStatus { status, message })
    }

    fn send(request: RequestBuilder) -> Result<Response, CatalogError> {
        request.send().map_err(|err| {
            if err.is_connect() || err.is_timeout() {
                CatalogError::RegistryUnavailable(err.to_string())
            } else {
                CatalogError::RegistryHttp(err.to_string())
            }
        })
    }
}

impl RegistryClient for DataCiteClient {
    fn check_available(&self) -> Result<(), CatalogError> {
        let response = Self::send(
            self.client
                .get(&self.api_url)
                .query(&[("client-id", self.client_id.as_str()), ("page[size]", "1")]),
        )?;
        if response.status().is_server_error() {
            return Err(CatalogError::RegistryUnavailable(format!(
                "status {}",
                response.status().as_u16()
            )));
        }
        Self::handle_status(response).map(|_| ())
    }

    fn find_by_alternate_id(&self, id: &ResourceId) -> Result<Option<String>, CatalogError> {
        let query = format!(
            "identifiers.identifier:{id} AND identifiers.identifierType:{ALTERNATE_ID_TYPE}"
        );
        let response = Self::send(self.client.get(&self.api_url).query(&[
            ("client-id", self.client_id.as_str()),
            ("query", query.as_str()),
            ("detail", "true"),
        ]))?;
        let body: Value = Self::handle_status(response)?
            .json()
            .map_err(|err| CatalogError::RegistryResponse(err.to_string()))?;
        let found = first_id(&body);
        if body
            .get("data")
            .and_then(Value::as_array)
            .is_some_and(|items| items.len() > 1)
        {
            warn!(resource = %id, "registry returned several identifiers, using the first");
        }
        debug!(resource = %id, found = ?found, "alternate id lookup");
        Ok(found)
    }

    fn fetch_dates(&self, doi: &str) -> Result<RegistryDates, CatalogError> {
        let url = self.doi_url(doi);
        let response = Self::send(self.client.get(&url))?;
        let body: Value = Self::handle_status(response)?
            .json()
            .map_err(|err| CatalogError::RegistryResponse(err.to_string()))?;
        Ok(dates_from_body(&body))
    }

    fn create(&self, attributes: &DoiAttributes) -> Result<String, CatalogError> {
        let document = DoiDocument::new(attributes);
        let request = self.authorized(self.client.post(&self.api_url).json(&document))?;
        let response = Self::send(request)?;
        let response = Self::handle_status(response)?;
        if response.status().as_u16() != 201 {
            return Err(CatalogError::RegistryResponse(format!(
                "expected 201 Created, got {}",
                response.status().as_u16()
            )));
        }
        let body: Value = response
            .json()
            .map_err(|err| CatalogError::RegistryResponse(err.to_string()))?;
        first_id(&body).ok_or_else(|| {
            CatalogError::RegistryResponse("create response carries no identifier".to_string())
        })
    }

    fn update(&self, doi: &str, attributes: &DoiAttributes) -> Result<(), CatalogError> {
        self.put_document(doi, &DoiDocument::new(attributes))
    }

    fn replace_related(
        &self,
        doi: &str,
        related: &[RelatedIdentifier],
    ) -> Result<(), CatalogError> {
        let attributes = RelationAttributes {
            related_identifiers: related.to_vec(),
        };
        self.put_document(doi, &DoiDocument::new(attributes))
    }
}

pub fn first_id(body: &Value) -> Option<String> {
    let data = body.get("data")?;
    let item = match data {
        Value::Array(items) => items.first()?,
        other => other,
    };
    item.get("id")?.as_str().map(str::to_string)
}

pub fn dates_from_body(body: &Value) -> RegistryDates {
    let Some(attributes) = body.get("data").and_then(|data| data.get("attributes")) else {
        return RegistryDates::default();
    };
    let publication_year = match attributes.get("publicationYear") {
        Some(Value::Number(year)) => Some(year.to_string()),
        Some(Value::String(year)) if !year.is_empty() => Some(year.clone()),
        _ => None,
    };
    let mut dates = RegistryDates {
        publication_year,
        ..RegistryDates::default()
    };
    for entry in attributes
        .get("dates")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let Some(date) = entry.get("date").and_then(Value::as_str) else {
            continue;
        };
        match entry.get("dateType").and_then(Value::as_str) {
            Some("Created") => dates.created = Some(date.to_string()),
            Some("Updated") => dates.updated = Some(date.to_string()),
            _ => {}
        }
    }
    dates
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn netrc_machine_entry() {
        let content = "machine other.org login a password b\n\
                       machine datacite.org\n  login SND.SPRKB\n  password secret\n\
                       default login anon password none\n";
        let credentials = parse_netrc(content, "datacite.org").unwrap();
        assert_eq!(credentials.user, "SND.SPRKB");
        assert_eq!(credentials.password, "secret");
        assert!(parse_netrc("machine other.org login a password b", "datacite.org").is_none());
    }

    #[test]
    fn identifier_from_object_or_list() {
        assert_eq!(
            first_id(&json!({"data": {"id": "10.1/abc"}})).as_deref(),
            Some("10.1/abc")
        );
        assert_eq!(
            first_id(&json!({"data": [{"id": "10.1/x"}, {"id": "10.1/y"}]})).as_deref(),
            Some("10.1/x")
        );
        assert_eq!(first_id(&json!({"data": []})), None);
    }

    #[test]
    fn registry_dates() {
        let body = json!({"data": {"attributes": {
            "publicationYear": 2021,
            "dates": [
                {"date": "2021-03-01", "dateType": "Created"},
                {"date": "2022-01-01", "dateType": "Updated"}
            ]
        }}});
        let dates = dates_from_body(&body);
        assert_eq!(dates.publication_year.as_deref(), Some("2021"));
        assert_eq!(dates.created.as_deref(), Some("2021-03-01"));
        assert_eq!(dates.updated.as_deref(), Some("2022-01-01"));
    }
}

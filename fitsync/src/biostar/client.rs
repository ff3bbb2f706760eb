//! Blocking HTTP client for the BioStar 2 REST API

use super::payload::{self, FaceEncoder};
use super::{Credentials, DirectoryService, RemoteError, RemoteUser, Session, UserOutcome};
use crate::mapper::CanonicalClient;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use fitsync_common::config::{FaceEncodingKind, RemoteConfig};
use reqwest::blocking::{Client, Response};
use reqwest::header::HeaderName;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// User group as listed by `GET /user_groups`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGroup {
    pub id: u32,
    pub name: String,
}

/// BioStar 2 API client
pub struct BioStarClient {
    http_client: Client,
    base_url: String,
    session_header: HeaderName,
    config: RemoteConfig,
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    RemoteError::Transport(e.to_string())
}

/// Parse a response body; an empty body reads as `null`
fn parse_body(text: &str) -> Result<Value, RemoteError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text)
        .map_err(|e| RemoteError::Protocol(format!("Response is not valid JSON: {}", e)))
}

/// Group ids come back as strings on some BioStar versions
fn parse_group_id(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl BioStarClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let session_header = HeaderName::from_bytes(config.session_header.as_bytes())
            .map_err(|e| {
                RemoteError::InvalidConfig(format!(
                    "Invalid session header {:?}: {}",
                    config.session_header, e
                ))
            })?;

        let mut builder = Client::builder().danger_accept_invalid_certs(!config.ssl_verify);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http_client = builder
            .build()
            .map_err(|e| RemoteError::InvalidConfig(format!("HTTP client: {}", e)))?;

        if !config.ssl_verify {
            warn!("TLS certificate verification is disabled for the BioStar server");
        }

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session_header,
            config: config.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send an authenticated request and return the parsed body
    ///
    /// HTTP >= 400 and non-success `Response.code` values both surface as
    /// [`RemoteError::RemoteApi`] carrying the raw body.
    fn send(
        &self,
        session: &Session,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, RemoteError> {
        let token = session.token()?;
        debug!(method = method.as_str(), path, "BioStar request");

        let mut request = self
            .http_client
            .request(method, self.url(path))
            .header(self.session_header.clone(), token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().map_err(transport_error)?;
        Self::read_response(response)
    }

    fn read_response(response: Response) -> Result<Value, RemoteError> {
        let status = response.status().as_u16();
        let text = response.text().map_err(transport_error)?;

        if status >= 400 {
            return Err(RemoteError::RemoteApi { status, body: text });
        }

        let value = parse_body(&text)?;
        if !payload::is_success_body(&value) {
            return Err(RemoteError::RemoteApi { status, body: text });
        }
        Ok(value)
    }

    fn is_already_exists(&self, error: &RemoteError) -> bool {
        let RemoteError::RemoteApi { body, .. } = error else {
            return false;
        };
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| payload::response_code(&v))
            .map_or(false, |code| code == self.config.already_exists_code)
    }

    fn user_builder(&self, client: &CanonicalClient) -> payload::UserPayloadBuilder {
        payload::configured_user(
            &self.config,
            &client.numeric_id,
            &client.name,
            &client.email,
            &client.phone,
            &client.department,
        )
    }

    /// List the user groups defined on the server
    pub fn list_user_groups(&self, session: &Session) -> Result<Vec<UserGroup>, RemoteError> {
        let body = self.send(session, Method::GET, "/user_groups", None)?;

        let rows = body
            .get("UserGroupCollection")
            .and_then(|c| c.get("rows"))
            .and_then(Value::as_array)
            .ok_or_else(|| {
                RemoteError::Protocol("Missing UserGroupCollection.rows in response".to_string())
            })?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let id = parse_group_id(row.get("id")?)?;
                let name = row
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Some(UserGroup { id, name })
            })
            .collect())
    }
}

impl DirectoryService for BioStarClient {
    fn authenticate(&self, credentials: &Credentials) -> Result<Session, RemoteError> {
        info!(login_id = %credentials.login_id, "Authenticating with BioStar...");

        let response = self
            .http_client
            .post(self.url("/login"))
            .json(&payload::login_body(
                &credentials.login_id,
                &credentials.password,
            ))
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        let token = response
            .headers()
            .get(&self.session_header)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().map_err(transport_error)?;

        if status.as_u16() >= 400 {
            return Err(RemoteError::RemoteApi {
                status: status.as_u16(),
                body: text,
            });
        }
        parse_body(&text)?;

        match token {
            Some(token) if !token.is_empty() => {
                info!("Authenticated with BioStar");
                Ok(Session::new(token))
            }
            _ => Err(RemoteError::AuthenticationFailed(format!(
                "No {} header in login response",
                self.session_header
            ))),
        }
    }

    fn create_or_update_user(
        &self,
        session: &Session,
        client: &CanonicalClient,
    ) -> Result<RemoteUser, RemoteError> {
        let create = serde_json::to_value(self.user_builder(client).build())
            .map_err(|e| RemoteError::Protocol(e.to_string()))?;

        let outcome = match self.send(session, Method::POST, "/users", Some(&create)) {
            Ok(_) => {
                info!(user_id = %client.numeric_id, name = %client.name, "User created");
                UserOutcome::Created
            }
            Err(e) if self.is_already_exists(&e) => {
                info!(user_id = %client.numeric_id, "User already exists, updating");
                let update = serde_json::to_value(self.user_builder(client).for_update().build())
                    .map_err(|e| RemoteError::Protocol(e.to_string()))?;
                let path = format!("/users/{}", client.numeric_id);
                self.send(session, Method::PUT, &path, Some(&update))?;
                info!(user_id = %client.numeric_id, name = %client.name, "User updated");
                UserOutcome::Updated
            }
            Err(e) => return Err(e),
        };

        Ok(RemoteUser {
            remote_id: client.numeric_id.clone(),
            name: client.name.clone(),
            group_id: self.config.user_group_id,
            disabled: false,
            start_datetime: self.config.start_datetime.clone(),
            expiry_datetime: self.config.expiry_datetime.clone(),
            outcome,
        })
    }

    fn attach_face(
        &self,
        session: &Session,
        remote_id: &str,
        photo: &[u8],
    ) -> Result<FaceEncodingKind, RemoteError> {
        session.token()?;
        let encoded = STANDARD.encode(photo);
        let mut last_error = None;

        for kind in &self.config.face_encodings {
            let request = kind.request(remote_id, &encoded);
            match self.send(session, request.method, &request.path, Some(&request.body)) {
                Ok(_) => {
                    info!(user_id = remote_id, encoding = kind.name(), "Face attached");
                    return Ok(*kind);
                }
                Err(RemoteError::AuthRequired) => return Err(RemoteError::AuthRequired),
                Err(e) => {
                    debug!(user_id = remote_id, encoding = kind.name(), "Face encoding rejected: {}", e);
                    last_error = Some(e);
                }
            }
        }

        let error = last_error.unwrap_or_else(|| {
            RemoteError::InvalidConfig("No face encodings configured".to_string())
        });
        warn!(user_id = remote_id, "Failed to attach face: {}", error);
        Err(error)
    }

    fn logout(&self, session: &mut Session) {
        let Ok(token) = session.token() else {
            return;
        };

        let result = self
            .http_client
            .post(self.url("/logout"))
            .header(self.session_header.clone(), token)
            .send();
        match result {
            Ok(response) if response.status().is_success() => info!("Logged out from BioStar"),
            Ok(response) => warn!(status = response.status().as_u16(), "BioStar logout rejected"),
            Err(e) => warn!("BioStar logout failed: {}", e),
        }

        session.invalidate();
    }
}

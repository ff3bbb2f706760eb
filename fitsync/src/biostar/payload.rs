//! Request bodies for the BioStar 2 API
//!
//! BioStar wraps every entity in a named envelope (`{"User": {...}}`).
//! Optional user fields are omitted entirely rather than sent empty; the
//! API rejects empty strings for email and phone.

use fitsync_common::config::{FaceEncodingKind, RemoteConfig};
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};

/// `Response.code` BioStar uses for success
pub const SUCCESS_CODE: &str = "0";

/// `{"User": {"login_id": ..., "password": ...}}`
pub fn login_body(login_id: &str, password: &str) -> Value {
    json!({
        "User": {
            "login_id": login_id,
            "password": password,
        }
    })
}

/// Group reference, serialized as `{"id": n}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GroupRef {
    pub id: u32,
}

/// Body of `POST /users` and `PUT /users/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserPayload {
    #[serde(rename = "User")]
    pub user: UserFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserFields {
    /// Omitted on update: the id is in the URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub name: String,
    pub disabled: bool,
    pub start_datetime: String,
    pub expiry_datetime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_group_id: Option<GroupRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub access_groups: Vec<GroupRef>,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Builder for [`UserPayload`]
///
/// Inclusion rules: text fields only when non-blank, the user group only
/// when configured, access groups only when the list is non-empty.
#[derive(Debug, Clone)]
pub struct UserPayloadBuilder {
    fields: UserFields,
}

impl UserPayload {
    pub fn builder(user_id: &str, name: &str) -> UserPayloadBuilder {
        UserPayloadBuilder {
            fields: UserFields {
                user_id: Some(user_id.to_string()),
                name: name.to_string(),
                disabled: false,
                start_datetime: String::new(),
                expiry_datetime: String::new(),
                email: None,
                phone: None,
                department: None,
                user_group_id: None,
                access_groups: Vec::new(),
            },
        }
    }
}

impl UserPayloadBuilder {
    pub fn validity(mut self, start: &str, expiry: &str) -> Self {
        self.fields.start_datetime = start.to_string();
        self.fields.expiry_datetime = expiry.to_string();
        self
    }

    pub fn email(mut self, email: &str) -> Self {
        self.fields.email = non_empty(email);
        self
    }

    pub fn phone(mut self, phone: &str) -> Self {
        self.fields.phone = non_empty(phone);
        self
    }

    pub fn department(mut self, department: &str) -> Self {
        self.fields.department = non_empty(department);
        self
    }

    pub fn user_group(mut self, group_id: Option<u32>) -> Self {
        self.fields.user_group_id = group_id.map(|id| GroupRef { id });
        self
    }

    pub fn access_groups(mut self, ids: &[u32]) -> Self {
        self.fields.access_groups = ids.iter().map(|&id| GroupRef { id }).collect();
        self
    }

    /// Drop `user_id` for `PUT /users/{id}`
    pub fn for_update(mut self) -> Self {
        self.fields.user_id = None;
        self
    }

    pub fn build(self) -> UserPayload {
        UserPayload { user: self.fields }
    }
}

/// Builder pre-filled with the configured validity window and groups
pub fn configured_user(
    config: &RemoteConfig,
    user_id: &str,
    name: &str,
    email: &str,
    phone: &str,
    department: &str,
) -> UserPayloadBuilder {
    let builder = UserPayload::builder(user_id, name)
        .validity(&config.start_datetime, &config.expiry_datetime)
        .email(email)
        .phone(phone)
        .user_group(config.user_group_id)
        .access_groups(&config.access_groups);

    if config.send_department {
        builder.department(department)
    } else {
        builder
    }
}

/// One face upload attempt
#[derive(Debug, Clone, PartialEq)]
pub struct FaceRequest {
    pub method: Method,
    pub path: String,
    pub body: Value,
}

/// A face credential payload convention
pub trait FaceEncoder {
    fn name(&self) -> &'static str;

    /// Request carrying `image_base64` for user `remote_id`
    fn request(&self, remote_id: &str, image_base64: &str) -> FaceRequest;
}

impl FaceEncoder for FaceEncodingKind {
    fn name(&self) -> &'static str {
        match self {
            FaceEncodingKind::VisualFace => "visual_face",
            FaceEncodingKind::RawFace => "raw_face",
            FaceEncodingKind::FaceEndpoint => "face_endpoint",
        }
    }

    fn request(&self, remote_id: &str, image_base64: &str) -> FaceRequest {
        match self {
            // FaceStation F2 / BioStation 3
            FaceEncodingKind::VisualFace => FaceRequest {
                method: Method::PUT,
                path: format!("/users/{}", remote_id),
                body: json!({
                    "User": {
                        "credentials": {
                            "visualFaces": [
                                { "template_ex_picture": image_base64 }
                            ]
                        }
                    }
                }),
            },
            FaceEncodingKind::RawFace => FaceRequest {
                method: Method::PUT,
                path: format!("/users/{}", remote_id),
                body: json!({
                    "User": {
                        "credentials": {
                            "faces": [
                                { "raw_image": image_base64, "index": 0 }
                            ]
                        }
                    }
                }),
            },
            FaceEncodingKind::FaceEndpoint => FaceRequest {
                method: Method::POST,
                path: format!("/users/{}/credentials/faces", remote_id),
                body: json!({
                    "FaceCredential": { "raw_image": image_base64 }
                }),
            },
        }
    }
}

/// `Response.code` of a BioStar body, as a string
pub fn response_code(body: &Value) -> Option<String> {
    match body.get("Response")?.get("code")? {
        Value::String(code) => Some(code.trim().to_string()),
        Value::Number(code) => Some(code.to_string()),
        _ => None,
    }
}

/// True when the body carries no code or the success code
pub fn is_success_body(body: &Value) -> bool {
    response_code(body).map_or(true, |code| code == SUCCESS_CODE)
}

//! BioStar client tests against a mock HTTP server

use fitsync::biostar::{
    BioStarClient, Credentials, DirectoryService, RemoteError, Session, UserOutcome,
};
use fitsync::mapper::CanonicalClient;
use fitsync_common::config::{FaceEncodingKind, RemoteConfig};
use httpmock::prelude::*;
use serde_json::json;

const SESSION_ID: &str = "9f1c2e7a0b";

fn remote_config(server: &MockServer) -> RemoteConfig {
    RemoteConfig {
        base_url: server.base_url(),
        login_id: "admin".to_string(),
        password: "admin123".to_string(),
        ..RemoteConfig::default()
    }
}

fn credentials() -> Credentials {
    Credentials {
        login_id: "admin".to_string(),
        password: "admin123".to_string(),
    }
}

fn client_440() -> CanonicalClient {
    CanonicalClient {
        numeric_id: "440".to_string(),
        name: "Aziz Benbouhagga".to_string(),
        department: "Golden Gym".to_string(),
        email: "".to_string(),
        phone: "0600000000".to_string(),
    }
}

#[test]
fn test_authenticate_reads_session_header() {
    let server = MockServer::start();
    let login = server.mock(|when, then| {
        when.method(POST)
            .path("/login")
            .json_body(json!({"User": {"login_id": "admin", "password": "admin123"}}));
        then.status(200)
            .header("bs-session-id", SESSION_ID)
            .json_body(json!({"User": {"user_id": "1", "name": "Administrator"}}));
    });

    let client = BioStarClient::new(&remote_config(&server)).unwrap();
    let session = client.authenticate(&credentials()).unwrap();

    login.assert();
    assert_eq!(session.token().unwrap(), SESSION_ID);
}

#[test]
fn test_authenticate_rejected() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/login");
        then.status(401)
            .json_body(json!({"Response": {"code": "10"}}));
    });

    let client = BioStarClient::new(&remote_config(&server)).unwrap();
    let err = client.authenticate(&credentials()).unwrap_err();
    match err {
        RemoteError::RemoteApi { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("\"code\":\"10\""));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_authenticate_without_session_header_fails() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/login");
        then.status(200).json_body(json!({"User": {}}));
    });

    let client = BioStarClient::new(&remote_config(&server)).unwrap();
    let err = client.authenticate(&credentials()).unwrap_err();
    assert!(matches!(err, RemoteError::AuthenticationFailed(_)));
}

#[test]
fn test_authenticate_unreachable_server_is_transport_error() {
    let config = RemoteConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        login_id: "admin".to_string(),
        ..RemoteConfig::default()
    };

    let client = BioStarClient::new(&config).unwrap();
    let err = client.authenticate(&credentials()).unwrap_err();
    assert!(matches!(err, RemoteError::Transport(_)));
}

#[test]
fn test_create_user_sends_session_and_payload() {
    let server = MockServer::start();
    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/users")
            .header("bs-session-id", SESSION_ID)
            .json_body(json!({
                "User": {
                    "user_id": "440",
                    "name": "Aziz Benbouhagga",
                    "disabled": false,
                    "start_datetime": "2001-01-01T00:00:00.00Z",
                    "expiry_datetime": "2030-12-31T23:59:00.00Z",
                    "phone": "0600000000"
                }
            }));
        then.status(200)
            .json_body(json!({"UserCollection": {"rows": [{"user_id": "440"}]}}));
    });

    let client = BioStarClient::new(&remote_config(&server)).unwrap();
    let user = client
        .create_or_update_user(&Session::new(SESSION_ID), &client_440())
        .unwrap();

    create.assert();
    assert_eq!(user.remote_id, "440");
    assert_eq!(user.outcome, UserOutcome::Created);
    assert!(!user.disabled);
}

#[test]
fn test_existing_user_falls_back_to_update() {
    let server = MockServer::start();
    let create = server.mock(|when, then| {
        when.method(POST).path("/users");
        then.status(200)
            .json_body(json!({"Response": {"code": "202", "message": "User ID already exists"}}));
    });
    let update = server.mock(|when, then| {
        when.method(PUT).path("/users/440").json_body(json!({
            "User": {
                "name": "Aziz Benbouhagga",
                "disabled": false,
                "start_datetime": "2001-01-01T00:00:00.00Z",
                "expiry_datetime": "2030-12-31T23:59:00.00Z",
                "phone": "0600000000"
            }
        }));
        then.status(200).json_body(json!({"Response": {"code": "0"}}));
    });

    let client = BioStarClient::new(&remote_config(&server)).unwrap();
    let user = client
        .create_or_update_user(&Session::new(SESSION_ID), &client_440())
        .unwrap();

    create.assert();
    update.assert();
    assert_eq!(user.outcome, UserOutcome::Updated);
}

#[test]
fn test_existing_user_reported_as_http_error_also_updates() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/users");
        then.status(400)
            .json_body(json!({"Response": {"code": "202"}}));
    });
    let update = server.mock(|when, then| {
        when.method(PUT).path("/users/440");
        then.status(200).json_body(json!({"Response": {"code": "0"}}));
    });

    let client = BioStarClient::new(&remote_config(&server)).unwrap();
    let user = client
        .create_or_update_user(&Session::new(SESSION_ID), &client_440())
        .unwrap();

    update.assert();
    assert_eq!(user.outcome, UserOutcome::Updated);
}

#[test]
fn test_create_user_server_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/users");
        then.status(500).body("Internal Server Error");
    });

    let client = BioStarClient::new(&remote_config(&server)).unwrap();
    let err = client
        .create_or_update_user(&Session::new(SESSION_ID), &client_440())
        .unwrap_err();

    match err {
        RemoteError::RemoteApi { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "Internal Server Error");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_create_user_non_json_body_is_protocol_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/users");
        then.status(200).body("<html>proxy login</html>");
    });

    let client = BioStarClient::new(&remote_config(&server)).unwrap();
    let err = client
        .create_or_update_user(&Session::new(SESSION_ID), &client_440())
        .unwrap_err();
    assert!(matches!(err, RemoteError::Protocol(_)));
}

#[test]
fn test_attach_face_falls_back_through_encodings() {
    let server = MockServer::start();
    let put = server.mock(|when, then| {
        when.method(PUT).path("/users/440");
        then.status(400)
            .json_body(json!({"Response": {"code": "1003", "message": "Invalid credential"}}));
    });
    let post = server.mock(|when, then| {
        when.method(POST)
            .path("/users/440/credentials/faces")
            .json_body(json!({"FaceCredential": {"raw_image": "AQID"}}));
        then.status(200).json_body(json!({"Response": {"code": "0"}}));
    });

    let client = BioStarClient::new(&remote_config(&server)).unwrap();
    let kind = client
        .attach_face(&Session::new(SESSION_ID), "440", &[1, 2, 3])
        .unwrap();

    assert_eq!(kind, FaceEncodingKind::FaceEndpoint);
    assert_eq!(put.calls(), 2);
    assert_eq!(post.calls(), 1);
}

#[test]
fn test_attach_face_uses_first_accepted_encoding() {
    let server = MockServer::start();
    let put = server.mock(|when, then| {
        when.method(PUT).path("/users/440").json_body(json!({
            "User": {"credentials": {"visualFaces": [{"template_ex_picture": "AQID"}]}}
        }));
        then.status(200).json_body(json!({"Response": {"code": "0"}}));
    });

    let client = BioStarClient::new(&remote_config(&server)).unwrap();
    let kind = client
        .attach_face(&Session::new(SESSION_ID), "440", &[1, 2, 3])
        .unwrap();

    assert_eq!(kind, FaceEncodingKind::VisualFace);
    put.assert();
}

#[test]
fn test_attach_face_returns_last_error_when_all_fail() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(PUT).path("/users/440");
        then.status(400).json_body(json!({"Response": {"code": "1003"}}));
    });
    server.mock(|when, then| {
        when.method(POST).path("/users/440/credentials/faces");
        then.status(404).body("not found");
    });

    let client = BioStarClient::new(&remote_config(&server)).unwrap();
    let err = client
        .attach_face(&Session::new(SESSION_ID), "440", &[1, 2, 3])
        .unwrap_err();

    assert!(matches!(err, RemoteError::RemoteApi { status: 404, .. }));
}

#[test]
fn test_attach_face_honors_configured_order() {
    let server = MockServer::start();
    let post = server.mock(|when, then| {
        when.method(POST).path("/users/440/credentials/faces");
        then.status(200).json_body(json!({"Response": {"code": "0"}}));
    });
    let put = server.mock(|when, then| {
        when.method(PUT).path("/users/440");
        then.status(200).json_body(json!({"Response": {"code": "0"}}));
    });

    let config = RemoteConfig {
        face_encodings: vec![FaceEncodingKind::FaceEndpoint, FaceEncodingKind::VisualFace],
        ..remote_config(&server)
    };
    let client = BioStarClient::new(&config).unwrap();
    let kind = client
        .attach_face(&Session::new(SESSION_ID), "440", &[1, 2, 3])
        .unwrap();

    assert_eq!(kind, FaceEncodingKind::FaceEndpoint);
    assert_eq!(post.calls(), 1);
    assert_eq!(put.calls(), 0);
}

#[test]
fn test_logout_invalidates_session() {
    let server = MockServer::start();
    let logout = server.mock(|when, then| {
        when.method(POST)
            .path("/logout")
            .header("bs-session-id", SESSION_ID);
        then.status(200);
    });

    let client = BioStarClient::new(&remote_config(&server)).unwrap();
    let mut session = Session::new(SESSION_ID);
    client.logout(&mut session);

    logout.assert();
    assert!(!session.is_active());

    // A second logout has nothing to send
    client.logout(&mut session);
    assert_eq!(logout.calls(), 1);
}

#[test]
fn test_logout_failure_still_invalidates_session() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/logout");
        then.status(500);
    });

    let client = BioStarClient::new(&remote_config(&server)).unwrap();
    let mut session = Session::new(SESSION_ID);
    client.logout(&mut session);

    assert!(!session.is_active());
}

#[test]
fn test_list_user_groups() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/user_groups")
            .header("bs-session-id", SESSION_ID);
        then.status(200).json_body(json!({
            "UserGroupCollection": {
                "total": "2",
                "rows": [
                    {"id": "1", "name": "All Users"},
                    {"id": 1020, "name": "Members"}
                ]
            }
        }));
    });

    let client = BioStarClient::new(&remote_config(&server)).unwrap();
    let groups = client.list_user_groups(&Session::new(SESSION_ID)).unwrap();

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].id, 1);
    assert_eq!(groups[0].name, "All Users");
    assert_eq!(groups[1].id, 1020);
}

use super::*;
use crate::test_support::StubServer;
use std::time::Duration;

fn request<'a>(provider: &'a str, endpoint: &'a str, auth: AuthScheme, creds: Option<&'a Credentials>) -> ProbeRequest<'a> {
    ProbeRequest {
        provider,
        endpoint,
        auth,
        credentials: creds,
    }
}

#[tokio::test]
async fn test_healthy_with_bearer_token() {
    let server = StubServer::start(200).await;
    let url = server.url();
    let creds = Credentials::new().with("personal_access_token", "ghp_abc");
    let probe = ExternalProbe::new(Duration::from_secs(5)).unwrap();

    let outcome = probe
        .probe(&request("github", &url, AuthScheme::Bearer, Some(&creds)))
        .await;

    assert_eq!(outcome.class, ProbeClass::Healthy);
    assert_eq!(outcome.status_code, Some(200));
    assert!(outcome.response_time_ms.is_some());
    assert!(!outcome.rate_limited);
    assert_eq!(server.last_authorization().as_deref(), Some("Bearer ghp_abc"));
}

#[tokio::test]
async fn test_unauthorized_message_is_provider_specific() {
    let server = StubServer::start(401).await;
    let url = server.url();
    let creds = Credentials::new().with("personal_access_token", "ghp_old");
    let probe = ExternalProbe::new(Duration::from_secs(5)).unwrap();

    let outcome = probe
        .probe(&request("github", &url, AuthScheme::Bearer, Some(&creds)))
        .await;

    assert_eq!(outcome.class, ProbeClass::Error);
    assert_eq!(outcome.issue, Some(ProbeIssue::Unauthorized));
    assert!(outcome.message.contains("may have expired"));
    assert!(!outcome.message.contains("ghp_old"));
}

#[tokio::test]
async fn test_rate_limited_with_retry_after() {
    let server = StubServer::start(429).await;
    server.add_header("retry-after", "90");
    let url = server.url();
    let probe = ExternalProbe::new(Duration::from_secs(5)).unwrap();

    let outcome = probe.probe(&request("acme", &url, AuthScheme::None, None)).await;

    assert_eq!(outcome.class, ProbeClass::Warning);
    assert!(outcome.rate_limited);
    let retry_at = outcome.retry_at.unwrap();
    assert!(retry_at > Utc::now() + ChronoDuration::seconds(60));
}

#[tokio::test]
async fn test_server_error_and_client_error() {
    let server = StubServer::start(502).await;
    let url = server.url();
    let probe = ExternalProbe::new(Duration::from_secs(5)).unwrap();

    let outcome = probe.probe(&request("slack", &url, AuthScheme::None, None)).await;
    assert_eq!(outcome.class, ProbeClass::Unhealthy);

    server.set_status(404);
    let outcome = probe.probe(&request("slack", &url, AuthScheme::None, None)).await;
    assert_eq!(outcome.class, ProbeClass::Error);
    assert_eq!(outcome.issue, Some(ProbeIssue::ClientError));
}

#[tokio::test]
async fn test_missing_credentials_skip_request() {
    let server = StubServer::start(200).await;
    let url = server.url();
    let probe = ExternalProbe::new(Duration::from_secs(5)).unwrap();

    let outcome = probe.probe(&request("notion", &url, AuthScheme::Bearer, None)).await;

    assert_eq!(outcome.class, ProbeClass::Error);
    assert_eq!(outcome.issue, Some(ProbeIssue::MissingCredentials));
    assert_eq!(server.hits(), 0);
}

#[tokio::test]
async fn test_connection_refused_is_unhealthy() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = format!("http://{}", addr);
    let probe = ExternalProbe::new(Duration::from_secs(2)).unwrap();
    let outcome = probe.probe(&request("generic", &url, AuthScheme::None, None)).await;

    assert_eq!(outcome.class, ProbeClass::Unhealthy);
    assert_eq!(outcome.issue, Some(ProbeIssue::Network));
    assert!(outcome.status_code.is_none());
}

#[tokio::test]
async fn test_expiry_header_raises_credential_warning() {
    let server = StubServer::start(200).await;
    let soon = (Utc::now() + ChronoDuration::days(2)).format("%Y-%m-%d %H:%M:%S UTC").to_string();
    server.add_header("github-authentication-token-expiration", &soon);
    let url = server.url();
    let creds = Credentials::new().with("token", "ghp_x");
    let probe = ExternalProbe::new(Duration::from_secs(5)).unwrap();

    let outcome = probe
        .probe(&request("github", &url, AuthScheme::Bearer, Some(&creds)))
        .await;

    assert_eq!(outcome.class, ProbeClass::Healthy);
    assert!(outcome.credential_expiring);
    assert!(outcome.message.contains("expire"));
}

#[tokio::test]
async fn test_distant_expiry_field_is_not_a_warning() {
    let server = StubServer::start(200).await;
    let url = server.url();
    let later = (Utc::now() + ChronoDuration::days(90)).to_rfc3339();
    let creds = Credentials::new().with("api_key", "k").with("expires_at", later);
    let probe = ExternalProbe::new(Duration::from_secs(5)).unwrap();

    let outcome = probe
        .probe(&request("linear", &url, AuthScheme::Bearer, Some(&creds)))
        .await;

    assert!(outcome.credential_expires_at.is_some());
    assert!(!outcome.credential_expiring);
}

#[test]
fn test_enhance_message_falls_back_to_generic_guidance() {
    let message = enhance_message(profile("linear"), ProbeIssue::Forbidden, Some(403));
    assert!(message.starts_with("Linear HTTP 403"));
    assert!(message.contains("lack permission"));

    let message = enhance_message(profile("linear"), ProbeIssue::ServerError, Some(500));
    assert_eq!(message, "Linear HTTP 500: service error");
}

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use tether_types::AuthScheme;
use zeroize::Zeroizing;

use super::classify::parse_timestamp;
use super::providers::ProviderProfile;
use crate::registry::Credentials;

/// Provider credentials reduced to one shape, whatever the provider calls its fields.
#[derive(Default)]
pub struct NormalizedCredential {
    pub token: Option<Zeroizing<String>>,
    pub username: Option<String>,
    pub password: Option<Zeroizing<String>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for NormalizedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizedCredential")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub fn normalize(profile: &ProviderProfile, credentials: &Credentials) -> NormalizedCredential {
    let token = profile
        .token_fields
        .iter()
        .find_map(|field| credentials.get(field))
        .map(|t| Zeroizing::new(t.to_string()));

    NormalizedCredential {
        token,
        username: credentials.get("username").map(str::to_string),
        password: credentials
            .get("password")
            .map(|p| Zeroizing::new(p.to_string())),
        expires_at: credentials.get("expires_at").and_then(parse_timestamp),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthHeaderError {
    MissingToken,
    MissingBasicCredentials,
}

/// `Authorization` header value for the scheme. Basic falls back to the token as password.
pub fn authorization_header(
    scheme: AuthScheme,
    credential: &NormalizedCredential,
) -> Result<Option<Zeroizing<String>>, AuthHeaderError> {
    match scheme {
        AuthScheme::None => Ok(None),
        AuthScheme::Bearer => {
            let token = credential
                .token
                .as_ref()
                .ok_or(AuthHeaderError::MissingToken)?;
            Ok(Some(Zeroizing::new(format!("Bearer {}", token.as_str()))))
        }
        AuthScheme::Basic => {
            let username = credential
                .username
                .as_deref()
                .ok_or(AuthHeaderError::MissingBasicCredentials)?;
            let password = credential
                .password
                .as_ref()
                .or(credential.token.as_ref())
                .ok_or(AuthHeaderError::MissingBasicCredentials)?;
            let pair = Zeroizing::new(format!("{}:{}", username, password.as_str()));
            Ok(Some(Zeroizing::new(format!("Basic {}", STANDARD.encode(pair.as_bytes())))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::providers::profile;

    #[test]
    fn test_provider_field_priority() {
        let creds = Credentials::new()
            .with("token", "generic")
            .with("personal_access_token", "ghp_specific");
        let normalized = normalize(profile("github"), &creds);
        assert_eq!(normalized.token.as_deref().map(String::as_str), Some("ghp_specific"));
    }

    #[test]
    fn test_slack_uses_bot_token() {
        let creds = Credentials::new().with("bot_token", "xoxb-123");
        let normalized = normalize(profile("slack"), &creds);
        assert_eq!(normalized.token.as_deref().map(String::as_str), Some("xoxb-123"));
    }

    #[test]
    fn test_bearer_header() {
        let creds = Credentials::new().with("api_key", "sk-1");
        let normalized = normalize(profile("openai"), &creds);
        let header = authorization_header(AuthScheme::Bearer, &normalized).unwrap().unwrap();
        assert_eq!(header.as_str(), "Bearer sk-1");
    }

    #[test]
    fn test_basic_header() {
        let creds = Credentials::new().with("username", "alice").with("password", "s3cret");
        let normalized = normalize(profile("generic"), &creds);
        let header = authorization_header(AuthScheme::Basic, &normalized).unwrap().unwrap();
        assert_eq!(header.as_str(), "Basic YWxpY2U6czNjcmV0");
    }

    #[test]
    fn test_missing_credentials() {
        let normalized = NormalizedCredential::default();
        assert_eq!(
            authorization_header(AuthScheme::Bearer, &normalized).unwrap_err(),
            AuthHeaderError::MissingToken
        );
        assert_eq!(
            authorization_header(AuthScheme::Basic, &normalized).unwrap_err(),
            AuthHeaderError::MissingBasicCredentials
        );
        assert!(authorization_header(AuthScheme::None, &normalized).unwrap().is_none());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let creds = Credentials::new().with("token", "hunter2").with("expires_at", "2030-01-01T00:00:00Z");
        let normalized = normalize(profile("generic"), &creds);
        let rendered = format!("{:?}", normalized);
        assert!(!rendered.contains("hunter2"));
        assert!(normalized.expires_at.is_some());
    }
}

use super::classify::ProbeIssue;

/// Per-provider data: where to find the secret, where the provider reports token expiry, and
/// how to phrase failures for an operator.
pub struct ProviderProfile {
    pub id: &'static str,
    pub display_name: &'static str,
    pub token_fields: &'static [&'static str],
    pub expiry_header: Option<&'static str>,
    pub guidance: &'static [(ProbeIssue, &'static str)],
}

impl ProviderProfile {
    pub fn guidance_for(&self, issue: ProbeIssue) -> Option<&'static str> {
        self.guidance
            .iter()
            .find(|(kind, _)| *kind == issue)
            .map(|(_, text)| *text)
    }
}

const GENERIC_TOKEN_FIELDS: &[&str] = &[
    "token",
    "access_token",
    "api_key",
    "bot_token",
    "personal_access_token",
    "oauth_access_token",
];

pub static GENERIC: ProviderProfile = ProviderProfile {
    id: "generic",
    display_name: "Remote service",
    token_fields: GENERIC_TOKEN_FIELDS,
    expiry_header: None,
    guidance: &[
        (ProbeIssue::Unauthorized, "check that the configured credentials are still valid"),
        (ProbeIssue::Forbidden, "the credentials lack permission for this endpoint"),
        (ProbeIssue::RateLimited, "the service is rate limiting requests"),
    ],
};

pub static PROVIDERS: &[ProviderProfile] = &[
    ProviderProfile {
        id: "github",
        display_name: "GitHub",
        token_fields: &["personal_access_token", "oauth_access_token", "token", "access_token"],
        expiry_header: Some("github-authentication-token-expiration"),
        guidance: &[
            (ProbeIssue::Unauthorized, "GitHub token may have expired or been revoked; generate a new personal access token"),
            (ProbeIssue::Forbidden, "GitHub token is missing required scopes, or a secondary rate limit was hit"),
            (ProbeIssue::RateLimited, "GitHub API rate limit reached; requests resume after the reset time"),
            (ProbeIssue::ServerError, "GitHub is having problems; see githubstatus.com"),
        ],
    },
    ProviderProfile {
        id: "gitlab",
        display_name: "GitLab",
        token_fields: &["personal_access_token", "oauth_access_token", "token", "access_token"],
        expiry_header: None,
        guidance: &[
            (ProbeIssue::Unauthorized, "GitLab token may have expired; personal access tokens expire after at most one year"),
            (ProbeIssue::Forbidden, "GitLab token needs the read_api scope"),
        ],
    },
    ProviderProfile {
        id: "slack",
        display_name: "Slack",
        token_fields: &["bot_token", "oauth_access_token", "access_token", "token"],
        expiry_header: None,
        guidance: &[
            (ProbeIssue::Unauthorized, "Slack bot token is invalid or the app was uninstalled from the workspace"),
            (ProbeIssue::Forbidden, "Slack app is missing a required OAuth scope"),
            (ProbeIssue::RateLimited, "Slack rate limit tier exceeded for this method"),
        ],
    },
    ProviderProfile {
        id: "notion",
        display_name: "Notion",
        token_fields: &["api_key", "token", "oauth_access_token", "access_token"],
        expiry_header: None,
        guidance: &[
            (ProbeIssue::Unauthorized, "Notion integration token is invalid; check the integration settings"),
            (ProbeIssue::Forbidden, "Notion integration has not been shared with the requested pages"),
        ],
    },
    ProviderProfile {
        id: "linear",
        display_name: "Linear",
        token_fields: &["api_key", "oauth_access_token", "access_token", "token"],
        expiry_header: None,
        guidance: &[(ProbeIssue::Unauthorized, "Linear API key was revoked or has expired")],
    },
    ProviderProfile {
        id: "google",
        display_name: "Google",
        token_fields: &["oauth_access_token", "access_token", "token"],
        expiry_header: None,
        guidance: &[
            (ProbeIssue::Unauthorized, "Google OAuth access token may have expired; re-authorize to refresh it"),
            (ProbeIssue::Forbidden, "Google API is not enabled for this project or the scope was not granted"),
            (ProbeIssue::RateLimited, "Google API quota exceeded"),
        ],
    },
    ProviderProfile {
        id: "openai",
        display_name: "OpenAI",
        token_fields: &["api_key", "token"],
        expiry_header: None,
        guidance: &[
            (ProbeIssue::Unauthorized, "OpenAI API key is invalid or was deleted"),
            (ProbeIssue::RateLimited, "OpenAI rate limit or quota reached; check usage limits"),
        ],
    },
];

pub fn profile(provider: &str) -> &'static ProviderProfile {
    let provider = provider.trim();
    PROVIDERS
        .iter()
        .find(|p| p.id.eq_ignore_ascii_case(provider))
        .unwrap_or(&GENERIC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(profile("GitHub").id, "github");
        assert_eq!(profile(" slack ").id, "slack");
    }

    #[test]
    fn test_unknown_provider_falls_back() {
        let p = profile("acme");
        assert_eq!(p.id, "generic");
        assert!(p.guidance_for(ProbeIssue::Unauthorized).is_some());
    }

    #[test]
    fn test_provider_ids_unique() {
        let mut ids: Vec<_> = PROVIDERS.iter().map(|p| p.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), PROVIDERS.len());
    }
}

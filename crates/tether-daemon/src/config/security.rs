use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub api_auth_required: bool,
    #[serde(skip_serializing)]
    pub api_auth_token: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_auth_required: false,
            api_auth_token: None,
        }
    }
}

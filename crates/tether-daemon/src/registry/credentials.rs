use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use zeroize::Zeroize;

#[derive(Clone, Default)]
pub struct Credentials {
    fields: BTreeMap<String, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into().to_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(&key.to_lowercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        for value in self.fields.values_mut() {
            value.zeroize();
        }
    }
}

pub trait CredentialStore: Send + Sync {
    fn lookup(&self, reference: &str) -> Option<Credentials>;
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, reference: impl Into<String>, credentials: Credentials) {
        self.entries.write().insert(reference.into(), credentials);
    }

    pub fn remove(&self, reference: &str) {
        self.entries.write().remove(reference);
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn lookup(&self, reference: &str) -> Option<Credentials> {
        self.entries.read().get(reference).cloned()
    }
}

/// Reads `TETHER_CRED_<REF>_<FIELD>` variables, e.g. `TETHER_CRED_GITHUB_MAIN_PERSONAL_ACCESS_TOKEN`
/// for reference `github-main`. Fields are matched against the longest known suffix.
pub struct EnvCredentialStore {
    prefix: String,
}

const KNOWN_FIELDS: &[&str] = &[
    "personal_access_token",
    "oauth_access_token",
    "access_token",
    "bot_token",
    "api_key",
    "token",
    "username",
    "password",
    "expires_at",
];

impl EnvCredentialStore {
    pub fn new() -> Self {
        Self {
            prefix: "TETHER_CRED_".to_string(),
        }
    }

    fn env_key(reference: &str) -> String {
        reference
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }

    fn collect<I>(&self, reference: &str, vars: I) -> Option<Credentials>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let stem = format!("{}{}_", self.prefix, Self::env_key(reference));
        let mut creds = Credentials::new();
        for (key, value) in vars {
            let Some(rest) = key.strip_prefix(&stem) else {
                continue;
            };
            let field = rest.to_lowercase();
            if KNOWN_FIELDS.contains(&field.as_str()) {
                creds.insert(field, value);
            }
        }
        if creds.is_empty() {
            None
        } else {
            Some(creds)
        }
    }
}

impl Default for EnvCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for EnvCredentialStore {
    fn lookup(&self, reference: &str) -> Option<Credentials> {
        self.collect(reference, std::env::vars())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_values() {
        let creds = Credentials::new().with("api_key", "sk-very-secret");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("api_key"));
        assert!(!rendered.contains("sk-very-secret"));
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let creds = Credentials::new().with("Bot_Token", "xoxb-1");
        assert_eq!(creds.get("bot_token"), Some("xoxb-1"));
        assert_eq!(creds.get("BOT_TOKEN"), Some("xoxb-1"));
    }

    #[test]
    fn test_empty_values_are_absent() {
        let creds = Credentials::new().with("token", "");
        assert_eq!(creds.get("token"), None);
    }

    #[test]
    fn test_env_store_collects_known_fields() {
        let store = EnvCredentialStore::new();
        let vars = vec![
            ("TETHER_CRED_GITHUB_MAIN_PERSONAL_ACCESS_TOKEN".to_string(), "ghp_x".to_string()),
            ("TETHER_CRED_GITHUB_MAIN_UNRELATED".to_string(), "nope".to_string()),
            ("TETHER_CRED_OTHER_TOKEN".to_string(), "other".to_string()),
        ];
        let creds = store.collect("github-main", vars).unwrap();
        assert_eq!(creds.get("personal_access_token"), Some("ghp_x"));
        assert_eq!(creds.keys().count(), 1);
    }

    #[test]
    fn test_memory_store_lookup() {
        let store = MemoryCredentialStore::new();
        store.insert("slack", Credentials::new().with("bot_token", "xoxb"));
        assert!(store.lookup("slack").is_some());
        assert!(store.lookup("missing").is_none());
        store.remove("slack");
        assert!(store.lookup("slack").is_none());
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    LocalStdio,
    LocalHttp,
    RemoteProvider,
}

impl TargetKind {
    pub fn is_local(&self) -> bool {
        matches!(self, TargetKind::LocalStdio | TargetKind::LocalHttp)
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, TargetKind::RemoteProvider)
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::LocalStdio => write!(f, "local-stdio"),
            TargetKind::LocalHttp => write!(f, "local-http"),
            TargetKind::RemoteProvider => write!(f, "remote-provider"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    Never,
    #[default]
    OnFailure,
    Always,
}

impl RestartPolicy {
    pub fn should_restart(&self, exit_success: bool) -> bool {
        match self {
            RestartPolicy::Never => false,
            RestartPolicy::OnFailure => !exit_success,
            RestartPolicy::Always => true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchSpec {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub restart_policy: RestartPolicy,
}

impl LaunchSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn display_command(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    #[default]
    None,
    Bearer,
    Basic,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSpec {
    pub provider: String,
    pub endpoint: String,
    #[serde(default)]
    pub auth: AuthScheme,
    #[serde(default)]
    pub credential_ref: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub slug: String,
    pub kind: TargetKind,
    #[serde(default)]
    pub launch: Option<LaunchSpec>,
    #[serde(default)]
    pub remote: Option<RemoteSpec>,
    #[serde(default)]
    pub autostart: bool,
}

impl Target {
    pub fn local_stdio(slug: impl Into<String>, launch: LaunchSpec) -> Self {
        Self {
            slug: slug.into(),
            kind: TargetKind::LocalStdio,
            launch: Some(launch),
            remote: None,
            autostart: false,
        }
    }

    pub fn local_http(slug: impl Into<String>, launch: LaunchSpec) -> Self {
        Self {
            slug: slug.into(),
            kind: TargetKind::LocalHttp,
            launch: Some(launch),
            remote: None,
            autostart: false,
        }
    }

    pub fn remote(slug: impl Into<String>, remote: RemoteSpec) -> Self {
        Self {
            slug: slug.into(),
            kind: TargetKind::RemoteProvider,
            launch: None,
            remote: Some(remote),
            autostart: false,
        }
    }

    pub fn with_autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    pub fn is_local(&self) -> bool {
        self.kind.is_local()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.slug.is_empty() {
            return Err("target slug must not be empty".into());
        }
        if !self
            .slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(format!("target slug '{}' contains invalid characters", self.slug));
        }
        match self.kind {
            TargetKind::LocalStdio | TargetKind::LocalHttp => match &self.launch {
                Some(launch) if !launch.command.trim().is_empty() => Ok(()),
                _ => Err(format!("local target '{}' has no launch command", self.slug)),
            },
            TargetKind::RemoteProvider => match &self.remote {
                Some(remote) if !remote.endpoint.trim().is_empty() => Ok(()),
                _ => Err(format!("remote target '{}' has no endpoint", self.slug)),
            },
        }
    }
}

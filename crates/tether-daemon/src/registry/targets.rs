use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tether_types::{Target, TetherError, TetherResult};
use tracing::{debug, info};

pub trait TargetRegistry: Send + Sync {
    fn targets(&self) -> Vec<Target>;

    fn get(&self, slug: &str) -> Option<Target>;

    fn register(&self, target: Target) -> TetherResult<()>;

    fn deregister(&self, slug: &str) -> TetherResult<Target>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default, rename = "target")]
    targets: Vec<Target>,
}

pub struct FileRegistry {
    path: Option<PathBuf>,
    targets: RwLock<BTreeMap<String, Target>>,
}

impl FileRegistry {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            targets: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_targets(targets: impl IntoIterator<Item = Target>) -> TetherResult<Self> {
        let registry = Self::in_memory();
        for target in targets {
            registry.register(target)?;
        }
        Ok(registry)
    }

    pub fn load(path: impl AsRef<Path>) -> TetherResult<Self> {
        let path = path.as_ref();
        let registry = Self {
            path: Some(path.to_path_buf()),
            targets: RwLock::new(BTreeMap::new()),
        };

        if !path.exists() {
            info!("Registry file {:?} not found, starting with no targets", path);
            return Ok(registry);
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| TetherError::Config(format!("Failed to read registry: {}", e)))?;
        let file: RegistryFile = toml::from_str(&contents)
            .map_err(|e| TetherError::Config(format!("Failed to parse registry: {}", e)))?;

        for target in file.targets {
            registry.insert_validated(target)?;
        }

        info!("Loaded {} target(s) from {:?}", registry.targets.read().len(), path);
        Ok(registry)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn insert_validated(&self, target: Target) -> TetherResult<()> {
        target.validate().map_err(TetherError::Config)?;
        let mut targets = self.targets.write();
        if targets.contains_key(&target.slug) {
            return Err(TetherError::Config(format!(
                "Target '{}' is already registered",
                target.slug
            )));
        }
        debug!("Registered target {} ({})", target.slug, target.kind);
        targets.insert(target.slug.clone(), target);
        Ok(())
    }
}

impl TargetRegistry for FileRegistry {
    fn targets(&self) -> Vec<Target> {
        self.targets.read().values().cloned().collect()
    }

    fn get(&self, slug: &str) -> Option<Target> {
        self.targets.read().get(slug).cloned()
    }

    fn register(&self, target: Target) -> TetherResult<()> {
        self.insert_validated(target)
    }

    fn deregister(&self, slug: &str) -> TetherResult<Target> {
        self.targets
            .write()
            .remove(slug)
            .ok_or_else(|| TetherError::UnknownTarget(slug.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_types::{LaunchSpec, TargetKind};

    #[test]
    fn test_load_registry_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.toml");
        std::fs::write(
            &path,
            r#"
            [[target]]
            slug = "files"
            kind = "local-stdio"
            autostart = true
            [target.launch]
            command = "files-server"

            [[target]]
            slug = "github"
            kind = "remote-provider"
            [target.remote]
            provider = "github"
            endpoint = "https://api.github.com/user"
            auth = "bearer"
            credential_ref = "github-main"
            "#,
        )
        .unwrap();

        let registry = FileRegistry::load(&path).unwrap();
        assert_eq!(registry.targets().len(), 2);
        assert_eq!(registry.get("github").unwrap().kind, TargetKind::RemoteProvider);
        assert!(registry.get("files").unwrap().autostart);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::load(dir.path().join("absent.toml")).unwrap();
        assert!(registry.targets().is_empty());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = FileRegistry::in_memory();
        registry
            .register(Target::local_http("api", LaunchSpec::new("server")))
            .unwrap();
        assert!(registry
            .register(Target::local_http("api", LaunchSpec::new("server")))
            .is_err());
    }

    #[test]
    fn test_deregister_unknown() {
        let registry = FileRegistry::in_memory();
        assert_eq!(
            registry.deregister("ghost").unwrap_err(),
            TetherError::UnknownTarget("ghost".into())
        );
    }
}

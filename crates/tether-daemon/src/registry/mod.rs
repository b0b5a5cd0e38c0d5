mod credentials;
mod sync;
mod targets;

pub use credentials::{CredentialStore, Credentials, EnvCredentialStore, MemoryCredentialStore};
pub use sync::{LoggingRegistrySync, RegistrySync};
pub use targets::{FileRegistry, TargetRegistry};

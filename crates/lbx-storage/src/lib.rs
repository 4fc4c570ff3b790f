//! lbx-storage: cloud provider contract + OpenDAL remote vault storage
//!
//! The sync reconciler only ever talks to a [`CloudProvider`]. Every built-in
//! backend is an [`OpendalProvider`] over a different OpenDAL service; the
//! [`ProviderRegistry`] maps a provider name from a sync sidecar to a factory.

pub mod backend;
pub mod health;
pub mod operator;
pub mod provider;
pub mod registry;

pub use backend::OpendalProvider;
pub use health::check_health;
pub use operator::{build_operator, BackendConfig};
pub use provider::{checksum, CloudProvider, Credentials, RemoteMetadata, RemoteVault, VersionInfo};
pub use registry::ProviderRegistry;

//! OpenDAL Operator factory for lockbox remote backends

use lbx_core::{LockboxError, LockboxResult};
use opendal::Operator;
use secrecy::{ExposeSecret, SecretString};

use crate::provider::Credentials;

/// Backend connection settings, parsed from a sidecar's credentials map.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// S3 or any S3-compatible endpoint (SeaweedFS, MinIO, R2)
    S3 {
        endpoint: Option<String>,
        region: String,
        bucket: String,
        root: Option<String>,
        access_key_id: String,
        secret_access_key: SecretString,
        enforce_tls: bool,
    },
    Azblob {
        endpoint: String,
        container: String,
        root: Option<String>,
        account_name: String,
        account_key: SecretString,
    },
    /// A local or mounted directory
    Fs { root: String },
    /// Process-local; contents vanish with the operator
    Memory,
}

impl BackendConfig {
    /// Parse credentials for the backend `kind`.
    ///
    /// Missing required fields are reported as `Authentication` errors, the
    /// same kind a backend would return for rejected credentials.
    pub fn from_credentials(kind: &str, creds: &Credentials) -> LockboxResult<Self> {
        let required = |name: &str| {
            creds
                .get(name)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| {
                    LockboxError::Authentication(format!("{kind}: missing credential '{name}'"))
                })
        };
        let optional = |name: &str| creds.get(name).filter(|v| !v.is_empty()).cloned();

        match kind {
            "s3" => Ok(Self::S3 {
                endpoint: optional("endpoint"),
                region: optional("region").unwrap_or_else(|| "us-east-1".to_string()),
                bucket: required("bucket")?,
                root: optional("root"),
                access_key_id: required("accessKeyId")?,
                secret_access_key: SecretString::from(required("secretAccessKey")?),
                enforce_tls: optional("enforceTls")
                    .map(|v| v != "false")
                    .unwrap_or(true),
            }),
            "azblob" => {
                let account_name = required("accountName")?;
                Ok(Self::Azblob {
                    endpoint: optional("endpoint").unwrap_or_else(|| {
                        format!("https://{account_name}.blob.core.windows.net")
                    }),
                    container: required("container")?,
                    root: optional("root"),
                    account_name,
                    account_key: SecretString::from(required("accountKey")?),
                })
            }
            "fs" => Ok(Self::Fs {
                root: required("root")?,
            }),
            "memory" => Ok(Self::Memory),
            other => Err(LockboxError::UnknownProvider(other.to_string())),
        }
    }

    fn check_transport(&self) -> LockboxResult<()> {
        let (endpoint, enforce) = match self {
            Self::S3 {
                endpoint: Some(e),
                enforce_tls,
                ..
            } => (e.as_str(), *enforce_tls),
            Self::Azblob { endpoint, .. } => (endpoint.as_str(), true),
            _ => return Ok(()),
        };

        if endpoint.starts_with("http://") {
            if enforce {
                return Err(LockboxError::Config(format!(
                    "endpoint uses plaintext HTTP ({endpoint}) but enforceTls is enabled; \
                     use an HTTPS endpoint or set enforceTls to \"false\" for local development"
                )));
            }
            tracing::warn!(
                endpoint,
                "endpoint uses plaintext HTTP: credentials and sealed vaults travel unencrypted"
            );
        }
        Ok(())
    }
}

/// Build an OpenDAL Operator for a backend.
///
/// S3 uses path-style addressing (the opendal 0.55 default), which
/// SeaweedFS and MinIO require.
pub fn build_operator(cfg: &BackendConfig) -> LockboxResult<Operator> {
    cfg.check_transport()?;

    match cfg {
        BackendConfig::S3 {
            endpoint,
            region,
            bucket,
            root,
            access_key_id,
            secret_access_key,
            ..
        } => {
            let mut builder = opendal::services::S3::default()
                .region(region)
                .bucket(bucket)
                .access_key_id(access_key_id)
                .secret_access_key(secret_access_key.expose_secret());
            if let Some(endpoint) = endpoint {
                builder = builder.endpoint(endpoint);
            }
            if let Some(root) = root {
                builder = builder.root(root);
            }
            finish(builder, true)
        }
        BackendConfig::Azblob {
            endpoint,
            container,
            root,
            account_name,
            account_key,
        } => {
            let mut builder = opendal::services::Azblob::default()
                .endpoint(endpoint)
                .container(container)
                .account_name(account_name)
                .account_key(account_key.expose_secret());
            if let Some(root) = root {
                builder = builder.root(root);
            }
            finish(builder, true)
        }
        BackendConfig::Fs { root } => finish(opendal::services::Fs::default().root(root), false),
        BackendConfig::Memory => finish(opendal::services::Memory::default(), false),
    }
}

fn finish<B: opendal::Builder>(builder: B, remote: bool) -> LockboxResult<Operator> {
    let op = Operator::new(builder)
        .map_err(|e| LockboxError::Config(format!("creating OpenDAL operator: {e}")))?
        .layer(opendal::layers::LoggingLayer::default());

    let op = if remote {
        op.layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish()
    } else {
        op.finish()
    };
    Ok(op)
}

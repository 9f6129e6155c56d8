//! Keypair provisioning.
//!
//! Instances are launched with a dated keypair
//! (`<project>-<environment>-<YYYYMMDD>-key`). Before composing, the keypair
//! is looked up; when the provider reports it as not found it is created and
//! its private material written once to `<dir>/<name>.pem`. Any other
//! provider error is fatal.

#[cfg(feature = "aws")]
pub mod aws;

#[cfg(feature = "aws")]
pub use self::aws::Ec2KeyPairProvider;

use async_trait::async_trait;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while looking up or creating a keypair.
#[derive(Error, Debug)]
pub enum KeyPairError {
    /// The keypair does not exist. Recoverable: it gets created.
    #[error("Keypair '{0}' not found")]
    NotFound(String),

    /// Any other provider error.
    #[error("Keypair API error ({code}): {message}")]
    Api { code: String, message: String },

    /// The provider created the keypair but returned no private key.
    #[error("Keypair '{0}' was created without private key material")]
    MissingMaterial(String),

    /// The private key could not be written.
    #[error("Failed to write private key to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl KeyPairError {
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, KeyPairError::NotFound(_))
    }
}

/// Result type for keypair operations.
pub type KeyPairResult<T> = std::result::Result<T, KeyPairError>;

/// An existing keypair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairInfo {
    pub name: String,
    pub key_pair_id: Option<String>,
    pub fingerprint: Option<String>,
}

impl KeyPairInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_pair_id: None,
            fingerprint: None,
        }
    }
}

/// A freshly created keypair with its private material.
#[derive(Clone)]
pub struct CreatedKeyPair {
    pub info: KeyPairInfo,
    pub material: String,
}

impl fmt::Debug for CreatedKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreatedKeyPair")
            .field("info", &self.info)
            .field("material", &"<redacted>")
            .finish()
    }
}

/// Where keypairs live.
#[async_trait]
pub trait KeyPairProvider: Send + Sync {
    /// Look up a keypair by name. Returns [`KeyPairError::NotFound`] when it
    /// does not exist.
    async fn describe(&self, name: &str) -> KeyPairResult<KeyPairInfo>;

    /// Create an RSA keypair with the given tags.
    async fn create(&self, name: &str, tags: &[(String, String)]) -> KeyPairResult<CreatedKeyPair>;
}

/// What [`ensure_key_pair`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPairOutcome {
    /// The keypair already existed
    Existing(KeyPairInfo),
    /// The keypair was created and its private key written to `path`
    Created { info: KeyPairInfo, path: PathBuf },
}

impl KeyPairOutcome {
    pub fn info(&self) -> &KeyPairInfo {
        match self {
            KeyPairOutcome::Existing(info) => info,
            KeyPairOutcome::Created { info, .. } => info,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, KeyPairOutcome::Created { .. })
    }
}

/// Path the private key of `name` is written to.
pub fn private_key_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.pem", name))
}

/// Make sure the keypair `name` exists, creating it when it does not.
pub async fn ensure_key_pair(
    provider: &dyn KeyPairProvider,
    name: &str,
    tags: &[(String, String)],
    dir: &Path,
) -> KeyPairResult<KeyPairOutcome> {
    match provider.describe(name).await {
        Ok(info) => {
            tracing::info!(keypair = %name, "keypair exists");
            Ok(KeyPairOutcome::Existing(info))
        }
        Err(err) if err.is_not_found() => {
            // The material is only returned once: fail before creating it remotely
            let path = private_key_path(dir, name);
            check_key_destination(dir, &path)?;

            tracing::info!(keypair = %name, "creating keypair");
            let created = provider.create(name, tags).await?;
            write_private_key(&path, &created.material)?;
            tracing::info!(keypair = %name, path = %path.display(), "wrote private key");
            Ok(KeyPairOutcome::Created {
                info: created.info,
                path,
            })
        }
        Err(err) => Err(err),
    }
}

/// Check that a new private key can be written to `path` inside `dir`.
pub fn check_key_destination(dir: &Path, path: &Path) -> KeyPairResult<()> {
    let unwritable = |kind, message: &str| KeyPairError::Write {
        path: path.to_path_buf(),
        source: io::Error::new(kind, message.to_string()),
    };

    if !dir.is_dir() {
        return Err(unwritable(
            io::ErrorKind::NotFound,
            "key directory does not exist",
        ));
    }
    if path.exists() {
        return Err(unwritable(
            io::ErrorKind::AlreadyExists,
            "private key file already exists",
        ));
    }
    Ok(())
}

/// Write private key material to a new owner-only file. Existing files are
/// never overwritten.
pub fn write_private_key(path: &Path, material: &str) -> KeyPairResult<()> {
    let write_err = |source| KeyPairError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(write_err)?;
    file.write_all(material.as_bytes()).map_err(write_err)?;
    file.sync_all().map_err(write_err)
}

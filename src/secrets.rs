//! References into the external secret store.
//!
//! Stacksmith never reads or stores secret values. A [`SecretReference`]
//! renders to a dynamic reference that the provisioning engine resolves
//! against AWS Secrets Manager at deploy time.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A field of a Secrets Manager secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretReference {
    /// Secret name or ARN
    pub secret_id: String,
    /// JSON key inside the secret string
    pub json_field: String,
    /// Version stage (`AWSCURRENT` when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_stage: Option<String>,
}

impl SecretReference {
    pub fn new(secret_id: impl Into<String>, json_field: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id.into(),
            json_field: json_field.into(),
            version_stage: None,
        }
    }

    pub fn validate(&self, key: &str) -> Result<()> {
        if self.secret_id.trim().is_empty() {
            return Err(Error::MissingField(format!("{}.secret_id", key)));
        }
        if self.json_field.trim().is_empty() {
            return Err(Error::MissingField(format!("{}.json_field", key)));
        }
        // ':' separates the segments of the dynamic reference
        if self.json_field.contains(':') {
            return Err(Error::invalid_config(
                format!("{}.json_field", key),
                "must not contain ':'",
            ));
        }
        Ok(())
    }

    /// `{{resolve:secretsmanager:<id>:SecretString:<field>:<stage>:}}`
    pub fn dynamic_reference(&self) -> String {
        format!(
            "{{{{resolve:secretsmanager:{}:SecretString:{}:{}:}}}}",
            self.secret_id,
            self.json_field,
            self.version_stage.as_deref().unwrap_or("")
        )
    }
}

/// Master credentials of a managed database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MasterUser {
    pub name: String,
    pub password: SecretReference,
}

impl Default for MasterUser {
    fn default() -> Self {
        Self {
            name: "admin".to_string(),
            password: SecretReference::new("rds-master-user", "password"),
        }
    }
}

impl MasterUser {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::MissingField("database.master_user.name".to_string()));
        }
        self.password.validate("database.master_user.password")
    }
}

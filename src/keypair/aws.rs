//! EC2-backed keypair provider.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ec2::error::ProvideErrorMetadata;
use aws_sdk_ec2::types::{KeyType, ResourceType, Tag, TagSpecification};
use aws_sdk_ec2::Client;

use super::{CreatedKeyPair, KeyPairError, KeyPairInfo, KeyPairProvider, KeyPairResult};

/// Error code EC2 returns for an unknown keypair name.
const NOT_FOUND_CODE: &str = "InvalidKeyPair.NotFound";

/// Looks up and creates keypairs through the EC2 API.
pub struct Ec2KeyPairProvider {
    client: Client,
}

impl Ec2KeyPairProvider {
    /// Create a provider from the default credential chain.
    pub async fn new(region: Option<&str>) -> Self {
        let config = if let Some(region_str) = region {
            aws_config::defaults(BehaviorVersion::latest())
                .region(aws_sdk_ec2::config::Region::new(region_str.to_string()))
                .load()
                .await
        } else {
            aws_config::defaults(BehaviorVersion::latest()).load().await
        };

        Self {
            client: Client::new(&config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn classify(name: &str, code: Option<&str>, message: Option<&str>) -> KeyPairError {
    match code {
        Some(NOT_FOUND_CODE) => KeyPairError::NotFound(name.to_string()),
        code => KeyPairError::api(
            code.unwrap_or("Unknown"),
            message.unwrap_or("no error message"),
        ),
    }
}

#[async_trait]
impl KeyPairProvider for Ec2KeyPairProvider {
    async fn describe(&self, name: &str) -> KeyPairResult<KeyPairInfo> {
        let resp = self
            .client
            .describe_key_pairs()
            .key_names(name)
            .send()
            .await
            .map_err(|err| {
                let err = err.into_service_error();
                classify(name, err.code(), err.message())
            })?;

        resp.key_pairs()
            .first()
            .map(|kp| KeyPairInfo {
                name: kp.key_name().unwrap_or(name).to_string(),
                key_pair_id: kp.key_pair_id().map(String::from),
                fingerprint: kp.key_fingerprint().map(String::from),
            })
            .ok_or_else(|| KeyPairError::NotFound(name.to_string()))
    }

    async fn create(&self, name: &str, tags: &[(String, String)]) -> KeyPairResult<CreatedKeyPair> {
        let tags: Vec<Tag> = tags
            .iter()
            .map(|(k, v)| Tag::builder().key(k).value(v).build())
            .collect();

        let resp = self
            .client
            .create_key_pair()
            .key_name(name)
            .key_type(KeyType::Rsa)
            .tag_specifications(
                TagSpecification::builder()
                    .resource_type(ResourceType::KeyPair)
                    .set_tags(Some(tags))
                    .build(),
            )
            .send()
            .await
            .map_err(|err| {
                let err = err.into_service_error();
                classify(name, err.code(), err.message())
            })?;

        let material = resp
            .key_material()
            .ok_or_else(|| KeyPairError::MissingMaterial(name.to_string()))?
            .to_string();

        Ok(CreatedKeyPair {
            info: KeyPairInfo {
                name: resp.key_name().unwrap_or(name).to_string(),
                key_pair_id: resp.key_pair_id().map(String::from),
                fingerprint: resp.key_fingerprint().map(String::from),
            },
            material,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_not_found() {
        let err = classify("k", Some("InvalidKeyPair.NotFound"), Some("gone"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_classify_other_errors_are_fatal() {
        let err = classify("k", Some("UnauthorizedOperation"), Some("denied"));
        assert!(matches!(err, KeyPairError::Api { ref code, .. } if code == "UnauthorizedOperation"));
    }
}

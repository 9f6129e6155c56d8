//! The KMS key that encrypts database storage.

use serde_json::json;

use super::access::{PolicyDocument, PolicyStatement, Principal};
use super::{StackContext, StackDescriptor, StackKind};
use crate::config::EncryptionKeyConfig;
use crate::error::{Error, Result};
use crate::template::intrinsics::reference;
use crate::template::{DeletionPolicy, ExportRef, Output, Resource, ResourceType, Stack};

const KEY_ID: &str = "Key";

/// Actions granted to the key administrator role.
pub const KEY_ADMIN_ACTIONS: [&str; 14] = [
    "kms:Create*",
    "kms:Describe*",
    "kms:Enable*",
    "kms:List*",
    "kms:Put*",
    "kms:Update*",
    "kms:Revoke*",
    "kms:Disable*",
    "kms:Get*",
    "kms:Delete*",
    "kms:TagResource",
    "kms:UntagResource",
    "kms:ScheduleKeyDeletion",
    "kms:CancelKeyDeletion",
];

/// Exports of the encryption key stack.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyOutputs {
    pub key_id: ExportRef,
}

pub struct EncryptionKeyDescriptor<'a> {
    ctx: &'a StackContext,
    config: &'a EncryptionKeyConfig,
}

impl<'a> EncryptionKeyDescriptor<'a> {
    pub fn new(ctx: &'a StackContext, config: &'a EncryptionKeyConfig) -> Self {
        Self { ctx, config }
    }

    /// Alias name without the `alias/` prefix.
    pub fn key_name(&self) -> String {
        self.config
            .name
            .clone()
            .unwrap_or_else(|| self.ctx.resource_name("key"))
    }

    fn key_policy(&self) -> PolicyDocument {
        PolicyDocument::new()
            .statement(
                PolicyStatement::allow()
                    .sid("Enable IAM User Permissions")
                    .principal(Principal::Aws(self.ctx.iam_arn("root")))
                    .action("kms:*")
                    .resource("*"),
            )
            .statement(
                PolicyStatement::allow()
                    .sid("Allow access for Key Administrators")
                    .principal(Principal::Aws(
                        self.ctx.iam_arn(&format!("role/{}", self.config.admin_role)),
                    ))
                    .actions(KEY_ADMIN_ACTIONS)
                    .resource("*"),
            )
    }
}

impl StackDescriptor for EncryptionKeyDescriptor<'_> {
    type Outputs = KeyOutputs;

    fn kind(&self) -> StackKind {
        StackKind::EncryptionKey
    }

    fn declare(&self) -> Result<(Stack, KeyOutputs)> {
        let ctx = self.ctx;
        let pending_window = self.config.pending_window_days;
        if !(7..=30).contains(&pending_window) {
            return Err(Error::invalid_config(
                "encryption_key.pending_window_days",
                format!("{} is not between 7 and 30", pending_window),
            ));
        }

        let mut stack = Stack::new(&ctx.stack_id, StackKind::EncryptionKey)
            .with_description(format!("Encryption key for {}", ctx.stack_id));

        stack.add_resource(
            Resource::new(
                KEY_ID,
                ResourceType::KmsKey,
                json!({
                    "Description": self.config.description,
                    "Enabled": true,
                    "EnableKeyRotation": true,
                    "KeySpec": "SYMMETRIC_DEFAULT",
                    "KeyUsage": "ENCRYPT_DECRYPT",
                    "PendingWindowInDays": pending_window,
                    "KeyPolicy": self.key_policy().to_json(),
                }),
            )
            .with_deletion_policy(DeletionPolicy::Retain),
        )?;
        stack.add_resource(Resource::new(
            "KeyAlias",
            ResourceType::KmsAlias,
            json!({
                "AliasName": format!("alias/{}", self.key_name()),
                "TargetKeyId": reference(KEY_ID),
            }),
        ))?;

        let key_id = ExportRef::new(&ctx.stack_id, ctx.export_name("KeyId"));
        stack.add_output(Output::exported(
            "OutputKMSKey",
            &key_id.export_name,
            reference(KEY_ID),
        ))?;

        Ok((stack, KeyOutputs { key_id }))
    }
}

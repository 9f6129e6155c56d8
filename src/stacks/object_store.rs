//! Versioned, private object storage for database backups.

use serde_json::json;

use super::{StackContext, StackDescriptor, StackKind};
use crate::config::ObjectStoreConfig;
use crate::error::Result;
use crate::naming;
use crate::template::intrinsics::reference;
use crate::template::{DeletionPolicy, ExportRef, Output, Resource, ResourceType, Stack};

const BUCKET_ID: &str = "S3Bucket";

/// Days before incomplete multipart uploads are aborted.
pub const ABORT_INCOMPLETE_UPLOAD_DAYS: u32 = 3;

/// Days before objects move to Glacier.
pub const GLACIER_TRANSITION_DAYS: u32 = 90;

/// Exports of the object store stack.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectStoreOutputs {
    pub bucket_name: ExportRef,
}

pub struct ObjectStoreDescriptor<'a> {
    ctx: &'a StackContext,
    config: &'a ObjectStoreConfig,
}

impl<'a> ObjectStoreDescriptor<'a> {
    pub fn new(ctx: &'a StackContext, config: &'a ObjectStoreConfig) -> Self {
        Self { ctx, config }
    }

    /// Configured name, else `<project>-<environment>-backup`.
    pub fn bucket_name(&self) -> String {
        self.config.bucket_name.clone().unwrap_or_else(|| {
            naming::stack_id(&self.ctx.project, &self.ctx.environment, "backup")
        })
    }
}

impl StackDescriptor for ObjectStoreDescriptor<'_> {
    type Outputs = ObjectStoreOutputs;

    fn kind(&self) -> StackKind {
        StackKind::ObjectStore
    }

    fn declare(&self) -> Result<(Stack, ObjectStoreOutputs)> {
        let ctx = self.ctx;
        let bucket_name = self.bucket_name();

        let mut stack = Stack::new(&ctx.stack_id, StackKind::ObjectStore)
            .with_description(format!("Backup bucket for {}", ctx.stack_id));

        // Public access blocks are fixed, not configurable
        stack.add_resource(
            Resource::new(
                BUCKET_ID,
                ResourceType::Bucket,
                json!({
                    "BucketName": bucket_name,
                    "VersioningConfiguration": { "Status": "Enabled" },
                    "PublicAccessBlockConfiguration": {
                        "BlockPublicAcls": true,
                        "BlockPublicPolicy": true,
                        "IgnorePublicAcls": true,
                        "RestrictPublicBuckets": true,
                    },
                    "LifecycleConfiguration": {
                        "Rules": [
                            {
                                "Id": "abort-incomplete-multipart-upload",
                                "Status": "Enabled",
                                "AbortIncompleteMultipartUpload": {
                                    "DaysAfterInitiation": ABORT_INCOMPLETE_UPLOAD_DAYS,
                                },
                            },
                            {
                                "Id": "transitions-to-glacier",
                                "Status": "Enabled",
                                "Transitions": [{
                                    "StorageClass": "GLACIER",
                                    "TransitionInDays": GLACIER_TRANSITION_DAYS,
                                }],
                                "NoncurrentVersionTransitions": [{
                                    "StorageClass": "GLACIER",
                                    "TransitionInDays": GLACIER_TRANSITION_DAYS,
                                }],
                            },
                        ],
                    },
                }),
            )
            .with_deletion_policy(DeletionPolicy::Destroy),
        )?;

        let export = ExportRef::new(&ctx.stack_id, ctx.export_name("BucketName"));
        stack.add_output(Output::exported(
            "OutputS3BucketName",
            &export.export_name,
            reference(BUCKET_ID),
        ))?;

        tracing::debug!(stack = %ctx.stack_id, bucket = %bucket_name, "declared bucket");
        Ok((stack, ObjectStoreOutputs { bucket_name: export }))
    }
}

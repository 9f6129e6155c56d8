//! Instance-type command - resolve a `family.size` token.

use super::CommandContext;
use anyhow::Result;
use clap::Parser;
use serde_json::json;
use stacksmith::stacks::InstanceType;

/// Arguments for the instance-type command
#[derive(Parser, Debug, Clone)]
pub struct InstanceTypeArgs {
    /// Instance type token, e.g. m5.2xlarge
    pub instance_type: String,
}

impl InstanceTypeArgs {
    /// Execute the instance-type command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let resolved = match InstanceType::resolve(&self.instance_type) {
            Ok(resolved) => resolved,
            Err(e) => {
                ctx.output.error(&e.to_string());
                return Ok(1);
            }
        };

        let doc = json!({
            "input": self.instance_type,
            "family": resolved.family.name(),
            "size": resolved.size.name(),
            "instance_type": resolved.to_string(),
            "db_instance_class": resolved.db_instance_class(),
        });
        if ctx.output.document(&doc)? {
            return Ok(0);
        }

        ctx.output.table(
            &["Field", "Value"],
            &[
                vec!["family".to_string(), resolved.family.name().to_string()],
                vec!["size".to_string(), resolved.size.name()],
                vec!["instance type".to_string(), resolved.to_string()],
                vec!["db instance class".to_string(), resolved.db_instance_class()],
            ],
        );
        Ok(0)
    }
}

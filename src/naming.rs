//! Naming conventions for stacks, resources and exports.
//!
//! Every physical name and export name that Stacksmith emits is built here, so
//! that the importing side of a cross-stack reference always computes the same
//! string as the exporting side.
//!
//! | Function | Input | Output |
//! |----------|-------|--------|
//! | [`project_slug`] | `"Data Platform"` | `"data-platform"` |
//! | [`stack_id`] | `("shop", "dev", "rds")` | `"shop-dev-rds"` |
//! | [`resource_name`] | `("shop-dev-ec2", "app sg")` | `"shop-dev-ec2-app-sg"` |
//! | [`export_name`] | `"shop-dev-s3"` | `"ShopDevS3"` |
//! | [`parent_export_prefix`] | `"shop-dev-rds"` | `"ShopDev"` |
//! | [`keypair_name`] | `("shop", "dev", 2024-03-01)` | `"shop-dev-20240301-key"` |

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

/// Stack names accepted by the provisioning engine.
static STACK_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9-]{0,127}$").expect("Invalid stack id regex")
});

/// Logical ids inside a template: alphanumeric only.
static LOGICAL_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9]{0,254}$").expect("Invalid logical id regex")
});

/// Lowercase a project name and replace spaces with hyphens.
pub fn project_slug(project: &str) -> String {
    project.trim().to_lowercase().replace(' ', "-")
}

/// Join project, environment and stack suffix into a stack id.
pub fn stack_id(project: &str, environment: &str, suffix: &str) -> String {
    [project, environment, suffix].join("-")
}

/// Build a physical resource name scoped to a stack.
///
/// Spaces in the label become hyphens.
pub fn resource_name(stack_id: &str, label: &str) -> String {
    format!("{}-{}", stack_id, label.replace(' ', "-"))
}

/// Title-case a string: a letter is uppercased when it does not follow another
/// letter, every other letter is lowercased. Non-letters are kept as they are.
///
/// `"shop-dev-ec2"` becomes `"Shop-Dev-Ec2"`, `"a1b"` becomes `"A1B"`.
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_letter = false;
    for c in value.chars() {
        if c.is_alphabetic() {
            if prev_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_letter = true;
        } else {
            out.push(c);
            prev_letter = false;
        }
    }
    out
}

/// Export name prefix for a stack: title-cased with hyphens removed.
pub fn export_name(stack_id: &str) -> String {
    title_case(stack_id).replace('-', "")
}

/// Export name of a value exported by a stack.
pub fn stack_export(stack_id: &str, suffix: &str) -> String {
    format!("{}{}", export_name(stack_id), suffix)
}

/// Export prefix shared by all stacks of the same project and environment.
///
/// The last hyphen-separated segment of the stack id is dropped before the
/// id is turned into an export name.
pub fn parent_export_prefix(stack_id: &str) -> String {
    let parent = stack_id
        .rsplit_once('-')
        .map(|(parent, _)| parent)
        .unwrap_or(stack_id);
    export_name(parent)
}

/// Name of the keypair for a project, environment and day.
pub fn keypair_name(project: &str, environment: &str, date: NaiveDate) -> String {
    [
        project,
        environment,
        &date.format("%Y%m%d").to_string(),
        "key",
    ]
    .join("-")
}

/// Check that a stack id can be used as a stack name by the provisioning engine.
pub fn validate_stack_id(stack_id: &str) -> Result<()> {
    if STACK_ID_REGEX.is_match(stack_id) {
        Ok(())
    } else {
        Err(Error::InvalidName(stack_id.to_string()))
    }
}

/// Check that `logical_id` can name a resource inside a template.
pub fn validate_logical_id(logical_id: &str) -> Result<()> {
    if LOGICAL_ID_REGEX.is_match(logical_id) {
        Ok(())
    } else {
        Err(Error::InvalidName(logical_id.to_string()))
    }
}

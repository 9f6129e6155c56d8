//! Instance type resolution.
//!
//! Instance types are written as `<family><generation>.<size>` (`m5.2xlarge`).
//! Both tokens are checked against closed tables; the size token is normalized
//! first so that a leading multiplier moves to the end (`2xlarge` -> `xlarge2`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Instance family and generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceClass {
    /// `t2`
    Burstable2,
    /// `m4`
    Standard4,
    /// `m5`
    Standard5,
}

impl InstanceClass {
    pub const ALL: [InstanceClass; 3] = [
        InstanceClass::Burstable2,
        InstanceClass::Standard4,
        InstanceClass::Standard5,
    ];

    /// The class token as written in an instance type.
    pub fn token(&self) -> &'static str {
        match self {
            InstanceClass::Burstable2 => "t2",
            InstanceClass::Standard4 => "m4",
            InstanceClass::Standard5 => "m5",
        }
    }

    /// Table name of the class (`STANDARD5`).
    pub fn name(&self) -> &'static str {
        match self {
            InstanceClass::Burstable2 => "BURSTABLE2",
            InstanceClass::Standard4 => "STANDARD4",
            InstanceClass::Standard5 => "STANDARD5",
        }
    }
}

impl FromStr for InstanceClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.token() == s)
            .ok_or_else(|| Error::UnknownInstanceClass(s.to_string()))
    }
}

impl fmt::Display for InstanceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Instance size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceSize {
    Nano,
    Micro,
    Small,
    Medium,
    Large,
    Xlarge,
    Xlarge2,
    Xlarge3,
    Xlarge4,
    Xlarge8,
    Metal,
}

impl InstanceSize {
    pub const ALL: [InstanceSize; 11] = [
        InstanceSize::Nano,
        InstanceSize::Micro,
        InstanceSize::Small,
        InstanceSize::Medium,
        InstanceSize::Large,
        InstanceSize::Xlarge,
        InstanceSize::Xlarge2,
        InstanceSize::Xlarge3,
        InstanceSize::Xlarge4,
        InstanceSize::Xlarge8,
        InstanceSize::Metal,
    ];

    /// Normalized table key (`xlarge2`).
    pub fn key(&self) -> &'static str {
        match self {
            InstanceSize::Nano => "nano",
            InstanceSize::Micro => "micro",
            InstanceSize::Small => "small",
            InstanceSize::Medium => "medium",
            InstanceSize::Large => "large",
            InstanceSize::Xlarge => "xlarge",
            InstanceSize::Xlarge2 => "xlarge2",
            InstanceSize::Xlarge3 => "xlarge3",
            InstanceSize::Xlarge4 => "xlarge4",
            InstanceSize::Xlarge8 => "xlarge8",
            InstanceSize::Metal => "metal",
        }
    }

    /// The size as written in an instance type (`2xlarge`).
    pub fn api_token(&self) -> &'static str {
        match self {
            InstanceSize::Xlarge2 => "2xlarge",
            InstanceSize::Xlarge3 => "3xlarge",
            InstanceSize::Xlarge4 => "4xlarge",
            InstanceSize::Xlarge8 => "8xlarge",
            other => other.key(),
        }
    }

    /// Table name of the size (`XLARGE2`).
    pub fn name(&self) -> String {
        self.key().to_uppercase()
    }
}

impl FromStr for InstanceSize {
    type Err = Error;

    /// Accepts both the written form and the normalized key.
    fn from_str(s: &str) -> Result<Self> {
        let key = normalize_size(s);
        Self::ALL
            .iter()
            .copied()
            .find(|size| size.key() == key)
            .ok_or_else(|| Error::UnknownInstanceSize(s.to_string()))
    }
}

impl fmt::Display for InstanceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Move a leading digit of a size token to the end: `2xlarge` -> `xlarge2`.
///
/// Tokens without a leading digit are returned unchanged, so normalizing twice
/// gives the same result as normalizing once.
pub fn normalize_size(size: &str) -> String {
    let mut chars = size.chars();
    match chars.next() {
        Some(first) if first.is_ascii_digit() => {
            let mut normalized: String = chars.collect();
            normalized.push(first);
            normalized
        }
        _ => size.to_string(),
    }
}

/// A resolved instance type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceType {
    pub family: InstanceClass,
    pub size: InstanceSize,
}

impl InstanceType {
    pub fn new(family: InstanceClass, size: InstanceSize) -> Self {
        Self { family, size }
    }

    /// Resolve `<class>.<size>`.
    pub fn resolve(value: &str) -> Result<Self> {
        let (class_token, size_token) = value
            .split_once('.')
            .filter(|(_, size)| !size.contains('.'))
            .ok_or_else(|| Error::UnknownInstanceClass(value.to_string()))?;

        let family = class_token.parse::<InstanceClass>()?;
        let size = size_token.parse::<InstanceSize>()?;
        Ok(Self { family, size })
    }

    /// Instance class for a managed database (`db.m5.2xlarge`).
    pub fn db_instance_class(&self) -> String {
        format!("db.{}", self)
    }
}

impl FromStr for InstanceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::resolve(s)
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.family.token(), self.size.api_token())
    }
}

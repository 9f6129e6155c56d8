//! Tag propagation.
//!
//! Every taggable resource of a composed stack carries the configured tag set
//! plus exactly one category tag naming the stack's kind. Empty values become
//! a single space: the engine rejects absent tag values.

use indexmap::IndexMap;

use crate::stacks::StackKind;
use crate::template::Stack;

/// Key of the per-stack category tag.
pub const CATEGORY_TAG_KEY: &str = "application";

/// Value written for a tag configured without a value.
pub const EMPTY_TAG_VALUE: &str = " ";

/// The uniform tag set applied to every stack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagSet {
    tags: IndexMap<String, String>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configured tags; `None` and empty values become `" "`.
    pub fn from_config(tags: &IndexMap<String, Option<String>>) -> Self {
        let tags = tags
            .iter()
            .map(|(k, v)| (k.clone(), normalize_value(v.as_deref())))
            .collect();
        Self { tags }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl AsRef<str>) {
        self.tags
            .insert(key.into(), normalize_value(Some(value.as_ref())));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The tags for a stack of `kind`: this set plus the category tag.
    pub fn for_stack(&self, kind: StackKind) -> TagSet {
        let mut tags = self.clone();
        tags.tags
            .insert(CATEGORY_TAG_KEY.to_string(), kind.category().to_string());
        tags
    }

    /// Tag every resource of `stack`.
    ///
    /// Resource-specific tags (such as `Name`) are kept unless the configured
    /// set uses the same key; the category tag always wins.
    pub fn apply(&self, stack: &mut Stack) {
        let tags = self.for_stack(stack.kind);
        let stack_id = stack.id.clone();
        let mut tagged = 0usize;
        for resource in stack.resources_mut() {
            for (key, value) in tags.iter() {
                resource.tags.insert(key.to_string(), value.to_string());
            }
            tagged += 1;
        }
        tracing::debug!(stack = %stack_id, resources = tagged, tags = tags.len(), "propagated tags");
    }

    /// Tags as `[(key, value)]`, e.g. for keypair tag specifications.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.tags
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

fn normalize_value(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => EMPTY_TAG_VALUE.to_string(),
    }
}

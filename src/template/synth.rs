//! Writes a resource graph to disk for the provisioning engine.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

use super::ResourceGraph;

/// File name of the manifest written next to the templates.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Writes one template per stack plus a manifest.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    out_dir: PathBuf,
}

impl Synthesizer {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Write every stack template and the manifest, returning the written paths.
    pub fn write(&self, graph: &ResourceGraph) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.out_dir)?;

        let mut written = Vec::with_capacity(graph.stacks.len() + 1);
        for stack in &graph.stacks {
            let path = self.out_dir.join(format!("{}.template.json", stack.id));
            let body = serde_json::to_string_pretty(&stack.to_template())?;
            fs::write(&path, body)?;
            tracing::info!(stack = %stack.id, path = %path.display(), "wrote template");
            written.push(path);
        }

        let manifest_path = self.out_dir.join(MANIFEST_FILE);
        fs::write(
            &manifest_path,
            serde_json::to_string_pretty(&graph.to_manifest())?,
        )?;
        tracing::info!(path = %manifest_path.display(), "wrote manifest");
        written.push(manifest_path);

        Ok(written)
    }
}

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use weir_contracts::WEIR_CHAIN_MANIFEST_SCHEMA_VERSION;

/// One interceptor stage in a chain manifest. Stages are listed
/// outermost-first; fields beyond `interceptor` configure the named kind
/// and are ignored by the others.
#[derive(Debug, Clone, Deserialize)]
pub struct StageSpec {
    pub interceptor: String,
    /// Trace: syscall names to trace (defaults to the whole supported set).
    #[serde(default)]
    pub syscalls: Option<Vec<String>>,
    /// Filesystem: seed manifest to preload before any cell runs.
    #[serde(default)]
    pub seeds: Option<PathBuf>,
    /// Filesystem: audit artifact override.
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
    /// Filesystem: chunk arena cap.
    #[serde(default)]
    pub max_chunks: Option<usize>,
    /// Screen: magic prefix that rejects an open (defaults to "MZ").
    #[serde(default)]
    pub magic: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainManifest {
    pub schema_version: String,
    #[serde(default)]
    pub stages: Vec<StageSpec>,
    /// Built-in cell scenario name the runner should execute.
    pub cell: String,
}

pub fn load_chain_manifest(path: &Path) -> Result<ChainManifest> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("read chain manifest: {}", path.display()))?;
    let manifest: ChainManifest = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse chain manifest JSON: {}", path.display()))?;
    if manifest.schema_version != WEIR_CHAIN_MANIFEST_SCHEMA_VERSION {
        anyhow::bail!(
            "unsupported chain manifest schema_version: {:?} (expected {})",
            manifest.schema_version,
            WEIR_CHAIN_MANIFEST_SCHEMA_VERSION
        );
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_parses_and_checks_its_schema() {
        let raw = format!(
            r#"{{
              "schema_version": "{WEIR_CHAIN_MANIFEST_SCHEMA_VERSION}",
              "stages": [
                {{"interceptor": "trace", "syscalls": ["OPEN", "READ"]}},
                {{"interceptor": "fs", "max_chunks": 64}}
              ],
              "cell": "fs-check"
            }}"#
        );
        let manifest: ChainManifest = serde_json::from_str(&raw).unwrap();
        assert_eq!(manifest.stages.len(), 2);
        assert_eq!(manifest.stages[0].interceptor, "trace");
        assert_eq!(manifest.stages[1].max_chunks, Some(64));
        assert_eq!(manifest.cell, "fs-check");
    }

    #[test]
    fn wrong_schema_version_is_rejected() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("weir_chain_manifest_{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"schema_version":"weir.chain.manifest@9.9.9","stages":[],"cell":"fs-check"}"#,
        )
        .unwrap();

        let err = load_chain_manifest(&path).unwrap_err();
        assert!(err.to_string().contains("schema_version"));
        let _ = std::fs::remove_file(&path);
    }
}

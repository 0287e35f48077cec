use std::path::Path;

use anyhow::{Context, Result};
use base64::Engine as _;
use serde::Deserialize;
use sha2::{Digest as _, Sha256};

use crate::fs::Imfs;
use weir_contracts::WEIR_SEED_MANIFEST_SCHEMA_VERSION;

/// One object to install before any cell runs. Content comes inline
/// (base64) or from a host file; either way an optional `sha256:<64-hex>`
/// digest is verified before the bytes are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedFile {
    pub path: String,
    #[serde(default)]
    pub content_b64: Option<String>,
    #[serde(default)]
    pub source: Option<std::path::PathBuf>,
    #[serde(default)]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedManifest {
    pub schema_version: String,
    #[serde(default)]
    pub files: Vec<SeedFile>,
}

pub fn load_seed_manifest(path: &Path) -> Result<SeedManifest> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("read seed manifest: {}", path.display()))?;
    let manifest: SeedManifest = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse seed manifest JSON: {}", path.display()))?;
    if manifest.schema_version != WEIR_SEED_MANIFEST_SCHEMA_VERSION {
        anyhow::bail!(
            "unsupported seed manifest schema_version: {:?} (expected {})",
            manifest.schema_version,
            WEIR_SEED_MANIFEST_SCHEMA_VERSION
        );
    }
    Ok(manifest)
}

/// Install every seed entry into `fs` through the normal open/write path.
/// Returns the number of objects installed. Must run to completion before
/// the first cell can open anything.
pub fn install_seeds(fs: &mut Imfs, manifest: &SeedManifest) -> Result<usize> {
    for seed in &manifest.files {
        let bytes = seed_bytes(seed)?;
        if let Some(expected) = &seed.sha256 {
            verify_seed_digest(&seed.path, expected, &bytes)?;
        }

        let fd = fs
            .open(
                &seed.path,
                libc::O_CREAT | libc::O_WRONLY | libc::O_TRUNC,
                0o644,
            )
            .map_err(|e| anyhow::anyhow!("seed open {:?}: {e}", seed.path))?;
        fs.write(fd, &bytes)
            .map_err(|e| anyhow::anyhow!("seed write {:?}: {e}", seed.path))?;
        fs.close(fd)
            .map_err(|e| anyhow::anyhow!("seed close {:?}: {e}", seed.path))?;
    }
    Ok(manifest.files.len())
}

fn seed_bytes(seed: &SeedFile) -> Result<Vec<u8>> {
    match (&seed.content_b64, &seed.source) {
        (Some(b64), None) => base64::engine::general_purpose::STANDARD
            .decode(b64)
            .with_context(|| format!("decode inline content for {:?}", seed.path)),
        (None, Some(source)) => std::fs::read(source)
            .with_context(|| format!("read seed source: {}", source.display())),
        (Some(_), Some(_)) => {
            anyhow::bail!(
                "seed {:?} sets both content_b64 and source; pick one",
                seed.path
            )
        }
        (None, None) => anyhow::bail!("seed {:?} has neither content_b64 nor source", seed.path),
    }
}

fn verify_seed_digest(path: &str, expected: &str, bytes: &[u8]) -> Result<()> {
    let expected = normalize_sha256_digest(expected)?;
    let got = format!("sha256:{:x}", Sha256::digest(bytes));
    if got != expected {
        anyhow::bail!("seed digest mismatch for {path:?}: expected {expected:?}, got {got:?}");
    }
    Ok(())
}

fn looks_like_sha256_digest(s: &str) -> bool {
    let s = s.trim();
    if !s.starts_with("sha256:") {
        return false;
    }
    let hex = &s["sha256:".len()..];
    hex.len() == 64 && hex.as_bytes().iter().all(|b| b.is_ascii_hexdigit())
}

fn normalize_sha256_digest(raw: &str) -> Result<String> {
    let s = raw.trim();
    if !looks_like_sha256_digest(s) {
        anyhow::bail!("invalid digest {raw:?} (expected sha256:<64-hex>)");
    }
    Ok(s.to_ascii_lowercase())
}

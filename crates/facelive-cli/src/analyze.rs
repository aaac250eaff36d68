//! `facelive analyze`: score a single landmark set and print its verdict.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use facelive_core::{FaceLandmarks, LivelinessAnalyzer, LivelinessVerdict};
use facelive_session::Config;

pub fn run(path: &Path, width: u32, height: u32) -> Result<()> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    println!("{}", verdict_for(&raw, width, height)?);
    Ok(())
}

fn verdict_for(raw: &str, width: u32, height: u32) -> Result<String> {
    let face: FaceLandmarks = serde_json::from_str(raw).context("invalid landmark JSON")?;
    tracing::debug!(points = face.len(), width, height, "analyzing landmarks");

    let analyzer = LivelinessAnalyzer::new(Config::from_env().liveliness());
    let face = analyzer
        .analyze(&face, width, height)
        .context("liveliness analysis failed")?;
    Ok(LivelinessVerdict::single(face).to_message()?)
}

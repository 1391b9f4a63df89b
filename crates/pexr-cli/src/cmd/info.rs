//! Info command

use anyhow::{Context, Result};
use pexr_core::bundle::Bootstrap;
use std::path::Path;

/// Print the bundle's `PEXR-INFO` document.
pub fn info(bundle: &Path) -> Result<i32> {
    let boot = Bootstrap::open(bundle).with_context(|| format!("Failed to open {}", bundle.display()))?;
    println!("{}", boot.info().to_json()?);
    Ok(0)
}

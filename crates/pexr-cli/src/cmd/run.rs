//! Run command, also the whole of `pexr-boot`.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::ops::Pipeline;
use crate::ui::ConsoleReporter;
use pexr_core::bundle::{Bootstrap, ProcessLauncher, RuntimeOptions, RuntimeResolver};
use pexr_core::types::Platform;
use pexr_core::{Reporter, Settings};

/// Warning for a bundle built for `built_for` that is about to run on `host`.
pub fn platform_warning(built_for: &str, host: &Platform) -> Option<String> {
    let host = host.to_string();
    (!built_for.is_empty() && built_for != host)
        .then(|| format!("Running a bundle built for {built_for} on {host}; binary distributions may not load"))
}

/// Activate `bundle` and run it with `args`.
pub async fn run(bundle: &Path, args: &[String]) -> Result<i32> {
    let boot = Bootstrap::open(bundle).with_context(|| format!("Failed to open {}", bundle.display()))?;
    let options = RuntimeOptions::from_env()?;
    let reporter = Arc::new(ConsoleReporter::new(false));
    if let Some(warning) = platform_warning(&boot.info().build_properties.platform, &Platform::current()) {
        reporter.warning(&warning);
    }

    // Only dynamic requirements need the network at run time.
    let pipeline = if boot.info().requirements.iter().any(|r| r.dynamic) {
        let python = options
            .python
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .or_else(|| boot.info().interpreter.as_ref().map(|i| i.hashbang_name()));
        Some(Pipeline::new(
            &Settings::load()?,
            python.as_deref(),
            None,
            reporter,
        )?)
    } else {
        None
    };
    let resolver = pipeline.as_ref().map(|p| &p.resolver as &dyn RuntimeResolver);

    let code = boot.run(&options, resolver, &ProcessLauncher, args).await?;
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warns_only_on_a_different_platform() {
        let host = Platform {
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
        };
        assert_eq!(platform_warning("linux-x86_64", &host), None);
        assert_eq!(platform_warning("", &host), None);
        let warning = platform_warning("macosx-arm64", &host).unwrap();
        assert!(warning.contains("macosx-arm64") && warning.contains("linux-x86_64"));
    }
}

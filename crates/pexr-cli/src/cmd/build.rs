//! Build command

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::BuildArgs;
use crate::ops::{CliError, Pipeline};
use crate::ui::ConsoleReporter;
use pexr_core::bundle::{Bootstrap, BundleBuilder, ProcessLauncher, RuntimeOptions};
use pexr_core::types::{EntryPoint, Platform, Requirement};
use pexr_core::{Reporter, Settings};

/// Parse `-r` values, failing on the first bad one.
pub fn parse_requirements(specs: &[String]) -> Result<Vec<Requirement>, CliError> {
    specs
        .iter()
        .map(|spec| {
            spec.parse().map_err(|reason| CliError::InvalidRequirement {
                spec: spec.clone(),
                reason,
            })
        })
        .collect()
}

/// Resolve, freeze, and either write or run the bundle.
pub async fn build(args: &BuildArgs, verbose: bool) -> Result<i32> {
    let requirements = parse_requirements(&args.requirements)?;
    let entry_point = args
        .entry_point
        .as_deref()
        .map(str::parse::<EntryPoint>)
        .transpose()
        .context("Invalid entry point")?;
    let platform = args
        .platform
        .as_deref()
        .map(str::parse::<Platform>)
        .transpose()
        .context("Invalid platform")?;

    let settings = args.settings(Settings::load()?);
    let reporter = Arc::new(ConsoleReporter::new(verbose));
    let pipeline = Pipeline::new(&settings, args.python.as_deref(), platform, reporter.clone())?;

    let tmp = pexr_core::tmp_path();
    std::fs::create_dir_all(&tmp).with_context(|| format!("Failed to create {}", tmp.display()))?;
    let scratch = tempfile::Builder::new()
        .prefix("pexr-build-")
        .tempdir_in(&tmp)
        .context("Failed to create scratch directory")?;

    let mut local = Vec::new();
    for dir in &args.source_dirs {
        let package = pipeline.build_source_dir(dir, scratch.path()).await?;
        reporter.obtained(&package);
        local.push(package);
    }

    let mut roots = requirements;
    for package in &local {
        roots.extend(package.requires.iter().cloned());
    }
    let resolved = pipeline.resolver.resolve(&roots).await?;

    let mut builder = BundleBuilder::new(Some(pipeline.target.interpreter.clone()))
        .with_platform(pipeline.target.platform.clone());
    for package in local.iter().chain(&resolved) {
        builder.add_package(package)?;
    }
    builder.set_entry_point(entry_point)?;
    builder.set_zip_safe(args.zip_safe())?;
    builder.set_always_write_cache(args.always_write_cache)?;
    builder.set_ignore_errors(args.ignore_errors)?;
    builder.set_inherit_path(args.inherit_path)?;

    if let Some(output) = &args.output {
        builder.freeze(output)?;
        reporter.info(&format!(
            "Wrote {} ({} distributions)",
            output.display(),
            builder.info().distributions.len()
        ));
        return Ok(0);
    }

    if let Some(warning) = super::run::platform_warning(
        &pipeline.target.platform.to_string(),
        &Platform::current(),
    ) {
        reporter.warning(&warning);
    }
    let bundle = scratch.path().join("bundle.pexr");
    builder.freeze(&bundle)?;
    let mut options = RuntimeOptions::from_env()?;
    if options.python.is_none() {
        options.python = Some(pipeline.interpreter.binary.clone());
    }
    let code = Bootstrap::open(&bundle)?
        .run(&options, None, &ProcessLauncher, &args.args)
        .await?;
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::exit_code;

    #[test]
    fn bad_requirement_maps_to_its_exit_code() {
        let specs = vec!["foo>=1".to_string(), "[oops".to_string()];
        let err = parse_requirements(&specs).unwrap_err();
        assert!(matches!(err, CliError::InvalidRequirement { ref spec, .. } if spec == "[oops"));
        assert_eq!(exit_code(&err.into()), 100);
    }

    #[test]
    fn requirements_keep_order() {
        let specs = vec!["b".to_string(), "a[x]>=2".to_string()];
        let parsed = parse_requirements(&specs).unwrap();
        assert_eq!(parsed[0].name, "b");
        assert_eq!(parsed[1].extras, ["x"]);
    }
}

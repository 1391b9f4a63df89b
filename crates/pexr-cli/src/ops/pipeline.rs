//! Assembling fetchers, translators, cache, obtainer and resolver from
//! settings.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use pexr_core::cache::FsCache;
use pexr_core::fetcher;
use pexr_core::installer::{CachedInstaller, Installer, SetupPyInstaller};
use pexr_core::interpreter::PythonInterpreter;
use pexr_core::io::download::Downloader;
use pexr_core::obtainer::{FormatPolicy, Obtainer};
use pexr_core::resolver::Resolver;
use pexr_core::translator::{
    CachingTranslator, ChainedTranslator, EggTranslator, SourceTranslator, Translation, Translator,
    WheelTranslator,
};
use pexr_core::types::{Artifact, Location, Platform, Target};
use pexr_core::{Package, Reporter, Settings};

use super::error::CliError;

/// Everything a build needs, wired for one interpreter and platform.
pub struct Pipeline {
    /// Build interpreter.
    pub interpreter: PythonInterpreter,
    /// Interpreter and platform the bundle is built for.
    pub target: Target,
    /// Resolver over the configured repositories.
    pub resolver: Resolver,
    source_builder: Arc<dyn Installer>,
    binary: Arc<dyn Translator>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("interpreter", &self.interpreter)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Wire fetchers, translators, cache and resolver from `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if no interpreter is found or the HTTP client or a
    /// repository URL cannot be set up.
    pub fn new(
        settings: &Settings,
        python: Option<&str>,
        platform: Option<Platform>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self> {
        let interpreter = PythonInterpreter::find(python).context("Failed to locate a Python interpreter")?;
        let target = interpreter.target(platform.unwrap_or_else(Platform::current));
        tracing::debug!(%target, binary = %interpreter.binary.display(), "build target");

        let client = reqwest::Client::builder()
            .user_agent(pexr_core::USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;
        let cache = settings.cache_dir();
        let downloader = Downloader::new(client.clone(), cache.join("downloads"));

        let setup_py: Arc<dyn Installer> = Arc::new(
            SetupPyInstaller::new(&interpreter.binary)
                .wheels(settings.use_wheel)
                .timeout(settings.build_timeout())
                .log_dir(pexr_core::log_dir()),
        );

        let wheel: Arc<dyn Translator> =
            Arc::new(WheelTranslator::new(downloader.clone(), target.tag(), reporter.clone()));
        let egg: Arc<dyn Translator> =
            Arc::new(EggTranslator::new(downloader.clone(), target.tag(), reporter.clone()));
        let binary: Arc<dyn Translator> = Arc::new(ChainedTranslator::new(vec![wheel.clone(), egg.clone()]));

        let mut strategies = vec![wheel, egg];
        if settings.allow_builds {
            strategies.push(Arc::new(SourceTranslator::new(
                downloader,
                setup_py.clone(),
                binary.clone(),
                target.clone(),
                cache.join("work"),
                reporter.clone(),
            )));
        }
        let translator = Arc::new(CachingTranslator::new(
            Arc::new(ChainedTranslator::new(strategies)),
            Arc::new(FsCache::new(&cache)),
            target.tag(),
            reporter.clone(),
        ));

        let indices: &[String] = if settings.use_index { &settings.indices } else { &[] };
        let fetchers = fetcher::from_settings(&client, &settings.repos, indices)
            .context("Invalid repository configuration")?;

        let obtainer = Obtainer::new(fetchers, translator, target.tag(), cache.join("work"), reporter.clone())
            .with_policy(FormatPolicy {
                wheels: settings.use_wheel,
                eggs: true,
                sources: settings.allow_builds,
            });
        let resolver = Resolver::new(Arc::new(obtainer), target.marker_environment())
            .parallelism(settings.parallelism())
            .reporter(reporter);

        Ok(Self {
            source_builder: Arc::new(CachedInstaller::new(setup_py, cache.join("builds"), target.tag())),
            interpreter,
            target,
            resolver,
            binary,
        })
    }

    /// Build a project directory and install the result under `scratch`.
    pub async fn build_source_dir(&self, dir: &Path, scratch: &Path) -> Result<Package> {
        let failed = |reason: String| CliError::SourceBuild {
            dir: dir.to_path_buf(),
            reason,
        };
        let built = self
            .source_builder
            .build(dir, &self.target.interpreter)
            .await
            .map_err(|e| failed(e.to_string()))?;
        let artifact = Artifact::from_location(Location::Local(built.clone()))
            .ok_or_else(|| failed(format!("unrecognized build output {}", built.display())))?;

        let dest = scratch.join(&artifact.filename);
        match self.binary.translate(&artifact, &dest).await {
            Translation::Success(package) => Ok(package),
            Translation::NotApplicable => Err(failed(format!("cannot install {}", artifact.filename)).into()),
            Translation::Failure(e) => Err(failed(e.to_string()).into()),
        }
    }
}

//! pexr - self-contained Python application bundles
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! `pexr build` resolves requirements into installed packages, freezes them
//! with the application's code into a single executable file, and either
//! writes that file out or runs it straight away. `pexr run` and the
//! `pexr-boot` interpreter line execute an existing bundle.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.pexr/
//! ├── config.toml     # optional Settings
//! ├── cache/
//! │   ├── downloads/  # fetched artifacts
//! │   ├── installed/  # translated packages, one dir per cache key
//! │   └── builds/     # wheels built from --source-dir trees
//! ├── root/           # extracted bundles (install/, code/)
//! ├── logs/           # setup.py build logs
//! └── tmp/
//! ```

pub mod cmd;
pub mod ops;
pub mod ui;

use clap::{Args, Parser, Subcommand};
use pexr_core::Settings;
use std::path::PathBuf;

/// Build and run self-contained Python bundles
#[derive(Debug, Parser)]
#[command(name = "pexr")]
#[command(author, version)]
pub struct Cli {
    /// Verbose logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve requirements and freeze a bundle (or run it when no -o is given)
    Build(BuildArgs),
    /// Run an existing bundle
    Run {
        /// Bundle file
        bundle: PathBuf,
        /// Arguments for the bundle
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Print a bundle's metadata as JSON
    Info {
        /// Bundle file
        bundle: PathBuf,
    },
}

/// Flags of `pexr build`.
#[derive(Debug, Clone, Default, Args)]
pub struct BuildArgs {
    /// Requirement to include, e.g. 'requests>=2,<3' (repeatable)
    #[arg(short = 'r', long = "requirement")]
    pub requirements: Vec<String>,

    /// Local directory or find-links URL to search first (repeatable)
    #[arg(long = "repo")]
    pub repos: Vec<String>,

    /// Simple index base URL (repeatable; replaces the configured indices)
    #[arg(short = 'i', long = "index")]
    pub indices: Vec<String>,

    /// Do not consult any index
    #[arg(long)]
    pub no_index: bool,

    /// Do not accept wheels
    #[arg(long)]
    pub no_wheel: bool,

    /// Do not build source distributions
    #[arg(long)]
    pub no_build: bool,

    /// Interpreter to build for (name on PATH or path)
    #[arg(long, env = "PEXR_PYTHON")]
    pub python: Option<String>,

    /// Target platform, e.g. linux-x86_64 (default: this machine)
    #[arg(long)]
    pub platform: Option<String>,

    /// Import code directly from the bundle (default)
    #[arg(long, overrides_with = "not_zip_safe")]
    pub zip_safe: bool,

    /// Extract the bundle before running it
    #[arg(long, overrides_with = "zip_safe")]
    pub not_zip_safe: bool,

    /// Extract even when zip-safe
    #[arg(long)]
    pub always_write_cache: bool,

    /// Skip unsatisfied requirements at run time
    #[arg(long)]
    pub ignore_errors: bool,

    /// Let the bundle see the ambient PYTHONPATH and site-packages
    #[arg(long)]
    pub inherit_path: bool,

    /// Cache directory (default: ~/.pexr/cache)
    #[arg(long, env = "PEXR_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Write the bundle here instead of running it
    #[arg(short = 'o', long = "output-file")]
    pub output: Option<PathBuf>,

    /// Entry point: 'module' or 'module:callable'
    #[arg(short = 'e', long = "entry-point")]
    pub entry_point: Option<String>,

    /// Project directory with a setup.py to build and include (repeatable)
    #[arg(short = 's', long = "source-dir")]
    pub source_dirs: Vec<PathBuf>,

    /// Concurrent fetches per resolution round
    #[arg(short = 'j', long = "jobs")]
    pub jobs: Option<usize>,

    /// Arguments for the bundle when it is run immediately
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl BuildArgs {
    /// Whether the bundle is marked zip-safe.
    pub fn zip_safe(&self) -> bool {
        !self.not_zip_safe
    }

    /// Layer these flags over settings loaded from the config file.
    pub fn settings(&self, base: Settings) -> Settings {
        let mut repos = self.repos.clone();
        repos.extend(base.repos);
        Settings {
            indices: if self.indices.is_empty() {
                base.indices
            } else {
                self.indices.clone()
            },
            repos,
            use_index: base.use_index && !self.no_index,
            use_wheel: base.use_wheel && !self.no_wheel,
            allow_builds: base.allow_builds && !self.no_build,
            parallelism: self.jobs.unwrap_or(base.parallelism),
            cache_dir: self.cache_dir.clone().or(base.cache_dir),
            build_timeout_secs: base.build_timeout_secs,
        }
    }
}

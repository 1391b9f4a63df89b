//! pexr-boot - interpreter line for bundles (`#!/usr/bin/env pexr-boot`)
//!
//! Invoked as `pexr-boot <bundle> [args...]`.

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pexr_cli::cmd;
use pexr_cli::ops::exit_code;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut argv = std::env::args_os().skip(1);
    let Some(bundle) = argv.next().map(PathBuf::from) else {
        eprintln!("usage: pexr-boot <bundle> [args...]");
        std::process::exit(2);
    };
    let args: Vec<String> = argv.map(|a| a.to_string_lossy().into_owned()).collect();

    match cmd::run::run(&bundle, &args).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("pexr-boot: {err:#}");
            std::process::exit(exit_code(&err));
        }
    }
}

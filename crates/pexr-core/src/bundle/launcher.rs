//! Starting the interpreter for an activated bundle.

use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;

use super::bootstrap::Environment;
use crate::types::EntryPoint;

/// Failure to start the interpreter.
#[derive(Error, Debug)]
pub enum LaunchError {
    /// The interpreter could not be started.
    #[error("Failed to start {python}: {source}")]
    Spawn {
        /// Interpreter binary.
        python: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An import path contains the platform's path separator.
    #[error("Cannot build PYTHONPATH: {0}")]
    Path(#[from] std::env::JoinPathsError),
}

/// Runs an activated environment and reports the exit code.
pub trait Launcher: Send + Sync + std::fmt::Debug {
    /// Run `env` with `args` appended to the interpreter's arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if the interpreter cannot be started.
    fn launch(&self, env: &Environment, args: &[String]) -> Result<i32, LaunchError>;
}

/// Launches a Python child process and waits for it.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher;

/// `python -c` program that imports `module` and calls `callable`, exiting
/// with its return value.
fn callable_shim(entry_point: &EntryPoint, callable: &str) -> String {
    format!(
        "import functools, importlib, sys; \
         sys.exit(functools.reduce(getattr, {callable:?}.split('.'), importlib.import_module({module:?}))())",
        module = entry_point.module,
    )
}

impl ProcessLauncher {
    /// The command that would run `env`.
    ///
    /// Isolated environments disable site-packages with `-s -S`. Module entry
    /// points run with `-m`, callables through a small `-c` program, and no
    /// entry point leaves the interpreter interactive.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Path`] if an import path contains the platform
    /// path separator.
    pub fn command(&self, env: &Environment, args: &[String]) -> Result<Command, LaunchError> {
        let mut cmd = Command::new(&env.python);
        if env.isolated {
            cmd.args(["-s", "-S"]);
        }
        if let Some(entry_point) = &env.entry_point {
            match &entry_point.callable {
                Some(callable) => cmd.arg("-c").arg(callable_shim(entry_point, callable)),
                None => cmd.arg("-m").arg(&entry_point.module),
            };
        }
        cmd.args(args);
        cmd.env_remove("PYTHONPATH");
        cmd.env("PYTHONPATH", std::env::join_paths(&env.python_path)?);
        Ok(cmd)
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, env: &Environment, args: &[String]) -> Result<i32, LaunchError> {
        let mut cmd = self.command(env, args)?;
        tracing::debug!(command = ?cmd, "launching");
        let status = cmd.status().map_err(|source| LaunchError::Spawn {
            python: env.python.clone(),
            source,
        })?;
        // Killed by a signal: no code, report a generic failure.
        Ok(status.code().unwrap_or(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn env(entry_point: Option<&str>, isolated: bool) -> Environment {
        Environment {
            python: PathBuf::from("/usr/bin/python3"),
            python_path: vec![PathBuf::from("/r/code"), PathBuf::from("/r/install/foo")],
            entry_point: entry_point.map(|e| e.parse().unwrap()),
            isolated,
            skipped: Vec::new(),
        }
    }

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    fn pythonpath(cmd: &Command) -> Option<String> {
        cmd.get_envs()
            .find(|(k, _)| *k == OsStr::new("PYTHONPATH"))
            .and_then(|(_, v)| v)
            .map(|v| v.to_string_lossy().into_owned())
    }

    #[test]
    fn module_entry_point_uses_dash_m() {
        let cmd = ProcessLauncher
            .command(&env(Some("app.main"), true), &["--flag".to_string()])
            .unwrap();
        assert_eq!(args(&cmd), ["-s", "-S", "-m", "app.main", "--flag"]);
        assert_eq!(pythonpath(&cmd).unwrap(), "/r/code:/r/install/foo");
    }

    #[test]
    fn callable_entry_point_uses_shim() {
        let cmd = ProcessLauncher.command(&env(Some("app.cli:main"), false), &[]).unwrap();
        let argv = args(&cmd);
        assert_eq!(argv[0], "-c");
        assert!(argv[1].contains("importlib.import_module(\"app.cli\")"));
        assert!(argv[1].contains("\"main\".split('.')"));
    }

    #[test]
    fn no_entry_point_is_interactive() {
        let cmd = ProcessLauncher.command(&env(None, false), &["script.py".to_string()]).unwrap();
        assert_eq!(args(&cmd), ["script.py"]);
    }
}

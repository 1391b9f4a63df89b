//! Locating and probing the Python interpreter a bundle targets.

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

use crate::types::{InterpreterIdentity, Platform, Target};

const PROBE: &str = "import platform, sys; \
print(platform.python_implementation(), '.'.join(map(str, sys.version_info[:3])))";

/// Failure to locate or identify an interpreter.
#[derive(Error, Debug)]
pub enum InterpreterError {
    /// Nothing by that name or path.
    #[error("No Python interpreter found (looked for {0})")]
    NotFound(String),

    /// The binary could not be executed.
    #[error("Failed to run {path}: {source}")]
    Spawn {
        /// Interpreter binary.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The identity probe printed something unparseable.
    #[error("Unexpected identity from {path}: '{output}'")]
    BadIdentity {
        /// Interpreter binary.
        path: PathBuf,
        /// What it printed.
        output: String,
    },
}

/// An interpreter binary and the identity it reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonInterpreter {
    /// Path to the executable.
    pub binary: PathBuf,
    /// Implementation and version.
    pub identity: InterpreterIdentity,
}

impl PythonInterpreter {
    /// Find an interpreter by path or name on `PATH`; `None` tries `python3`
    /// then `python`.
    ///
    /// # Errors
    ///
    /// Returns [`InterpreterError::NotFound`] when nothing matches, or a probe
    /// error when the binary does not behave like Python.
    pub fn find(requested: Option<&str>) -> Result<Self, InterpreterError> {
        let names: Vec<&str> = match requested {
            Some(name) => vec![name],
            None => vec!["python3", "python"],
        };
        let binary = names
            .iter()
            .find_map(|name| {
                if name.contains(std::path::MAIN_SEPARATOR) {
                    let path = PathBuf::from(name);
                    path.is_file().then_some(path)
                } else {
                    which::which(name).ok()
                }
            })
            .ok_or_else(|| InterpreterError::NotFound(names.join(", ")))?;
        Self::probe(&binary)
    }

    /// Ask `binary` for its implementation and version.
    ///
    /// # Errors
    ///
    /// Returns an error if the binary cannot run or prints something
    /// unexpected.
    pub fn probe(binary: &Path) -> Result<Self, InterpreterError> {
        let output = Command::new(binary)
            .args(["-s", "-c", PROBE])
            .output()
            .map_err(|source| InterpreterError::Spawn {
                path: binary.to_path_buf(),
                source,
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let bad = || InterpreterError::BadIdentity {
            path: binary.to_path_buf(),
            output: stdout.clone(),
        };
        if !output.status.success() {
            return Err(bad());
        }
        let (implementation, version) = stdout.split_once(' ').ok_or_else(bad)?;
        let identity = format!("{implementation}-{version}")
            .parse()
            .map_err(|_| bad())?;
        tracing::debug!(binary = %binary.display(), %identity, "probed interpreter");
        Ok(Self {
            binary: binary.to_path_buf(),
            identity,
        })
    }

    /// Target for this interpreter on `platform`.
    pub fn target(&self, platform: Platform) -> Target {
        Target::new(platform, self.identity.clone())
    }
}

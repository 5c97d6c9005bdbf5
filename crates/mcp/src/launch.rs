//! Launch specification for a tool provider process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{Error, Result};

/// How to start a tool provider.
///
/// The executable must be an existing regular file whose extension is mapped
/// to an interpreter. The child never inherits the parent's environment; it
/// sees exactly the variables in `env`.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub executable: PathBuf,
    pub env: HashMap<String, String>,
    interpreters: HashMap<String, String>,
}

impl LaunchSpec {
    /// Create a spec with the default interpreter table and an empty
    /// environment.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        let interpreters = [("py", "python3"), ("js", "node"), ("sh", "sh")]
            .into_iter()
            .map(|(ext, program)| (ext.to_string(), program.to_string()))
            .collect();
        Self {
            executable: executable.into(),
            env: HashMap::new(),
            interpreters,
        }
    }

    /// Add one environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add many environment variables.
    pub fn envs<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Map a file extension (without the dot) to the program that runs it.
    pub fn interpreter(mut self, extension: impl Into<String>, program: impl Into<String>) -> Self {
        self.interpreters
            .insert(extension.into().to_ascii_lowercase(), program.into());
        self
    }

    /// Resolve the interpreter for the executable, validating the file.
    pub fn resolve(&self) -> Result<&str> {
        let path = self.executable.as_path();
        let metadata = std::fs::metadata(path)
            .map_err(|e| Error::Launch(format!("{}: {e}", path.display())))?;
        if !metadata.is_file() {
            return Err(Error::Launch(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let extension = extension_of(path).ok_or_else(|| {
            Error::Launch(format!("{} has no file extension", path.display()))
        })?;

        self.interpreters
            .get(&extension)
            .map(String::as_str)
            .ok_or_else(|| {
                Error::Launch(format!(
                    "unsupported provider type .{extension} (expected one of: {})",
                    self.known_extensions().join(", ")
                ))
            })
    }

    /// Build the command for this spec, with piped stdio and a cleared
    /// environment. On unix the provider leads a new process group so that
    /// everything it starts can be killed with it.
    pub(crate) fn command(&self) -> Result<Command> {
        let program = self.resolve()?;
        let mut cmd = Command::new(program);
        cmd.arg(&self.executable)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        Ok(cmd)
    }

    fn known_extensions(&self) -> Vec<String> {
        let mut known: Vec<String> = self.interpreters.keys().map(|e| format!(".{e}")).collect();
        known.sort();
        known
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

//! Durable environment variables
//!
//! Variables are persisted to an `environment.d`-style file of `KEY=VALUE`
//! lines, which login sessions pick up. After every durable write the
//! process environment is updated on the same call, so anything later in
//! the run observes the new value immediately.
//!
//! A deleted variable is recorded as an empty assignment (`KEY=`). Login
//! sessions then start with it empty, and [`PersistentEnv::get`] reports it
//! as absent even when the process inherited a value from elsewhere.

use anyhow::{Context, Result, bail};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Serializes writes to the process environment
static MIRROR: Mutex<()> = Mutex::new(());

/// Environment variable storage
pub trait EnvStore: Send + Sync + fmt::Debug {
    /// Current value, `None` if the variable does not exist
    fn get(&self, name: &str) -> Option<String>;

    /// Create or overwrite a variable
    fn set(&self, name: &str, value: &str) -> Result<()>;

    /// Delete a variable; deleting a missing variable is not an error
    fn remove(&self, name: &str) -> Result<()>;
}

/// Source for the value substituted into `%SystemRoot%`
pub trait SystemRootLookup: Send + Sync + fmt::Debug {
    fn system_root(&self) -> Option<String>;
}

/// Reads `SYSTEMROOT` from the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSystemRoot;

impl SystemRootLookup for EnvSystemRoot {
    fn system_root(&self) -> Option<String> {
        std::env::var("SYSTEMROOT")
            .ok()
            .filter(|root| !root.is_empty())
    }
}

/// Why `name` cannot be stored as a variable name, if it cannot
pub fn name_problem(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        Some("name is empty")
    } else if name.contains('=') {
        Some("name contains '='")
    } else if name.starts_with('#') {
        Some("name starts with '#'")
    } else if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        Some("name contains whitespace or control characters")
    } else {
        None
    }
}

/// Why `value` cannot be stored as a variable value, if it cannot
///
/// Each variable is one line of the file, and an empty value marks a
/// deleted variable.
pub fn value_problem(value: &str) -> Option<&'static str> {
    if value.is_empty() {
        Some("value is empty")
    } else if value.chars().any(|c| c.is_control() && c != '\t') {
        Some("value contains line breaks or control characters")
    } else {
        None
    }
}

fn check_name(name: &str) -> Result<()> {
    if let Some(problem) = name_problem(name) {
        bail!("Cannot store environment variable {name:?}: {problem}");
    }
    Ok(())
}

/// One `KEY=VALUE` line, or anything else kept verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Var { name: String, value: String },
    Other(String),
}

impl Line {
    fn parse(raw: &str) -> Self {
        let trimmed = raw.trim_start();
        if trimmed.starts_with('#') {
            return Self::Other(raw.to_string());
        }
        match trimmed.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => Self::Var {
                name: name.trim().to_string(),
                value: value.to_string(),
            },
            _ => Self::Other(raw.to_string()),
        }
    }

    fn is_var(&self, wanted: &str) -> bool {
        matches!(self, Self::Var { name, .. } if name == wanted)
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var { name, value } => write!(f, "{name}={value}"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

/// Environment persisted to a file and mirrored into the process
#[derive(Debug, Clone)]
pub struct PersistentEnv {
    file: PathBuf,
}

impl PersistentEnv {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into() }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    fn read_lines(&self) -> Result<Vec<Line>> {
        match fs::read_to_string(&self.file) {
            Ok(content) => Ok(content.lines().map(Line::parse).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read environment file: {}", self.file.display())),
        }
    }

    fn write_lines(&self, lines: &[Line]) -> Result<()> {
        if let Some(dir) = self.file.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }

        let mut content = lines.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n");
        content.push('\n');

        let staging = self.file.with_extension("conf.tmp");
        fs::write(&staging, content)
            .with_context(|| format!("Failed to write {}", staging.display()))?;
        fs::rename(&staging, &self.file)
            .with_context(|| format!("Failed to replace {}", self.file.display()))?;

        log::debug!("Wrote environment file {}", self.file.display());
        Ok(())
    }

    /// Value recorded in the file, if any
    fn persisted(&self, name: &str) -> Result<Option<String>> {
        Ok(self.read_lines()?.into_iter().find_map(|line| match line {
            Line::Var { name: n, value } if n == name => Some(value),
            _ => None,
        }))
    }
}

impl EnvStore for PersistentEnv {
    fn get(&self, name: &str) -> Option<String> {
        match self.persisted(name) {
            Ok(Some(value)) if value.is_empty() => None,
            Ok(Some(value)) => Some(value),
            Ok(None) => std::env::var(name).ok(),
            Err(e) => {
                log::warn!("{e:#}");
                std::env::var(name).ok()
            }
        }
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        check_name(name)?;
        if let Some(problem) = value_problem(value) {
            bail!("Cannot store environment variable {name}={value:?}: {problem}");
        }

        let mut lines = self.read_lines()?;
        let entry = Line::Var {
            name: name.to_string(),
            value: value.to_string(),
        };

        match lines.iter_mut().find(|line| line.is_var(name)) {
            Some(line) => *line = entry,
            None => lines.push(entry),
        }
        self.write_lines(&lines)?;

        let _guard = MIRROR.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        // SAFETY: resources are applied one at a time after probing has
        // finished, so no other thread reads the environment here
        unsafe { std::env::set_var(name, value) };
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        check_name(name)?;

        let mut lines = self.read_lines()?;
        let deleted = Line::Var {
            name: name.to_string(),
            value: String::new(),
        };

        let changed = match lines.iter_mut().find(|line| line.is_var(name)) {
            Some(line) if *line == deleted => false,
            Some(line) => {
                *line = deleted;
                true
            }
            // Only inherited; record the deletion so it does not come back
            None if std::env::var_os(name).is_some() => {
                lines.push(deleted);
                true
            }
            None => false,
        };
        if changed {
            self.write_lines(&lines)?;
        }

        let _guard = MIRROR.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        // SAFETY: see `set`
        unsafe { std::env::remove_var(name) };
        Ok(())
    }
}

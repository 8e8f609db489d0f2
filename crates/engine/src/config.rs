// Repository-local configuration: `<repo>/jobe.toml`, next to `HEAD` in the
// bare repository. A missing file means defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use jobe_common::descriptor::DESCRIPTOR_FILE;

pub const CONFIG_FILE: &str = "jobe.toml";

/// Path to the config file of the bare repository at `repo_path`.
pub fn config_path(repo_path: &Path) -> PathBuf {
    repo_path.join(CONFIG_FILE)
}

/// Settings shared by the hook handler, the dispatcher and the worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JobeConfig {
    /// Branch that accepts submissions.
    pub intake_branch: String,
    /// Descriptor file name at the root of a submission.
    pub descriptor_file: String,
    /// Worker log directory, relative to the repository.
    pub log_dir: PathBuf,
    /// Git executable.
    pub git_program: String,
    /// Shell used as `<shell> -c <run>`.
    pub shell: String,
    /// Worker binary. Falls back to `JOBE_BIN`, then the running executable.
    pub worker_program: Option<PathBuf>,
    /// Attempts at finding an unused job id before a push is rejected.
    pub max_id_attempts: usize,
    pub identity: IdentityConfig,
    pub results: ResultFiles,
}

impl Default for JobeConfig {
    fn default() -> Self {
        Self {
            intake_branch: "master".into(),
            descriptor_file: DESCRIPTOR_FILE.into(),
            log_dir: PathBuf::from("jobe-logs"),
            git_program: "git".into(),
            shell: "sh".into(),
            worker_program: None,
            max_id_attempts: 8,
            identity: IdentityConfig::default(),
            results: ResultFiles::default(),
        }
    }
}

impl JobeConfig {
    /// Load `<repo>/jobe.toml`. Returns defaults if the file doesn't exist;
    /// a file that exists but doesn't parse is an error.
    pub fn load(repo_path: &Path) -> Result<Self, ConfigError> {
        let path = config_path(repo_path);
        match Self::load_from(&path) {
            Err(ConfigError::Io(error)) if error.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    /// Absolute log directory for the repository at `repo_path`.
    pub fn log_dir_for(&self, repo_path: &Path) -> PathBuf {
        if self.log_dir.is_absolute() {
            self.log_dir.clone()
        } else {
            repo_path.join(&self.log_dir)
        }
    }
}

/// Author and committer used for reset and result commits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IdentityConfig {
    pub name: String,
    pub email: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self { name: "jobe".into(), email: "jobe@localhost".into() }
    }
}

/// Files written into the workspace by the worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResultFiles {
    /// Directory at the root of a job's tree holding every result file.
    /// Reserved: submissions that contain it are not run.
    pub dir: String,
    pub stdout: String,
    pub stderr: String,
    /// Exit-status marker.
    pub exit_code: String,
    /// Structured [`jobe_common::result::ResultRecord`].
    pub record: String,
}

impl Default for ResultFiles {
    fn default() -> Self {
        Self {
            dir: ".jobe".into(),
            stdout: "stdout.log".into(),
            stderr: "stderr.log".into(),
            exit_code: "exitcode.log".into(),
            record: "result.toml".into(),
        }
    }
}

impl ResultFiles {
    /// Tree path of the result file `name`, e.g. `.jobe/result.toml`.
    pub fn path(&self, name: &str) -> String {
        let dir = self.dir.trim_end_matches('/');
        if dir.is_empty() {
            name.to_string()
        } else {
            format!("{dir}/{name}")
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

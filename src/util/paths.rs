//! Where stackdeck keeps its config file and logs.
//!
//! The data directory is resolved once: `--data-dir` wins, then
//! `$STACKDECK_HOME`, then `~/.stackdeck`.

use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;

const HOME_ENV: &str = "STACKDECK_HOME";
const DIR_NAME: &str = ".stackdeck";

static ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Fix the data directory for the rest of the process. Later calls are
/// ignored.
pub fn init_data_dir(flag: Option<PathBuf>) {
    let root = resolve(flag, env_home(), dirs::home_dir());
    if let Err(rejected) = ROOT.set(root) {
        tracing::debug!(
            rejected = %rejected.display(),
            "Data directory already set, keeping the first one"
        );
    }
}

fn env_home() -> Option<PathBuf> {
    std::env::var_os(HOME_ENV).map(PathBuf::from)
}

fn resolve(flag: Option<PathBuf>, env: Option<PathBuf>, home: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| env.filter(|path| !path.as_os_str().is_empty()))
        .unwrap_or_else(|| home.unwrap_or_default().join(DIR_NAME))
}

pub fn data_dir() -> PathBuf {
    ROOT.get()
        .cloned()
        .unwrap_or_else(|| resolve(None, env_home(), dirs::home_dir()))
}

pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

pub fn log_file_path() -> PathBuf {
    logs_dir().join("stackdeck.log")
}

pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}

/// Create the logs directory if needed and return the log file path
pub fn ensure_log_file_path() -> io::Result<PathBuf> {
    std::fs::create_dir_all(logs_dir())?;
    Ok(log_file_path())
}

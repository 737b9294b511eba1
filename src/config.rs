use std::path::PathBuf;

/// Runtime configuration derived from the CLI.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the sync database. Created on first use.
    pub data_dir: PathBuf,
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_cli(cli: &crate::cli::Cli) -> Self {
        Self {
            data_dir: expand_tilde(&cli.data_dir),
        }
    }

    /// Path of the sync-device database inside the data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("sync-devices.db")
    }
}

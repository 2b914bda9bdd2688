use std::path::PathBuf;
use std::fs;
use crate::common::error::Result;
use crate::common::paths;

/// Chooses between the local `./dev_data` tree and the system paths.
#[derive(Debug, Clone)]
pub struct DevMode {
    enabled: bool,
    base_dir: PathBuf,
}

impl DevMode {
    pub fn new(enabled: bool) -> Result<Self> {
        Self::with_base_dir(enabled, PathBuf::from("./dev_data"))
    }

    pub fn with_base_dir(enabled: bool, base_dir: PathBuf) -> Result<Self> {
        if enabled {
            fs::create_dir_all(&base_dir)?;
            fs::create_dir_all(base_dir.join("signatures"))?;
            fs::create_dir_all(base_dir.join("uploads"))?;

            tracing::info!("Development mode enabled - data will be saved to: {}", base_dir.display());
        }

        Ok(Self { enabled, base_dir })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Unprivileged runs outside dev mode fall back to the per-user data directory.
    pub fn signatures_dir(&self) -> PathBuf {
        if self.enabled {
            return self.base_dir.join("signatures");
        }
        if paths::running_as_root() {
            return paths::system_signatures_dir();
        }
        paths::user_data_dir()
            .map(|dir| dir.join("signatures"))
            .unwrap_or_else(paths::system_signatures_dir)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        if self.enabled {
            self.base_dir.join("uploads")
        } else {
            paths::system_uploads_dir()
        }
    }

    pub fn config_file(&self) -> PathBuf {
        if self.enabled {
            PathBuf::from("configs/exam-proctor.toml")
        } else {
            paths::system_config_file()
        }
    }

    pub fn models_dir(&self) -> PathBuf {
        if self.enabled {
            PathBuf::from("./models")
        } else {
            paths::system_models_dir()
        }
    }

    pub fn socket_path(&self) -> PathBuf {
        if self.enabled {
            PathBuf::from("/tmp/exam-proctor.sock")
        } else {
            paths::system_socket_path()
        }
    }
}

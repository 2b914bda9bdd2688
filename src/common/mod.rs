pub mod config;
pub mod dev_mode;
pub mod error;
pub mod paths;

pub use config::Config;
pub use dev_mode::DevMode;
pub use error::{ProctorError, Result};
pub use paths::{system_signatures_dir, system_uploads_dir, system_config_file, system_models_dir, system_socket_path, user_data_dir};

/// Exams are identified by the numeric id the CRUD layer assigns.
pub type ExamId = u64;

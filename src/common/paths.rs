use std::path::PathBuf;

// System-wide locations used when the daemon runs outside dev mode

pub fn system_signatures_dir() -> PathBuf {
    PathBuf::from("/var/lib/exam-proctor/signatures")
}

pub fn system_uploads_dir() -> PathBuf {
    PathBuf::from("/var/lib/exam-proctor/uploads")
}

pub fn system_config_file() -> PathBuf {
    PathBuf::from("/etc/exam-proctor/exam-proctor.toml")
}

pub fn system_models_dir() -> PathBuf {
    PathBuf::from("/usr/share/exam-proctor/models")
}

pub fn system_socket_path() -> PathBuf {
    PathBuf::from("/run/exam-proctor/service.sock")
}

/// Per-user data directory, used when the tools run unprivileged outside dev mode.
pub fn user_data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "exam-proctor", "ExamProctor")
        .map(|dirs| dirs.data_dir().to_path_buf())
}

pub fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions
    unsafe { libc::geteuid() == 0 }
}

use crate::common::{ProctorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Linux truncates `comm` to 15 bytes.
const MAX_COMM_LENGTH: usize = 15;
const MAX_CMDLINE_READ: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub pid: u32,
    pub name: String,
    pub matched_keyword: String,
    /// Whether termination was delivered.
    pub suppressed: bool,
    pub detected_at: SystemTime,
}

/// Finds and stops forbidden processes.
pub trait ThreatScanner: Send + Sync {
    fn detect(&self) -> Result<Vec<Detection>>;

    fn suppress(&self, detection: &Detection) -> Result<()>;
}

/// Keyword scan over `/proc/<pid>/comm` and the basename of `argv[0]`.
pub struct ProcessScanner {
    proc_root: PathBuf,
    keywords: Vec<String>,
    own_pid: u32,
}

impl ProcessScanner {
    pub fn new(keywords: &[String]) -> Self {
        Self::with_proc_root(keywords, Path::new("/proc"))
    }

    pub fn with_proc_root(keywords: &[String], proc_root: &Path) -> Self {
        Self {
            proc_root: proc_root.to_path_buf(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            own_pid: std::process::id(),
        }
    }

    fn process_names(&self, pid: u32) -> Vec<String> {
        let dir = self.proc_root.join(pid.to_string());
        let mut names = Vec::with_capacity(2);

        if let Ok(comm) = fs::read_to_string(dir.join("comm")) {
            let comm: String = comm.trim().chars().take(MAX_COMM_LENGTH).collect();
            if !comm.is_empty() {
                names.push(comm);
            }
        }

        if let Ok(cmdline) = fs::read(dir.join("cmdline")) {
            let head = &cmdline[..cmdline.len().min(MAX_CMDLINE_READ)];
            let argv0 = head.split(|b| *b == 0).next().unwrap_or_default();
            let argv0 = String::from_utf8_lossy(argv0);
            if let Some(base) = Path::new(argv0.as_ref()).file_name().and_then(|b| b.to_str()) {
                if !base.is_empty() && !names.iter().any(|n| n == base) {
                    names.push(base.to_string());
                }
            }
        }

        names
    }

    fn matching_keyword(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.keywords
            .iter()
            .find(|k| keyword_matches(&name, k))
            .map(String::as_str)
    }
}

/// Short keywords must match a whole token so "obs" does not hit "jobs".
fn keyword_matches(name: &str, keyword: &str) -> bool {
    if keyword.is_empty() {
        return false;
    }
    if name == keyword || (keyword.len() >= 6 && name.contains(keyword)) {
        return true;
    }
    name.split(|c: char| !c.is_ascii_alphanumeric()).any(|token| token == keyword)
}

impl ThreatScanner for ProcessScanner {
    fn detect(&self) -> Result<Vec<Detection>> {
        let entries = fs::read_dir(&self.proc_root)
            .map_err(|e| ProctorError::Guard(format!("cannot read {}: {}", self.proc_root.display(), e)))?;

        let mut detections = Vec::new();
        for entry in entries.flatten() {
            let pid = match entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) {
                Some(pid) => pid,
                None => continue,
            };
            if pid <= 1 || pid == self.own_pid {
                continue;
            }

            // processes may exit between listing and reading
            for name in self.process_names(pid) {
                if let Some(keyword) = self.matching_keyword(&name) {
                    detections.push(Detection {
                        pid,
                        name,
                        matched_keyword: keyword.to_string(),
                        suppressed: false,
                        detected_at: SystemTime::now(),
                    });
                    break;
                }
            }
        }

        detections.sort_by_key(|d| d.pid);
        Ok(detections)
    }

    fn suppress(&self, detection: &Detection) -> Result<()> {
        let pid = libc::pid_t::try_from(detection.pid)
            .map_err(|_| ProctorError::Guard(format!("pid {} out of range", detection.pid)))?;

        // SAFETY: kill has no memory-safety preconditions
        let ret = unsafe { libc::kill(pid, libc::SIGTERM) };
        if ret != 0 {
            return Err(ProctorError::Guard(format!(
                "SIGTERM to {} ({}) failed: {}",
                detection.pid,
                detection.name,
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }
}

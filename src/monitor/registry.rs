use crate::common::ExamId;
use crate::monitor::session::{MonitorContext, SessionMonitor};
use crate::monitor::status::SessionMonitorState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// At most one monitor per session id. The map lock is never held while a
/// monitor starts or stops.
pub struct MonitorRegistry {
    context: Arc<MonitorContext>,
    monitors: Mutex<HashMap<String, Arc<SessionMonitor>>>,
}

impl MonitorRegistry {
    pub fn new(context: MonitorContext) -> Self {
        Self {
            context: Arc::new(context),
            monitors: Mutex::new(HashMap::new()),
        }
    }

    /// A failed start leaves the monitor registered so its error stays visible.
    /// A session already registered keeps its exam and student; later starts
    /// only report the established outcome.
    pub fn start_monitoring(&self, session_id: &str, exam_id: ExamId, student_label: &str) -> bool {
        let monitor = {
            let mut monitors = self.monitors.lock();
            Arc::clone(
                monitors
                    .entry(session_id.to_string())
                    .or_insert_with(|| Arc::new(SessionMonitor::new(session_id, Arc::clone(&self.context)))),
            )
        };

        monitor.start(exam_id, student_label)
    }

    /// False when nothing was registered under `session_id`.
    pub fn stop_monitoring(&self, session_id: &str) -> bool {
        let monitor = self.monitors.lock().remove(session_id);
        match monitor {
            Some(monitor) => {
                monitor.stop();
                true
            }
            None => false,
        }
    }

    pub fn get_status(&self, session_id: &str) -> SessionMonitorState {
        let monitor = self.monitors.lock().get(session_id).cloned();
        match monitor {
            Some(monitor) => monitor.status(),
            None => SessionMonitorState::inactive(session_id),
        }
    }

    pub fn active_sessions(&self) -> Vec<String> {
        let mut sessions: Vec<String> = self.monitors.lock().keys().cloned().collect();
        sessions.sort();
        sessions
    }

    pub fn len(&self) -> usize {
        self.monitors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.lock().is_empty()
    }

    pub fn shutdown(&self) {
        let monitors: Vec<Arc<SessionMonitor>> = self.monitors.lock().drain().map(|(_, m)| m).collect();
        if !monitors.is_empty() {
            tracing::info!("Stopping {} session monitors", monitors.len());
        }
        for monitor in monitors {
            monitor.stop();
        }
    }
}

impl Drop for MonitorRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub mod registry;
pub mod session;
pub mod status;

pub use registry::MonitorRegistry;
pub use session::{MonitorContext, MonitorPhase, SessionMonitor};
pub use status::{FaceStatus, SessionMonitorState};

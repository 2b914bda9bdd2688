use crate::common::Result;
use crate::service::handler::ProctorService;
use crate::service::protocol::{read_frame, write_frame, Request, Response};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Unix socket front end, one short-lived thread per connection.
pub struct ProctorServer {
    listener: UnixListener,
    socket_path: PathBuf,
    service: Arc<ProctorService>,
}

impl ProctorServer {
    /// Replaces a stale socket file and opens the socket to all local users.
    pub fn bind(socket_path: &Path, service: Arc<ProctorService>) -> Result<Self> {
        if socket_path.exists() {
            fs::remove_file(socket_path)?;
        }
        if let Some(parent) = socket_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(socket_path)?;
        fs::set_permissions(socket_path, fs::Permissions::from_mode(0o666))?;
        tracing::info!("Listening on {}", socket_path.display());

        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
            service,
        })
    }

    pub fn serve(&self) -> Result<()> {
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let service = Arc::clone(&self.service);
                    let spawned = std::thread::Builder::new()
                        .name("proctor-client".into())
                        .spawn(move || {
                            if let Err(e) = handle_client(stream, &service) {
                                tracing::error!("Client error: {}", e);
                            }
                        });
                    if let Err(e) = spawned {
                        tracing::error!("Cannot spawn client thread: {}", e);
                    }
                }
                Err(e) => tracing::error!("Connection error: {}", e),
            }
        }
        Ok(())
    }
}

impl Drop for ProctorServer {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.socket_path);
    }
}

pub fn handle_client(mut stream: UnixStream, service: &ProctorService) -> Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;

    let response = match read_frame::<_, Request>(&mut stream) {
        Ok(request) => {
            tracing::debug!("Request: {:?}", request);
            service.handle(request)
        }
        Err(e) => {
            tracing::warn!("Malformed request: {}", e);
            Response::Error(format!("Malformed request: {}", e))
        }
    };

    write_frame(&mut stream, &response)
}

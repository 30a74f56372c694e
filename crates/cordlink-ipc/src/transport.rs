//! Locating and opening the application's IPC socket.

use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::IpcError;

/// Number of socket slots the application may listen on.
const SOCKET_SLOTS: usize = 10;

pub trait IpcStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> IpcStream for T {}

pub type BoxedStream = Box<dyn IpcStream>;

/// Candidate socket paths, in the order they are tried.
#[cfg(unix)]
pub fn socket_candidates() -> Vec<PathBuf> {
    let base = ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"]
        .iter()
        .find_map(|key| std::env::var_os(key).filter(|v| !v.is_empty()))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"));

    (0..SOCKET_SLOTS)
        .map(|i| base.join(format!("discord-ipc-{i}")))
        .collect()
}

#[cfg(windows)]
pub fn socket_candidates() -> Vec<PathBuf> {
    (0..SOCKET_SLOTS)
        .map(|i| PathBuf::from(format!(r"\\?\pipe\discord-ipc-{i}")))
        .collect()
}

/// Open the first socket that accepts a connection.
pub async fn connect() -> Result<BoxedStream, IpcError> {
    let mut last_err = None;
    for path in socket_candidates() {
        match open(&path).await {
            Ok(stream) => {
                debug!(path = %path.display(), "Opened IPC socket");
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.map(IpcError::Io).unwrap_or(IpcError::Closed))
}

#[cfg(unix)]
async fn open(path: &std::path::Path) -> std::io::Result<BoxedStream> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    Ok(Box::new(stream))
}

#[cfg(windows)]
async fn open(path: &std::path::Path) -> std::io::Result<BoxedStream> {
    let pipe = tokio::net::windows::named_pipe::ClientOptions::new().open(path)?;
    Ok(Box::new(pipe))
}

//! gRPC client connections over unix domain sockets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

use crate::error::DialError;

/// Placeholder authority; the connector ignores it and dials the socket.
const UNIX_AUTHORITY: &str = "http://[::]:50051";

/// Connect to the gRPC server listening on `socket`.
///
/// Connection and HTTP/2 handshake must both finish within `timeout`.
///
/// # Errors
///
/// Returns [`DialError::Timeout`] if the deadline passes and
/// [`DialError::Transport`] if the socket refuses the connection.
pub async fn dial(socket: &Path, timeout: Duration) -> Result<Channel, DialError> {
    let socket: PathBuf = socket.to_path_buf();
    let connector = service_fn(move |_: Uri| {
        let socket = socket.clone();
        async move { Ok::<_, std::io::Error>(TokioIo::new(UnixStream::connect(socket).await?)) }
    });

    let endpoint = Endpoint::from_static(UNIX_AUTHORITY).connect_timeout(timeout);
    let connect = endpoint.connect_with_connector(connector);

    tokio::time::timeout(timeout, connect)
        .await
        .map_err(|_| DialError::Timeout(timeout))?
        .map_err(DialError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dial_missing_socket_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = dial(&tmp.path().join("nobody.sock"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DialError::Transport(_) | DialError::Timeout(_)));
    }
}

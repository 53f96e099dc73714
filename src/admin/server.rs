//! # Admin accept loop and per-connection servicing.
//!
//! The listener half ([`AdminServer`]) yields connections into the service
//! control loop's timed wait; each connection is then serviced synchronously
//! by [`serve_connection`] before the loop resumes. There is no draining
//! beyond finishing the connection currently being served.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::admin::proto::{AdminRequest, AdminStatus, REQUEST_LEN};

/// Listening half of the admin protocol.
pub struct AdminServer {
    listener: TcpListener,
}

impl AdminServer {
    /// Binds the listener.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "admin server listening");
        Ok(Self { listener })
    }

    /// Actual bound address (useful with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next operator connection.
    pub async fn accept(&self) -> io::Result<TcpStream> {
        let (stream, peer) = self.listener.accept().await?;
        info!(%peer, "admin connection");
        Ok(stream)
    }
}

/// Services one connection: one fixed-size request, one status response.
///
/// `apply` performs the actual mutation and returns the response status. A
/// request that cannot be decoded is answered with ERROR and the connection
/// closed; nothing previously committed is disturbed. An unreadable
/// connection is dropped without a response.
pub async fn serve_connection<S, F, Fut>(mut stream: S, apply: F) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FnOnce(AdminRequest) -> Fut,
    Fut: Future<Output = AdminStatus>,
{
    let mut buf = [0u8; REQUEST_LEN];
    if let Err(err) = stream.read_exact(&mut buf).await {
        warn!(error = %err, "short admin request; dropping connection");
        return Err(err);
    }

    let status = match AdminRequest::decode(&buf) {
        Ok(request) => {
            info!(op = request.op.as_label(), target = %request.target, "admin request");
            apply(request).await
        }
        Err(err) => {
            warn!(error = %err, "malformed admin request");
            AdminStatus::Error
        }
    };

    stream.write_all(&status.code().to_be_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

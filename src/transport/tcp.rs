use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

/// Connect to a TCP endpoint, bounded by `timeout`.
pub async fn connect(addr: SocketAddr, timeout: Duration) -> io::Result<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Bind a TCP listener and return it.
pub async fn listen(addr: SocketAddr) -> io::Result<TcpListener> {
    TcpListener::bind(addr).await
}

/// Accept a single connection from a listener.
pub async fn accept(listener: &TcpListener) -> io::Result<(TcpStream, SocketAddr)> {
    let (stream, addr) = listener.accept().await?;
    stream.set_nodelay(true)?;
    Ok((stream, addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listen_and_accept() {
        let listener = listen("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client_handle =
            tokio::spawn(async move { connect(addr, Duration::from_secs(5)).await.unwrap() });

        let (server_stream, peer_addr) = accept(&listener).await.unwrap();
        let client_stream = client_handle.await.unwrap();

        assert!(server_stream.nodelay().unwrap());
        assert!(client_stream.nodelay().unwrap());
        assert!(peer_addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn connect_to_unbound_port_fails() {
        // Bind and immediately drop to get a port that is not listening.
        let listener = listen("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = connect(addr, Duration::from_secs(5)).await;
        assert!(result.is_err());
    }
}

//! Plain or TLS byte stream handed back to the transport layer.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use rustls::pki_types::CertificateDer;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsStream;

/// A connected stream, secured or not.
#[derive(Debug)]
pub enum NodeStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl NodeStream {
    pub fn is_secure(&self) -> bool {
        matches!(self, NodeStream::Tls(_))
    }

    /// End-entity certificate the peer presented, if any.
    pub fn peer_certificate(&self) -> Option<&CertificateDer<'static>> {
        let certs = match self {
            NodeStream::Plain(_) => return None,
            NodeStream::Tls(tls) => match tls.as_ref() {
                TlsStream::Client(s) => s.get_ref().1.peer_certificates(),
                TlsStream::Server(s) => s.get_ref().1.peer_certificates(),
            },
        };
        certs.and_then(|chain| chain.first())
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.tcp().peer_addr()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp().local_addr()
    }

    fn tcp(&self) -> &TcpStream {
        match self {
            NodeStream::Plain(tcp) => tcp,
            NodeStream::Tls(tls) => match tls.as_ref() {
                TlsStream::Client(s) => s.get_ref().0,
                TlsStream::Server(s) => s.get_ref().0,
            },
        }
    }
}

impl From<tokio_rustls::client::TlsStream<TcpStream>> for NodeStream {
    fn from(stream: tokio_rustls::client::TlsStream<TcpStream>) -> Self {
        NodeStream::Tls(Box::new(TlsStream::Client(stream)))
    }
}

impl From<tokio_rustls::server::TlsStream<TcpStream>> for NodeStream {
    fn from(stream: tokio_rustls::server::TlsStream<TcpStream>) -> Self {
        NodeStream::Tls(Box::new(TlsStream::Server(stream)))
    }
}

impl AsyncRead for NodeStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            NodeStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            NodeStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for NodeStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            NodeStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            NodeStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            NodeStream::Plain(s) => Pin::new(s).poll_flush(cx),
            NodeStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            NodeStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            NodeStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

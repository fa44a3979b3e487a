//! Link sockets.
//!
//! A connected link is split into a read half owned by the session reader
//! task and a write half guarded by the session. TCP and TLS are byte
//! streams; UDP shares one connected socket between both halves.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tracing::debug;

use super::policy::TransportKind;
use super::session::SessionConfig;
use crate::core::{ClientIdentity, ConnectError};

#[cfg(feature = "tls")]
type TlsStream = tokio_openssl::SslStream<TcpStream>;

/// Bytes delivered by a session reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A chunk of a TCP or TLS byte stream; message boundaries are arbitrary.
    Stream(Vec<u8>),
    /// One whole UDP datagram.
    Datagram(Vec<u8>),
}

impl Inbound {
    /// Received bytes.
    pub fn bytes(&self) -> &[u8] {
        match self {
            Inbound::Stream(b) | Inbound::Datagram(b) => b,
        }
    }
}

/// Read half of a link.
pub(crate) enum LinkReader {
    Tcp(OwnedReadHalf),
    #[cfg(feature = "tls")]
    Tls(tokio::io::ReadHalf<TlsStream>),
    Udp(Arc<UdpSocket>),
}

impl LinkReader {
    /// Read the next chunk. `Ok(None)` means the peer closed the stream.
    pub(crate) async fn read(&mut self, buf: &mut [u8]) -> io::Result<Option<Inbound>> {
        let (n, datagram) = match self {
            LinkReader::Tcp(r) => (r.read(buf).await?, false),
            #[cfg(feature = "tls")]
            LinkReader::Tls(r) => (r.read(buf).await?, false),
            LinkReader::Udp(s) => (s.recv(buf).await?, true),
        };
        if datagram {
            return Ok(Some(Inbound::Datagram(buf[..n].to_vec())));
        }
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(Inbound::Stream(buf[..n].to_vec())))
    }
}

/// Write half of a link.
pub(crate) enum LinkWriter {
    Tcp(OwnedWriteHalf),
    #[cfg(feature = "tls")]
    Tls(tokio::io::WriteHalf<TlsStream>),
    Udp(Arc<UdpSocket>),
}

impl LinkWriter {
    /// Write one complete message.
    pub(crate) async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            LinkWriter::Tcp(w) => {
                w.write_all(data).await?;
                w.flush().await
            }
            #[cfg(feature = "tls")]
            LinkWriter::Tls(w) => {
                w.write_all(data).await?;
                w.flush().await
            }
            LinkWriter::Udp(s) => {
                let sent = s.send(data).await?;
                if sent != data.len() {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        format!("datagram truncated: {} of {} bytes", sent, data.len()),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Best-effort orderly shutdown of the write direction.
    pub(crate) async fn shutdown(&mut self) {
        let result = match self {
            LinkWriter::Tcp(w) => w.shutdown().await,
            #[cfg(feature = "tls")]
            LinkWriter::Tls(w) => w.shutdown().await,
            LinkWriter::Udp(_) => Ok(()),
        };
        if let Err(e) = result {
            debug!(error = %e, "link shutdown failed");
        }
    }
}

/// An opened link.
pub(crate) struct Link {
    pub(crate) reader: LinkReader,
    pub(crate) writer: LinkWriter,
    pub(crate) peer_addr: SocketAddr,
}

/// Resolve `host:port` to every candidate address.
pub(crate) async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, ConnectError> {
    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|source| ConnectError::Resolve {
            host: host.to_string(),
            source,
        })?
        .collect();
    if addrs.is_empty() {
        return Err(ConnectError::NoAddress(host.to_string()));
    }
    Ok(addrs)
}

/// Try each address in turn, returning the first stream that connects.
async fn connect_tcp(addrs: &[SocketAddr]) -> Result<TcpStream, ConnectError> {
    let mut last = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => {
                debug!(%addr, error = %e, "tcp connect failed");
                last = Some(e);
            }
        }
    }
    Err(last.map_or_else(|| ConnectError::NoAddress(String::new()), ConnectError::Io))
}

/// Open a link as described by `config`.
pub(crate) async fn open(
    config: &SessionConfig,
    identity: Option<&ClientIdentity>,
) -> Result<Link, ConnectError> {
    let addrs = resolve(&config.host, config.port).await?;

    match config.kind {
        TransportKind::Tcp => {
            let stream = connect_tcp(&addrs).await?;
            let peer_addr = stream.peer_addr()?;
            let (r, w) = stream.into_split();
            Ok(Link {
                reader: LinkReader::Tcp(r),
                writer: LinkWriter::Tcp(w),
                peer_addr,
            })
        }
        TransportKind::Udp => {
            let target = addrs[0];
            let local: SocketAddr = if target.is_ipv4() {
                (Ipv4Addr::UNSPECIFIED, 0).into()
            } else {
                (Ipv6Addr::UNSPECIFIED, 0).into()
            };
            let socket = UdpSocket::bind(local).await?;
            socket.connect(target).await?;
            let socket = Arc::new(socket);
            Ok(Link {
                reader: LinkReader::Udp(Arc::clone(&socket)),
                writer: LinkWriter::Udp(socket),
                peer_addr: target,
            })
        }
        #[cfg(feature = "tls")]
        TransportKind::Tls => {
            let connector = super::tls::connector(&config.tls, identity)?;
            let stream = connect_tcp(&addrs).await?;
            let peer_addr = stream.peer_addr()?;
            let stream = super::tls::handshake(&connector, &config.tls, &config.host, stream).await?;
            let (r, w) = tokio::io::split(stream);
            Ok(Link {
                reader: LinkReader::Tls(r),
                writer: LinkWriter::Tls(w),
                peer_addr,
            })
        }
        #[cfg(not(feature = "tls"))]
        TransportKind::Tls => {
            let _ = identity;
            Err(ConnectError::Tls(
                "built without the `tls` feature".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_resolve_localhost() {
        let addrs = resolve("127.0.0.1", 8087).await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:8087".parse::<SocketAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_resolve_failure() {
        let err = resolve("no-such-host.invalid", 8087).await.unwrap_err();
        assert!(matches!(err, ConnectError::Resolve { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_tcp_link_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = SessionConfig::new("127.0.0.1", port, TransportKind::Tcp);

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(b"world").await.unwrap();
            buf
        });

        let mut link = open(&config, None).await.unwrap();
        link.writer.send(b"hello").await.unwrap();
        assert_eq!(&server.await.unwrap(), b"hello");

        let mut buf = [0u8; 64];
        let inbound = link.reader.read(&mut buf).await.unwrap().unwrap();
        assert_eq!(inbound, Inbound::Stream(b"world".to_vec()));
        assert_eq!(link.reader.read(&mut buf).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_udp_link_round_trip() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        let config = SessionConfig::new("127.0.0.1", port, TransportKind::Udp);

        let mut link = open(&config, None).await.unwrap();
        link.writer.send(b"datagram").await.unwrap();

        let mut buf = [0u8; 64];
        let (n, from) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"datagram");

        server.send_to(b"", from).await.unwrap();
        let inbound = link.reader.read(&mut buf).await.unwrap();
        assert_eq!(inbound, Some(Inbound::Datagram(Vec::new())));
    }
}

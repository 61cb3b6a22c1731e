//! This module contains structs and functions to easily create a TLS termination
//! server, which can be used in combination with an Axum [`Router`].
use std::{future::Future, io, net::SocketAddr, sync::Arc, time::Duration};

use axum::{Router, extract::Request};
pub use certificate::{CertificateError, load_certificate_chain, load_private_key};
use hyper::{body::Incoming, service::service_fn};
use hyper_util::{
    rt::{TokioExecutor, TokioIo, TokioTimer},
    server::conn::auto::Builder,
};
use snafu::{ResultExt, Snafu};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
    task::JoinSet,
};
use tokio_rustls::{
    TlsAcceptor,
    rustls::{
        ServerConfig,
        crypto::ring::default_provider,
        version::{TLS12, TLS13},
    },
};
use tower::ServiceExt;
use tracing::{Instrument, instrument};

use crate::options::TlsOptions;

mod certificate;

/// Clients have to complete the TLS handshake within this duration.
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP/1 clients have to send the complete request head within this duration.
pub const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(10);

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

pub type Result<T, E = TlsServerError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum TlsServerError {
    #[snafu(display("failed to load TLS certificate chain"))]
    LoadCertificateChain { source: CertificateError },

    #[snafu(display("failed to load TLS private key"))]
    LoadPrivateKey { source: CertificateError },

    #[snafu(display("failed to construct TLS server config, bad certificate/key"))]
    InvalidTlsPrivateKey { source: tokio_rustls::rustls::Error },

    #[snafu(display("failed to set safe TLS protocol versions"))]
    SetSafeTlsProtocolVersions { source: tokio_rustls::rustls::Error },

    #[snafu(display("failed to create TCP listener by binding to socket address {socket_addr:?}"))]
    BindTcpListener {
        source: std::io::Error,
        socket_addr: SocketAddr,
    },
}

/// A server which terminates TLS connections and allows clients to communicate
/// via HTTPS with the underlying HTTP router.
pub struct TlsServer {
    config: Arc<ServerConfig>,
    socket_addr: SocketAddr,
    router: Router,
}

impl TlsServer {
    /// Creates a new TLS server from the certificate chain and private key referenced by `tls`.
    ///
    /// The TLS material is read exactly once, any failure to do so is fatal.
    #[instrument(name = "create_tls_server", skip(router))]
    pub fn new(socket_addr: SocketAddr, router: Router, tls: &TlsOptions) -> Result<Self> {
        let certificate_chain =
            load_certificate_chain(&tls.certificate_path).context(LoadCertificateChainSnafu)?;
        let private_key = load_private_key(&tls.private_key_path).context(LoadPrivateKeySnafu)?;

        tracing::debug!(
            certificates = certificate_chain.len(),
            "loaded TLS certificate chain and private key"
        );

        let tls_provider = default_provider();
        let mut config = ServerConfig::builder_with_provider(tls_provider.into())
            .with_protocol_versions(&[&TLS12, &TLS13])
            .context(SetSafeTlsProtocolVersionsSnafu)?
            .with_no_client_auth()
            .with_single_cert(certificate_chain, private_key)
            .context(InvalidTlsPrivateKeySnafu)?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        Ok(Self {
            config: Arc::new(config),
            socket_addr,
            router,
        })
    }

    /// Binds the TCP listener to the configured socket address.
    ///
    /// No connections are accepted until [`TlsListener::serve`] is called.
    pub async fn bind(self) -> Result<TlsListener> {
        let tcp_listener =
            TcpListener::bind(self.socket_addr)
                .await
                .context(BindTcpListenerSnafu {
                    socket_addr: self.socket_addr,
                })?;

        Ok(TlsListener {
            tls_acceptor: TlsAcceptor::from(self.config),
            tcp_listener,
            router: self.router,
        })
    }

    /// Binds the listener and serves connections until `shutdown` completes.
    ///
    /// See [`TlsListener::serve`] for the shutdown behaviour.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        self.bind().await?.serve(shutdown).await
    }
}

/// A bound [`TlsServer`].
pub struct TlsListener {
    tls_acceptor: TlsAcceptor,
    tcp_listener: TcpListener,
    router: Router,
}

impl TlsListener {
    /// The address the listener is bound to. Useful when binding to port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp_listener.local_addr()
    }

    /// Accepts incoming TCP connections. It only accepts TLS connections. Internally each TLS
    /// stream get handled by a Hyper service, which in turn is an Axum router.
    ///
    /// Once `shutdown` completes, no new connections are accepted. Connections which are already
    /// accepted are shut down gracefully, which lets in-flight requests complete. Connections
    /// which are still in the TLS handshake are dropped. This function returns after all of them
    /// are closed.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let Self {
            tls_acceptor,
            tcp_listener,
            router,
        } = self;

        // Only used for the span attributes, the listener is already bound
        let local_addr = tcp_listener.local_addr().ok();
        tracing::info!(socket_addr = ?local_addr, "listening for admission requests");

        let (drain_tx, drain_rx) = watch::channel(false);
        let mut connections = JoinSet::new();

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,

                // Reap finished connection tasks, so the set doesn't grow unbounded
                Some(result) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(err) = result {
                        tracing::warn!(%err, "connection task failed");
                    }
                }

                accepted = tcp_listener.accept() => {
                    let (tcp_stream, remote_addr) = match accepted {
                        Ok((stream, addr)) => (stream, addr),
                        Err(err) => {
                            if let Some(backoff) = accept_backoff(&err) {
                                tracing::warn!(%err, ?backoff, "failed to accept incoming TCP connection");
                                tokio::time::sleep(backoff).await;
                            } else {
                                tracing::trace!(%err, "failed to accept incoming TCP connection");
                            }
                            continue;
                        }
                    };

                    let span = tracing::debug_span!(
                        "accept tcp connection",
                        "client.address" = remote_addr.ip().to_string(),
                        "client.port" = remote_addr.port(),
                        "network.transport" = "tcp",
                        "network.type" = remote_addr.semantic_convention_network_type(),
                    );

                    connections.spawn(
                        serve_connection(
                            tls_acceptor.clone(),
                            router.clone(),
                            tcp_stream,
                            remote_addr,
                            drain_rx.clone(),
                        )
                        .instrument(span),
                    );
                }
            }
        }

        // Stop accepting before draining
        drop(tcp_listener);
        tracing::info!(
            connections = connections.len(),
            "stopped accepting connections, draining in-flight requests"
        );

        drain_tx.send_replace(true);
        while let Some(result) = connections.join_next().await {
            if let Err(err) = result {
                tracing::warn!(%err, "connection task failed");
            }
        }

        tracing::info!("all connections drained");
        Ok(())
    }
}

/// Returns how long to wait before accepting again after `err`.
///
/// Errors which only concern the single connection are retried immediately. Everything else
/// (most notably running out of file descriptors) would otherwise turn the accept loop into a
/// busy loop.
fn accept_backoff(err: &io::Error) -> Option<Duration> {
    match err.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset => None,
        _ => Some(ACCEPT_ERROR_BACKOFF),
    }
}

async fn serve_connection(
    tls_acceptor: TlsAcceptor,
    router: Router,
    tcp_stream: TcpStream,
    remote_addr: SocketAddr,
    mut drain_rx: watch::Receiver<bool>,
) {
    // Wait for tls handshake to happen. Clients which never finish it must neither hold the
    // connection forever nor block draining.
    let handshake = tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, tls_acceptor.accept(tcp_stream));
    let tls_stream = tokio::select! {
        result = handshake => match result {
            Ok(Ok(tls_stream)) => tls_stream,
            Ok(Err(err)) => {
                tracing::trace!(%err, %remote_addr, "error during tls handshake connection");
                return;
            }
            Err(_) => {
                tracing::debug!(%remote_addr, timeout = ?TLS_HANDSHAKE_TIMEOUT, "tls handshake timed out");
                return;
            }
        },

        _ = drain_rx.changed() => {
            tracing::debug!(%remote_addr, "dropping connection which is still in the tls handshake");
            return;
        }
    };

    // Hyper has its own `AsyncRead` and `AsyncWrite` traits and doesn't use tokio.
    // `TokioIo` converts between them.
    let tls_stream = TokioIo::new(tls_stream);

    // Hyper also has its own `Service` trait and doesn't use tower. We can use
    // `hyper::service::service_fn` to create a hyper `Service` that calls our app through
    // `tower::Service::call`.
    let hyper_service = service_fn(move |request: Request<Incoming>| {
        // We need to clone here, because oneshot consumes self
        router.clone().oneshot(request)
    });

    let mut builder = Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(HEADER_READ_TIMEOUT);

    let connection = builder.serve_connection_with_upgrades(tls_stream, hyper_service);
    tokio::pin!(connection);

    let mut draining = false;
    loop {
        tokio::select! {
            result = connection.as_mut() => {
                if let Err(err) = result {
                    tracing::warn!(%err, %remote_addr, "failed to serve connection");
                }
                break;
            }

            _ = drain_rx.changed(), if !draining => {
                tracing::debug!(%remote_addr, "gracefully shutting down connection");
                draining = true;
                connection.as_mut().graceful_shutdown();
            }
        }
    }
}

pub trait SocketAddrExt {
    fn semantic_convention_network_type(&self) -> &'static str;
}

impl SocketAddrExt for SocketAddr {
    fn semantic_convention_network_type(&self) -> &'static str {
        match self {
            SocketAddr::V4(_) => "ipv4",
            SocketAddr::V6(_) => "ipv6",
        }
    }
}

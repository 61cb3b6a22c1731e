//! Contains various constant definitions, mostly for default ports, IP addresses, limits and the
//! paths the TLS material is mounted at.
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// The default HTTPS port `443`
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// The default IP address [`Ipv4Addr::UNSPECIFIED`] (`0.0.0.0`) the webhook server binds to,
/// which represents binding on all network addresses.
pub const DEFAULT_LISTEN_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// The default socket address `0.0.0.0:443` the webhook server binds to.
pub const DEFAULT_SOCKET_ADDRESS: SocketAddr =
    SocketAddr::new(DEFAULT_LISTEN_ADDRESS, DEFAULT_HTTPS_PORT);

/// The default path of the PEM encoded certificate chain.
pub const DEFAULT_TLS_CERTIFICATE_PATH: &str = "/autoops-data/tls/tls.crt";

/// The default path of the PEM encoded private key.
pub const DEFAULT_TLS_PRIVATE_KEY_PATH: &str = "/autoops-data/tls/tls.key";

/// The largest admission review body which is accepted.
///
/// The API server accepts request bodies of up to 3 MiB. An UPDATE review carries both the
/// object and the old object, plus the envelope around them.
pub const MAX_ADMISSION_REVIEW_BYTES: usize = 7 * 1024 * 1024;

//! Contains available options to configure the [WebhookServer][crate::WebhookServer].
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};

use crate::constants::{
    DEFAULT_SOCKET_ADDRESS, DEFAULT_TLS_CERTIFICATE_PATH, DEFAULT_TLS_PRIVATE_KEY_PATH,
};

/// Specifies available webhook server options.
///
/// The [`Default`] implementation for this struct contains the following values:
///
/// - The socket binds to 0.0.0.0 on port 443 (HTTPS)
/// - The certificate chain is read from `/autoops-data/tls/tls.crt`
/// - The private key is read from `/autoops-data/tls/tls.key`
///
/// ### Example with Custom HTTPS IP Address and Port
///
/// ```
/// use patch_webhook::WebhookOptions;
///
/// // Set IP address and port at the same time
/// let options = WebhookOptions::builder()
///     .bind_address([0, 0, 0, 0], 12345)
///     .build();
///
/// // Set IP address only
/// let options = WebhookOptions::builder()
///     .bind_ip([0, 0, 0, 0])
///     .build();
///
/// // Set port only
/// let options = WebhookOptions::builder()
///     .bind_port(12345)
///     .build();
/// ```
#[derive(Debug)]
pub struct WebhookOptions {
    /// The HTTPS socket address the [`TcpListener`][tokio::net::TcpListener] binds to.
    pub socket_addr: SocketAddr,

    /// Where the TLS material is loaded from.
    pub tls: TlsOptions,
}

impl Default for WebhookOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl WebhookOptions {
    /// Returns the default [`WebhookOptionsBuilder`] which allows to selectively
    /// customize the options. See the documentation for [`WebhookOptions`] for more
    /// information on available functions.
    pub fn builder() -> WebhookOptionsBuilder {
        WebhookOptionsBuilder::default()
    }
}

/// Paths of the PEM encoded certificate chain and private key, which are mounted into the
/// container. Both are read once during startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsOptions {
    pub certificate_path: PathBuf,
    pub private_key_path: PathBuf,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            certificate_path: PathBuf::from(DEFAULT_TLS_CERTIFICATE_PATH),
            private_key_path: PathBuf::from(DEFAULT_TLS_PRIVATE_KEY_PATH),
        }
    }
}

/// The [`WebhookOptionsBuilder`] which allows to selectively customize the webhook
/// server [`WebhookOptions`].
///
/// Usually, this struct is not constructed manually, but instead by calling
/// [`WebhookOptions::builder()`] or [`WebhookOptionsBuilder::default()`].
#[derive(Debug, Default)]
pub struct WebhookOptionsBuilder {
    socket_addr: Option<SocketAddr>,
    certificate_path: Option<PathBuf>,
    private_key_path: Option<PathBuf>,
}

impl WebhookOptionsBuilder {
    /// Sets the socket address the webhook server uses to bind for HTTPS.
    pub fn bind_address(mut self, bind_ip: impl Into<IpAddr>, bind_port: u16) -> Self {
        self.socket_addr = Some(SocketAddr::new(bind_ip.into(), bind_port));
        self
    }

    /// Sets the complete socket address the webhook server uses to bind for HTTPS.
    pub fn socket_addr(mut self, socket_addr: SocketAddr) -> Self {
        self.socket_addr = Some(socket_addr);
        self
    }

    /// Sets the IP address of the socket address the webhook server uses to
    /// bind for HTTPS.
    pub fn bind_ip(mut self, bind_ip: impl Into<IpAddr>) -> Self {
        let addr = self.socket_addr.get_or_insert(DEFAULT_SOCKET_ADDRESS);
        addr.set_ip(bind_ip.into());
        self
    }

    /// Sets the port of the socket address the webhook server uses to bind
    /// for HTTPS.
    pub fn bind_port(mut self, bind_port: u16) -> Self {
        let addr = self.socket_addr.get_or_insert(DEFAULT_SOCKET_ADDRESS);
        addr.set_port(bind_port);
        self
    }

    /// Sets the path the PEM encoded certificate chain is read from.
    pub fn tls_certificate_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.certificate_path = Some(path.into());
        self
    }

    /// Sets the path the PEM encoded private key is read from.
    pub fn tls_private_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    /// Builds the final [`WebhookOptions`] by using default values for any not
    /// explicitly set option.
    pub fn build(self) -> WebhookOptions {
        let default_tls = TlsOptions::default();

        WebhookOptions {
            socket_addr: self.socket_addr.unwrap_or(DEFAULT_SOCKET_ADDRESS),
            tls: TlsOptions {
                certificate_path: self
                    .certificate_path
                    .unwrap_or(default_tls.certificate_path),
                private_key_path: self
                    .private_key_path
                    .unwrap_or(default_tls.private_key_path),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn defaults() {
        let options = WebhookOptions::default();

        assert_eq!(options.socket_addr, DEFAULT_SOCKET_ADDRESS);
        assert_eq!(options.socket_addr.port(), 443);
        assert_eq!(options.tls, TlsOptions::default());
    }

    #[test]
    fn bind_port_keeps_default_ip() {
        let options = WebhookOptions::builder().bind_port(8443).build();

        assert_eq!(options.socket_addr.ip(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(options.socket_addr.port(), 8443);
    }

    #[test]
    fn custom_tls_paths() {
        let options = WebhookOptions::builder()
            .bind_address([127, 0, 0, 1], 9443)
            .tls_certificate_path("/tmp/tls.crt")
            .tls_private_key_path("/tmp/tls.key")
            .build();

        assert_eq!(
            options.socket_addr,
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9443)
        );
        assert_eq!(options.tls.certificate_path, PathBuf::from("/tmp/tls.crt"));
        assert_eq!(options.tls.private_key_path, PathBuf::from("/tmp/tls.key"));
    }
}

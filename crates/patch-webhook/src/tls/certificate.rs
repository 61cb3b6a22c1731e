use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu, ensure};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, pem::PemObject};

type Result<T, E = CertificateError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum CertificateError {
    #[snafu(display("failed to read PEM certificate chain from {path:?}"))]
    ReadCertificateChain {
        source: tokio_rustls::rustls::pki_types::pem::Error,
        path: PathBuf,
    },

    #[snafu(display("the file {path:?} does not contain any PEM encoded certificate"))]
    EmptyCertificateChain { path: PathBuf },

    #[snafu(display("failed to read PEM private key from {path:?}"))]
    ReadPrivateKey {
        source: tokio_rustls::rustls::pki_types::pem::Error,
        path: PathBuf,
    },
}

/// Reads all PEM encoded certificates from `path`. The leaf certificate has to come first.
pub fn load_certificate_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let certificate_chain = CertificateDer::pem_file_iter(path)
        .context(ReadCertificateChainSnafu { path })?
        .collect::<Result<Vec<_>, _>>()
        .context(ReadCertificateChainSnafu { path })?;

    ensure!(
        !certificate_chain.is_empty(),
        EmptyCertificateChainSnafu { path }
    );

    Ok(certificate_chain)
}

/// Reads the first PEM encoded private key (PKCS#1, PKCS#8 or SEC1) from `path`.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    PrivateKeyDer::from_pem_file(path).context(ReadPrivateKeySnafu { path })
}

//! TLS configuration and certificate loading.

use std::io::{Error, ErrorKind};
use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

/// Load the server certificate chain and private key.
///
/// When `ca_path` names an existing file its certificates are appended to the
/// presented chain; a missing CA file is not an error.
pub async fn load_tls_config(
    cert_path: &Path,
    key_path: &Path,
    ca_path: Option<&Path>,
) -> Result<RustlsConfig, Error> {
    if !cert_path.exists() {
        return Err(Error::new(
            ErrorKind::NotFound,
            format!("Certificate file not found: {:?}", cert_path),
        ));
    }
    if !key_path.exists() {
        return Err(Error::new(
            ErrorKind::NotFound,
            format!("Private key file not found: {:?}", key_path),
        ));
    }

    let mut chain = tokio::fs::read(cert_path).await?;
    let key = tokio::fs::read(key_path).await?;

    ensure_certificates(&chain, cert_path)?;
    ensure_private_key(&key, key_path)?;

    if let Some(ca_path) = ca_path.filter(|p| p.exists()) {
        let ca = tokio::fs::read(ca_path).await?;
        ensure_certificates(&ca, ca_path)?;
        if !chain.ends_with(b"\n") {
            chain.push(b'\n');
        }
        chain.extend_from_slice(&ca);
        tracing::debug!(ca = %ca_path.display(), "CA chain appended");
    }

    RustlsConfig::from_pem(chain, key).await
}

fn ensure_certificates(pem: &[u8], path: &Path) -> Result<(), Error> {
    let certs = rustls_pemfile::certs(&mut &pem[..]).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("No certificates in {:?}", path),
        ));
    }
    Ok(())
}

fn ensure_private_key(pem: &[u8], path: &Path) -> Result<(), Error> {
    match rustls_pemfile::private_key(&mut &pem[..])? {
        Some(_) => Ok(()),
        None => Err(Error::new(
            ErrorKind::InvalidData,
            format!("No private key in {:?}", path),
        )),
    }
}

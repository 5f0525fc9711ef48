//! Startup connectivity probe for the document database.
//!
//! Only reachability is checked: a TCP connect to the first host named in the
//! connection string. The database driver itself lives outside this crate.

use std::time::Duration;

use tokio::net::TcpStream;
use url::{Host, Url};

use crate::config::DatabaseConfig;

pub const DEFAULT_PORT: u16 = 27017;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("invalid database connection string `{0}`")]
    InvalidUrl(String),

    #[error("database at {address} is unreachable: {source}")]
    Unreachable {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("database at {address} did not answer within {timeout_secs}s")]
    Timeout { address: String, timeout_secs: u64 },
}

/// Host and port to probe, or `None` when the string names no single
/// connectable host (SRV records).
fn probe_target(uri: &str) -> Result<Option<(String, u16)>, DatabaseError> {
    let invalid = || DatabaseError::InvalidUrl(uri.to_string());

    let (scheme, rest) = uri.split_once("://").ok_or_else(invalid)?;
    match scheme {
        "mongodb" => {}
        "mongodb+srv" => return Ok(None),
        _ => return Err(invalid()),
    }

    let authority = rest.split(['/', '?']).next().unwrap_or_default();
    let hosts = authority.rsplit_once('@').map_or(authority, |(_, hosts)| hosts);
    let first = hosts.split(',').next().unwrap_or_default();
    if first.is_empty() {
        return Err(invalid());
    }

    let parsed = Url::parse(&format!("mongodb://{}", first)).map_err(|_| invalid())?;
    let host = match parsed.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => return Err(invalid()),
    };
    Ok(Some((host, parsed.port().unwrap_or(DEFAULT_PORT))))
}

/// Probe the configured database. An empty connection string skips the probe.
pub async fn probe(config: &DatabaseConfig) -> Result<(), DatabaseError> {
    let uri = config.database.trim();
    if uri.is_empty() {
        tracing::debug!("No database configured, skipping connectivity probe");
        return Ok(());
    }

    let Some((host, port)) = probe_target(uri)? else {
        tracing::warn!(target: "backend", "SRV connection string, skipping connectivity probe");
        return Ok(());
    };

    let address = format!("{}:{}", host, port);
    let timeout = Duration::from_secs(config.connect_timeout_secs);

    match tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), port))).await {
        Ok(Ok(_stream)) => {
            tracing::info!(target: "backend", address = %address, "App successfully connected to the database");
            Ok(())
        }
        Ok(Err(source)) => Err(DatabaseError::Unreachable { address, source }),
        Err(_) => Err(DatabaseError::Timeout {
            address,
            timeout_secs: config.connect_timeout_secs,
        }),
    }
}

//! The persisted token document: load, prune, persist.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tokens::model::{Token, TokenKind};

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("failed to access token file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt token file {path}: {reason}")]
    CorruptPersistedState { path: PathBuf, reason: String },

    #[error("failed to encode token file: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Token arrays grouped by kind, in persisted order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenCollection {
    #[serde(rename = "accessTokens", default)]
    pub access: Vec<Token>,

    #[serde(rename = "refreshTokens", default)]
    pub refresh: Vec<Token>,

    #[serde(rename = "clientTokens", default)]
    pub client: Vec<Token>,

    /// Top-level keys this crate does not manage; written back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// How many tokens a sweep removed, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub access: usize,
    pub refresh: usize,
    pub client: usize,
}

impl PruneReport {
    pub fn total(&self) -> usize {
        self.access + self.refresh + self.client
    }

    fn record(&mut self, kind: TokenKind, removed: usize) {
        match kind {
            TokenKind::Access => self.access += removed,
            TokenKind::Refresh => self.refresh += removed,
            TokenKind::Client => self.client += removed,
        }
    }
}

impl TokenCollection {
    /// Read the document at `path`.
    ///
    /// A missing file is an empty collection. Unparseable JSON, or an entry
    /// whose expiry cannot be resolved, is `CorruptPersistedState`.
    pub fn load(path: &Path) -> Result<Self, TokenError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Token file not found, starting empty");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(TokenError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let collection: TokenCollection =
            serde_json::from_str(&content).map_err(|e| TokenError::CorruptPersistedState {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        for kind in TokenKind::ALL {
            for (index, token) in collection.get(kind).iter().enumerate() {
                if let Err(e) = token.lifetime() {
                    return Err(TokenError::CorruptPersistedState {
                        path: path.to_path_buf(),
                        reason: format!("{}[{}]: {}", kind.document_key(), index, e),
                    });
                }
            }
        }

        Ok(collection)
    }

    pub fn get(&self, kind: TokenKind) -> &[Token] {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
            TokenKind::Client => &self.client,
        }
    }

    fn get_mut(&mut self, kind: TokenKind) -> &mut Vec<Token> {
        match kind {
            TokenKind::Access => &mut self.access,
            TokenKind::Refresh => &mut self.refresh,
            TokenKind::Client => &mut self.client,
        }
    }

    pub fn len(&self) -> usize {
        self.access.len() + self.refresh.len() + self.client.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every token whose expiry is at or before `now`.
    ///
    /// Each token is judged on its own; survivors keep their order. Entries
    /// with an unresolvable lifetime are dropped as well.
    pub fn prune(&mut self, now: DateTime<Utc>) -> PruneReport {
        let mut report = PruneReport::default();

        for kind in TokenKind::ALL {
            let tokens = self.get_mut(kind);
            let before = tokens.len();
            tokens.retain(|token| match token.lifetime() {
                Ok(lifetime) => lifetime.is_live_at(now),
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "Dropping token with unknown expiry");
                    false
                }
            });
            report.record(kind, before - tokens.len());
        }

        report
    }

    /// Write the collection to `path` in the shape it was read.
    ///
    /// The document goes to a sibling temp file first and is renamed into
    /// place, so a crash mid-write leaves the previous file intact.
    pub fn persist(&self, path: &Path) -> Result<(), TokenError> {
        let io_err = |source| TokenError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let body = serde_json::to_string_pretty(self)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, body).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }
}

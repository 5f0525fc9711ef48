//! Startup-swept token store shared with capability modules.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::tokens::collection::{PruneReport, TokenCollection, TokenError};
use crate::tokens::model::{Token, TokenKind, TOKEN_PREFIX};

/// Token lookups for request handlers.
///
/// Built once during bootstrap, before any listener accepts traffic, and
/// shared behind an `Arc` afterwards. Nothing mutates it after the sweep.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
    tokens: TokenCollection,
    swept_at: DateTime<Utc>,
}

impl TokenStore {
    /// Load the persisted document, prune it at `now` and write it back.
    ///
    /// The file is rewritten even when nothing expired.
    pub fn open(path: impl Into<PathBuf>, now: DateTime<Utc>) -> Result<Self, TokenError> {
        let path = path.into();
        let mut tokens = TokenCollection::load(&path)?;
        let report = tokens.prune(now);
        tokens.persist(&path)?;

        log_sweep(&path, &tokens, &report);

        Ok(Self {
            path,
            tokens,
            swept_at: now,
        })
    }

    /// Wrap an in-memory collection without touching disk.
    pub fn from_collection(path: impl Into<PathBuf>, tokens: TokenCollection, now: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            tokens,
            swept_at: now,
        }
    }

    pub fn access(&self) -> &[Token] {
        &self.tokens.access
    }

    pub fn refresh(&self) -> &[Token] {
        &self.tokens.refresh
    }

    pub fn client(&self) -> &[Token] {
        &self.tokens.client
    }

    pub fn tokens(&self, kind: TokenKind) -> &[Token] {
        self.tokens.get(kind)
    }

    /// Find a token by credential, with or without the service prefix.
    pub fn find(&self, kind: TokenKind, value: &str) -> Option<&Token> {
        let needle = value.strip_prefix(TOKEN_PREFIX).unwrap_or(value);
        self.tokens(kind).iter().find(|t| t.bare_value() == needle)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn swept_at(&self) -> DateTime<Utc> {
        self.swept_at
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

fn log_sweep(path: &Path, tokens: &TokenCollection, report: &PruneReport) {
    tracing::info!(
        target: "backend",
        path = %path.display(),
        access = tokens.access.len(),
        refresh = tokens.refresh.len(),
        client = tokens.client.len(),
        pruned = report.total(),
        "Token store ready"
    );
}

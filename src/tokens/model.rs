//! Persisted token entries and their lifetimes.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};

/// Literal prefix the service puts in front of issued JWTs.
pub const TOKEN_PREFIX: &str = "eg1~";

/// The three token families kept by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
    Client,
}

impl TokenKind {
    pub const ALL: [TokenKind; 3] = [TokenKind::Access, TokenKind::Refresh, TokenKind::Client];

    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::Client => "client",
        }
    }

    /// Array name in the persisted document.
    pub fn document_key(self) -> &'static str {
        match self {
            TokenKind::Access => "accessTokens",
            TokenKind::Refresh => "refreshTokens",
            TokenKind::Client => "clientTokens",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timestamp that serializes back exactly as it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    raw: String,
    at: DateTime<Utc>,
}

impl Timestamp {
    pub fn parse(raw: &str) -> Result<Self, chrono::ParseError> {
        let at = DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc);
        Ok(Self {
            raw: raw.to_string(),
            at,
        })
    }

    /// Millisecond precision, matching what the service has always written.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        let at = at.trunc_subsecs(3);
        Self {
            raw: at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            at,
        }
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.at
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Timestamp::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// One persisted credential.
///
/// Fields other than the three the orchestrator inspects are carried in
/// `extra` so rewriting the file never drops data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<Timestamp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours_expire: Option<Number>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Why a token's expiry could not be determined.
#[derive(Debug, thiserror::Error)]
pub enum LifetimeError {
    #[error("token is not a JWT")]
    NotAJwt,

    #[error("JWT payload is not valid base64url: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("JWT payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("missing `{0}`")]
    Missing(&'static str),

    #[error("invalid `creation_date`: {0}")]
    CreationDate(#[from] chrono::ParseError),
}

/// Creation time and validity window of a token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lifetime {
    pub created_at: DateTime<Utc>,
    pub hours: f64,
}

impl Lifetime {
    /// Saturates at the edges of the representable range, so an absurd
    /// `hours_expire` never expires (positive) or is always expired (negative).
    pub fn expires_at(&self) -> DateTime<Utc> {
        let saturated = if self.hours >= 0.0 {
            DateTime::<Utc>::MAX_UTC
        } else {
            DateTime::<Utc>::MIN_UTC
        };

        let millis = (self.hours * 3_600_000.0).round();
        if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
            return saturated;
        }
        TimeDelta::try_milliseconds(millis as i64)
            .and_then(|delta| self.created_at.checked_add_signed(delta))
            .unwrap_or(saturated)
    }

    /// A token survives a sweep at `now` only while its expiry lies strictly ahead.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() > now
    }
}

#[derive(Deserialize)]
struct Claims {
    creation_date: Option<String>,
    hours_expire: Option<f64>,
}

impl Token {
    /// Build a token with explicit lifetime fields.
    pub fn new(value: impl Into<String>, created_at: DateTime<Utc>, hours: u32) -> Self {
        Self {
            token: value.into(),
            creation_date: Some(Timestamp::from_datetime(created_at)),
            hours_expire: Some(Number::from(hours)),
            extra: Map::new(),
        }
    }

    /// The credential without the service prefix.
    pub fn bare_value(&self) -> &str {
        self.token.strip_prefix(TOKEN_PREFIX).unwrap_or(&self.token)
    }

    /// Resolve the lifetime from the entry's own fields, falling back to the
    /// claims embedded in the JWT for whichever field is absent.
    pub fn lifetime(&self) -> Result<Lifetime, LifetimeError> {
        let created = self.creation_date.as_ref().map(Timestamp::as_datetime);
        let hours = self.hours_expire.as_ref().and_then(Number::as_f64);

        if let (Some(created_at), Some(hours)) = (created, hours) {
            return Ok(Lifetime { created_at, hours });
        }

        let claims = self.decode_claims()?;
        let created_at = match created {
            Some(at) => at,
            None => {
                let raw = claims
                    .creation_date
                    .ok_or(LifetimeError::Missing("creation_date"))?;
                Timestamp::parse(&raw)?.as_datetime()
            }
        };
        let hours = hours
            .or(claims.hours_expire)
            .ok_or(LifetimeError::Missing("hours_expire"))?;

        Ok(Lifetime { created_at, hours })
    }

    fn decode_claims(&self) -> Result<Claims, LifetimeError> {
        let mut segments = self.bare_value().split('.');
        let payload = match (segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_)) => payload,
            _ => return Err(LifetimeError::NotAJwt),
        };
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

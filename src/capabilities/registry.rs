//! The mountable-module contract and the ordered registry.

use std::fmt;
use std::sync::Arc;

use axum::routing::MethodRouter;

use crate::config::BackendConfig;
use crate::tokens::TokenStore;

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("route path `{0}` must start with `/`")]
    InvalidPath(String),

    #[error("{0}")]
    Init(String),

    #[error("panicked while mounting: {0}")]
    Panicked(String),
}

impl CapabilityError {
    pub fn init(message: impl Into<String>) -> Self {
        CapabilityError::Init(message.into())
    }
}

/// What a module may use while mounting.
///
/// Handed over explicitly so handlers never reach for process-wide state.
#[derive(Clone)]
pub struct CapabilityContext {
    pub config: Arc<BackendConfig>,
    pub tokens: Arc<TokenStore>,
    /// Per-process secret for signing issued credentials.
    pub signing_secret: Arc<str>,
    pub version: &'static str,
}

impl fmt::Debug for CapabilityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityContext")
            .field("tokens", &self.tokens.len())
            .field("signing_secret", &"***")
            .field("version", &self.version)
            .finish()
    }
}

/// Routes a module stages while mounting. Nothing reaches the shared router
/// until the module's `mount` has returned `Ok`.
pub struct Mount<'a> {
    context: &'a CapabilityContext,
    routes: Vec<(String, MethodRouter)>,
}

impl<'a> Mount<'a> {
    pub(crate) fn new(context: &'a CapabilityContext) -> Self {
        Self {
            context,
            routes: Vec::new(),
        }
    }

    pub fn context(&self) -> &CapabilityContext {
        self.context
    }

    /// Claim `path` for `handler`.
    pub fn route(&mut self, path: &str, handler: MethodRouter) -> Result<&mut Self, CapabilityError> {
        if !path.starts_with('/') {
            return Err(CapabilityError::InvalidPath(path.to_string()));
        }
        self.routes.push((path.to_string(), handler));
        Ok(self)
    }

    pub(crate) fn into_routes(self) -> Vec<(String, MethodRouter)> {
        self.routes
    }
}

/// A unit of request-handling behaviour.
pub trait Capability: Send + Sync {
    /// Identifier used in logs and descriptors.
    fn name(&self) -> &str;

    fn mount(&self, mount: &mut Mount<'_>) -> Result<(), CapabilityError>;
}

/// An ordered group of modules, e.g. `routes` or `api`.
///
/// Modules mount in the order they were added; across sets, in the order the
/// sets are passed to the loader. Earlier modules win route conflicts.
pub struct CapabilitySet {
    source: String,
    modules: Vec<Box<dyn Capability>>,
}

impl CapabilitySet {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            modules: Vec::new(),
        }
    }

    pub fn with(mut self, module: impl Capability + 'static) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    pub fn push(&mut self, module: Box<dyn Capability>) {
        self.modules.push(module);
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn modules(&self) -> &[Box<dyn Capability>] {
        &self.modules
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.modules.iter().map(|m| m.name()).collect();
        f.debug_struct("CapabilitySet")
            .field("source", &self.source)
            .field("modules", &names)
            .finish()
    }
}

#[cfg(test)]
impl CapabilityContext {
    pub(crate) fn for_tests() -> Self {
        let tokens = TokenStore::from_collection(
            "tokens.json",
            crate::tokens::TokenCollection::default(),
            chrono::Utc::now(),
        );
        Self {
            config: Arc::new(BackendConfig::default()),
            tokens: Arc::new(tokens),
            signing_secret: Arc::from("test-secret"),
            version: "0.0.0-test",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    #[test]
    fn mount_rejects_relative_paths() {
        let context = CapabilityContext::for_tests();
        let mut mount = Mount::new(&context);

        assert!(mount.route("/ok", get(|| async { "ok" })).is_ok());
        let err = mount.route("relative", get(|| async { "no" })).err().unwrap();
        assert!(matches!(err, CapabilityError::InvalidPath(p) if p == "relative"));
        assert_eq!(mount.into_routes().len(), 1);
    }

    #[test]
    fn context_debug_hides_secret() {
        let rendered = format!("{:?}", CapabilityContext::for_tests());
        assert!(!rendered.contains("test-secret"));
    }
}

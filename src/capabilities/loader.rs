//! Mounting capability modules onto one router.
//!
//! # Responsibilities
//! - Mount every registered module, in registry order
//! - Isolate failures: an error or panic in one module is logged and skipped
//! - Resolve route conflicts per path and method (earlier module wins)
//! - Describe the outcome of every module for logs and callers

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use axum::Router;
use serde::Serialize;

use crate::capabilities::registry::{Capability, CapabilityContext, CapabilityError, CapabilitySet, Mount};
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Loaded,
    Failed,
}

/// Outcome of loading one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleDescriptor {
    pub name: String,
    pub source: String,
    pub status: LoadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Routes this module owns.
    pub routes: Vec<String>,
    /// Routes this module asked for but an earlier module already held, either
    /// for an overlapping method or as a pattern the router cannot tell apart.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shadowed: Vec<String>,
}

impl ModuleDescriptor {
    pub fn is_loaded(&self) -> bool {
        self.status == LoadStatus::Loaded
    }
}

/// The mounted router and what happened to each module.
pub struct LoadedCapabilities {
    pub router: Router,
    pub modules: Vec<ModuleDescriptor>,
}

impl LoadedCapabilities {
    pub fn loaded_count(&self) -> usize {
        self.modules.iter().filter(|m| m.is_loaded()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules.iter().filter(|m| !m.is_loaded())
    }
}

pub struct CapabilityLoader<'a> {
    context: &'a CapabilityContext,
}

impl<'a> CapabilityLoader<'a> {
    pub fn new(context: &'a CapabilityContext) -> Self {
        Self { context }
    }

    /// Mount every module of every set. Never fails as a whole.
    pub fn load_all(&self, sets: &[CapabilitySet]) -> LoadedCapabilities {
        let mut router = Router::new();
        let mut claimed: HashMap<String, String> = HashMap::new();
        let mut modules = Vec::new();

        for set in sets {
            for module in set.modules() {
                let descriptor =
                    self.load_one(set.source(), module.as_ref(), &mut router, &mut claimed);
                modules.push(descriptor);
            }
        }

        let loaded = modules.iter().filter(|m| m.is_loaded()).count();
        tracing::info!(
            target: "backend",
            loaded,
            failed = modules.len() - loaded,
            routes = claimed.len(),
            "Capability modules mounted"
        );

        LoadedCapabilities { router, modules }
    }

    fn load_one(
        &self,
        source: &str,
        module: &dyn Capability,
        router: &mut Router,
        claimed: &mut HashMap<String, String>,
    ) -> ModuleDescriptor {
        let name = module.name().to_string();
        let mut mount = Mount::new(self.context);

        let result = panic::catch_unwind(AssertUnwindSafe(|| module.mount(&mut mount)))
            .unwrap_or_else(|payload| Err(CapabilityError::Panicked(panic_message(payload.as_ref()))));

        if let Err(e) = result {
            tracing::error!(
                target: "backend",
                source = source,
                module = %name,
                error = %e,
                "Failed to load module"
            );
            metrics::record_module_load("failed");
            return ModuleDescriptor {
                name,
                source: source.to_string(),
                status: LoadStatus::Failed,
                error: Some(e.to_string()),
                routes: Vec::new(),
                shadowed: Vec::new(),
            };
        }

        let mut routes = Vec::new();
        let mut shadowed = Vec::new();

        for (path, handler) in mount.into_routes() {
            // Mounting a claimed path merges the method routers. The router
            // panics when methods overlap or patterns are ambiguous; try on a
            // clone so the shared router stays intact.
            let candidate = router.clone();
            match panic::catch_unwind(AssertUnwindSafe(|| candidate.route(&path, handler))) {
                Ok(next) => {
                    *router = next;
                    claimed.entry(path.clone()).or_insert_with(|| name.clone());
                    routes.push(path);
                }
                Err(payload) => {
                    match claimed.get(&path) {
                        Some(owner) => tracing::warn!(
                            target: "backend",
                            module = %name,
                            path = %path,
                            owner = %owner,
                            "Route method already mounted by an earlier module"
                        ),
                        None => tracing::warn!(
                            target: "backend",
                            module = %name,
                            path = %path,
                            reason = %panic_message(payload.as_ref()),
                            "Route rejected by router"
                        ),
                    }
                    shadowed.push(path);
                }
            }
        }

        tracing::debug!(target: "backend", source = source, module = %name, routes = routes.len(), "Module loaded");
        metrics::record_module_load("loaded");

        ModuleDescriptor {
            name,
            source: source.to_string(),
            status: LoadStatus::Loaded,
            error: None,
            routes,
            shadowed,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::http::Method;
    use axum::routing::{get, post};
    use tower::ServiceExt;

    struct Fixed {
        name: &'static str,
        paths: &'static [&'static str],
        body: &'static str,
    }

    impl Capability for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn mount(&self, mount: &mut Mount<'_>) -> Result<(), CapabilityError> {
            for path in self.paths {
                let body = self.body;
                mount.route(path, get(move || async move { body }))?;
            }
            Ok(())
        }
    }

    /// Stages a route, then fails.
    struct Broken;

    impl Capability for Broken {
        fn name(&self) -> &str {
            "broken.js"
        }

        fn mount(&self, mount: &mut Mount<'_>) -> Result<(), CapabilityError> {
            mount.route("/broken", get(|| async { "half" }))?;
            Err(CapabilityError::init("missing dependency"))
        }
    }

    struct Panics;

    impl Capability for Panics {
        fn name(&self) -> &str {
            "panics.js"
        }

        fn mount(&self, _mount: &mut Mount<'_>) -> Result<(), CapabilityError> {
            panic!("boom")
        }
    }

    /// Accepts submissions on a path another module may already serve.
    struct Submit(&'static str);

    impl Capability for Submit {
        fn name(&self) -> &str {
            "submit.js"
        }

        fn mount(&self, mount: &mut Mount<'_>) -> Result<(), CapabilityError> {
            mount.route(self.0, post(|| async { "submitted" }))?;
            Ok(())
        }
    }

    async fn get_body(router: &Router, uri: &str) -> (StatusCode, String) {
        send(router, Method::GET, uri).await
    }

    async fn send(router: &Router, method: Method, uri: &str) -> (StatusCode, String) {
        let response = router
            .clone()
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn one_failure_does_not_affect_others() {
        let context = CapabilityContext::for_tests();
        let sets = vec![CapabilitySet::new("routes")
            .with(Fixed { name: "account.js", paths: &["/account"], body: "account" })
            .with(Broken)
            .with(Fixed { name: "lobby.js", paths: &["/lobby"], body: "lobby" })];

        let loaded = CapabilityLoader::new(&context).load_all(&sets);

        assert_eq!(loaded.loaded_count(), 2);
        let failures: Vec<_> = loaded.failures().map(|m| m.name.as_str()).collect();
        assert_eq!(failures, vec!["broken.js"]);
        assert_eq!(loaded.modules[1].error.as_deref(), Some("missing dependency"));

        assert_eq!(get_body(&loaded.router, "/account").await.1, "account");
        assert_eq!(get_body(&loaded.router, "/lobby").await.1, "lobby");
        // Staged routes of a failed module never land.
        assert_eq!(get_body(&loaded.router, "/broken").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn panicking_module_is_isolated() {
        let context = CapabilityContext::for_tests();
        let sets = vec![
            CapabilitySet::new("routes").with(Panics),
            CapabilitySet::new("api").with(Fixed { name: "api.js", paths: &["/api/v1"], body: "v1" }),
        ];

        let loaded = CapabilityLoader::new(&context).load_all(&sets);

        assert_eq!(loaded.modules[0].status, LoadStatus::Failed);
        assert!(loaded.modules[0].error.as_deref().unwrap().contains("boom"));
        assert_eq!(loaded.modules[1].source, "api");
        assert!(loaded.modules[1].is_loaded());
    }

    #[tokio::test]
    async fn earlier_module_wins_conflicts() {
        let context = CapabilityContext::for_tests();
        let sets = vec![CapabilitySet::new("routes")
            .with(Fixed { name: "first.js", paths: &["/shared"], body: "first" })
            .with(Fixed { name: "second.js", paths: &["/shared", "/own"], body: "second" })];

        let loaded = CapabilityLoader::new(&context).load_all(&sets);

        assert_eq!(get_body(&loaded.router, "/shared").await.1, "first");
        assert_eq!(get_body(&loaded.router, "/own").await.1, "second");

        let second = &loaded.modules[1];
        assert!(second.is_loaded());
        assert_eq!(second.routes, vec!["/own".to_string()]);
        assert_eq!(second.shadowed, vec!["/shared".to_string()]);
    }

    #[tokio::test]
    async fn later_module_adds_methods_to_a_claimed_path() {
        let context = CapabilityContext::for_tests();
        let sets = vec![
            CapabilitySet::new("routes").with(Fixed { name: "read.js", paths: &["/x"], body: "read" }),
            CapabilitySet::new("api").with(Submit("/x")),
        ];

        let loaded = CapabilityLoader::new(&context).load_all(&sets);

        assert_eq!(get_body(&loaded.router, "/x").await.1, "read");
        assert_eq!(send(&loaded.router, Method::POST, "/x").await.1, "submitted");
        assert_eq!(loaded.modules[1].routes, vec!["/x".to_string()]);
        assert!(loaded.modules[1].shadowed.is_empty());
    }

    #[tokio::test]
    async fn same_method_on_a_merged_path_stays_with_the_first_module() {
        let context = CapabilityContext::for_tests();
        let sets = vec![CapabilitySet::new("routes")
            .with(Fixed { name: "read.js", paths: &["/x"], body: "read" })
            .with(Submit("/x"))
            .with(Submit("/x"))];

        let loaded = CapabilityLoader::new(&context).load_all(&sets);

        assert_eq!(get_body(&loaded.router, "/x").await.1, "read");
        assert_eq!(send(&loaded.router, Method::POST, "/x").await.1, "submitted");
        assert_eq!(loaded.modules[2].shadowed, vec!["/x".to_string()]);
    }

    #[tokio::test]
    async fn ambiguous_patterns_keep_the_earlier_route() {
        let context = CapabilityContext::for_tests();
        let sets = vec![CapabilitySet::new("routes")
            .with(Fixed { name: "first.js", paths: &["/users/{id}"], body: "first" })
            .with(Fixed { name: "second.js", paths: &["/users/{name}"], body: "second" })];

        let loaded = CapabilityLoader::new(&context).load_all(&sets);

        assert_eq!(get_body(&loaded.router, "/users/7").await.1, "first");
        assert_eq!(loaded.modules[1].shadowed, vec!["/users/{name}".to_string()]);
    }

    #[test]
    fn descriptor_serializes_status() {
        let descriptor = ModuleDescriptor {
            name: "a.js".into(),
            source: "routes".into(),
            status: LoadStatus::Failed,
            error: Some("x".into()),
            routes: Vec::new(),
            shadowed: Vec::new(),
        };
        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["status"], "failed");
        assert!(value.get("shadowed").is_none());
    }
}

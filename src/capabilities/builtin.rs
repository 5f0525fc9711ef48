//! Modules that ship with the backend itself.

use axum::response::Html;
use axum::routing::get;
use axum::Json;
use serde_json::json;

use crate::capabilities::registry::{Capability, CapabilityError, Mount};

/// `GET /unknown`: identifies the backend to clients probing it.
pub struct StatusMessage;

impl Capability for StatusMessage {
    fn name(&self) -> &str {
        "status"
    }

    fn mount(&self, mount: &mut Mount<'_>) -> Result<(), CapabilityError> {
        mount.route(
            "/unknown",
            get(|| async {
                tracing::debug!(target: "backend", "GET /unknown endpoint called");
                Json(json!({ "msg": "Reload Backend - Made by Burlone" }))
            }),
        )?;
        Ok(())
    }
}

/// Landing page served by the companion website listener.
pub struct LandingPage;

impl Capability for LandingPage {
    fn name(&self) -> &str {
        "landing"
    }

    fn mount(&self, mount: &mut Mount<'_>) -> Result<(), CapabilityError> {
        let version = mount.context().version;
        mount.route(
            "/",
            get(move || async move {
                Html(format!(
                    "<!doctype html><html><head><title>Reload Backend</title></head>\
                     <body><h1>Reload Backend</h1><p>v{}</p></body></html>",
                    version
                ))
            }),
        )?;
        Ok(())
    }
}

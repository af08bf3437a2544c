//! Liveness endpoint.
//!
//! Manifest entry: `health = { path = "/health" }` (path optional).

use async_trait::async_trait;
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use crate::composer::Plugin;
use crate::error::BoxError;

const DEFAULT_PATH: &str = "/health";

pub struct HealthPlugin {
    path: String,
}

impl HealthPlugin {
    pub fn from_options(options: &Value) -> Result<Self, BoxError> {
        let path = match options.get("path") {
            None => DEFAULT_PATH.to_string(),
            Some(Value::String(path)) if path.starts_with('/') => path.clone(),
            Some(other) => return Err(format!("path must be a string starting with '/', got {other}").into()),
        };
        Ok(Self { path })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl Plugin for HealthPlugin {
    fn router(&self) -> Router {
        Router::new().route(&self.path, get(|| async { Json(json!({ "status": "ok" })) }))
    }
}

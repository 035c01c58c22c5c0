//! Tracing setup with a runtime-adjustable filter.
//!
//! `GET /debug/flags/v` returns the active filter directive;
//! `PUT /debug/flags/v` with a plain-text directive replaces it.

use std::sync::{Arc, RwLock};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

use crate::config::LogFormat;

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Handle for inspecting and swapping the global log filter.
#[derive(Clone)]
pub struct LogControl {
    handle: FilterHandle,
    current: Arc<RwLock<String>>,
}

impl LogControl {
    pub fn new(handle: FilterHandle, directive: &str) -> Self {
        Self {
            handle,
            current: Arc::new(RwLock::new(directive.to_string())),
        }
    }

    pub fn current(&self) -> String {
        self.current.read().expect("log filter lock").clone()
    }

    /// Parse and install a new directive, returning it normalized.
    pub fn set(&self, directive: &str) -> anyhow::Result<String> {
        let directive = directive.trim();
        if directive.is_empty() {
            anyhow::bail!("empty filter directive");
        }
        let filter = EnvFilter::try_new(directive)?;
        let normalized = filter.to_string();
        self.handle.reload(filter)?;
        *self.current.write().expect("log filter lock") = normalized.clone();
        info!(filter = %normalized, "log filter changed");
        Ok(normalized)
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init(format: LogFormat, default_filter: &str) -> anyhow::Result<LogControl> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)?,
    };
    let directive = filter.to_string();
    let (filter, handle) = reload::Layer::new(filter);
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(fmt::layer()).try_init()?,
        LogFormat::Json => registry.with(fmt::layer().json()).try_init()?,
    }

    Ok(LogControl::new(handle, &directive))
}

/// Routes for reading and changing the log filter.
pub fn router(control: LogControl) -> Router {
    Router::new()
        .route("/debug/flags/v", get(get_filter).put(put_filter))
        .with_state(control)
}

/// GET /debug/flags/v
async fn get_filter(State(control): State<LogControl>) -> String {
    control.current()
}

/// PUT /debug/flags/v
async fn put_filter(State(control): State<LogControl>, body: String) -> (StatusCode, String) {
    match control.set(&body) {
        Ok(directive) => (StatusCode::OK, directive),
        Err(e) => (StatusCode::BAD_REQUEST, format!("invalid filter: {e}")),
    }
}

//! Application state

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tollgate_auth::TokenVerifier;
use tollgate_core::AuthService;

/// Handle used to render the Prometheus exposition
pub type MetricsHandle = PrometheusHandle;

/// How the refresh-token cookie is emitted
#[derive(Debug, Clone)]
pub struct CookieSettings {
    /// Add the `Secure` attribute (set behind TLS)
    pub secure: bool,
    /// Cookie path; the browser only sends it to these routes
    pub path: String,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            secure: false,
            path: "/auth".to_string(),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub verifier: Arc<TokenVerifier>,
    pub cookie: CookieSettings,
}

impl AppState {
    pub fn new(auth: Arc<AuthService>, cookie: CookieSettings) -> Self {
        let verifier = Arc::new(auth.verifier().clone());
        Self {
            auth,
            verifier,
            cookie,
        }
    }
}

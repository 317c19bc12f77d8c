//! Optional page-view analytics.
//!
//! Whether analytics may run at all is decided by the [`Environment`] handed in at
//! startup, never by probing the process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::AnalyticsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Test,
}

impl Environment {
    pub fn supports_analytics(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Clone)]
pub struct Analytics {
    inner: Option<Arc<Tracker>>,
}

struct Tracker {
    measurement_id: Option<String>,
    page_views: AtomicU64,
}

impl Analytics {
    pub fn new(environment: Environment, config: &AnalyticsConfig) -> Self {
        if !(config.enabled && environment.supports_analytics()) {
            return Self::disabled();
        }

        tracing::info!(
            target: "powerpal::analytics",
            measurement_id = config.measurement_id.as_deref().unwrap_or("-"),
            "analytics enabled"
        );
        Self {
            inner: Some(Arc::new(Tracker {
                measurement_id: config.measurement_id.clone(),
                page_views: AtomicU64::new(0),
            })),
        }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn page_view(&self, page: &str) {
        let Some(tracker) = &self.inner else {
            return;
        };
        let count = tracker.page_views.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            target: "powerpal::analytics",
            page,
            count,
            measurement_id = tracker.measurement_id.as_deref().unwrap_or("-"),
            "page_view"
        );
    }

    pub fn page_views(&self) -> u64 {
        self.inner
            .as_ref()
            .map_or(0, |t| t.page_views.load(Ordering::Relaxed))
    }
}

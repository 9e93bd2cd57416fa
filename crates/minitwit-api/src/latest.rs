use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::{Context, Result};
use axum::{
    Json,
    extract::{Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{debug, error, warn};

use minitwit_types::api::LatestResponse;

use crate::AppState;
use crate::error::ApiError;

/// Value reported before any `latest` has been recorded.
pub const UNSET: i64 = -1;

/// Last action id acknowledged to the simulator.
///
/// Last writer wins; implementations only guarantee that a concurrent
/// `record` never leaves a torn value behind.
pub trait LatestTracker: Send + Sync {
    fn record(&self, id: i64) -> Result<()>;
    fn read(&self) -> Result<i64>;
}

/// Overwrite the marker if the caller supplied an id. Failures are logged
/// and swallowed: they must not change the outcome of the request.
pub fn record_if_present(tracker: &dyn LatestTracker, latest: Option<i64>) {
    if let Some(id) = latest {
        match tracker.record(id) {
            Ok(()) => debug!("Recorded latest = {}", id),
            Err(e) => warn!("Failed to record latest = {}: {:#}", id, e),
        }
    }
}

/// Marker persisted to a side-file, replaced atomically on every write.
pub struct FileLatestTracker {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileLatestTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

impl LatestTracker for FileLatestTracker {
    fn record(&self, id: i64) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| anyhow::anyhow!("latest lock poisoned: {}", e))?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, id.to_string())
            .with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }

    fn read(&self) -> Result<i64> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(UNSET),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()));
            }
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(UNSET);
        }
        trimmed
            .parse()
            .with_context(|| format!("corrupt latest marker {:?}", trimmed))
    }
}

/// In-process marker, for tests and ephemeral deployments.
pub struct MemoryLatestTracker(AtomicI64);

impl Default for MemoryLatestTracker {
    fn default() -> Self {
        Self(AtomicI64::new(UNSET))
    }
}

impl LatestTracker for MemoryLatestTracker {
    fn record(&self, id: i64) -> Result<()> {
        self.0.store(id, Ordering::SeqCst);
        Ok(())
    }

    fn read(&self) -> Result<i64> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Default, Deserialize)]
struct LatestQuery {
    latest: Option<String>,
}

fn latest_param(req: &Request) -> Option<i64> {
    let Query(query) = Query::<LatestQuery>::try_from_uri(req.uri()).ok()?;
    query.latest?.trim().parse().ok()
}

/// Records `?latest=` before dispatching, so every route and every outcome
/// (including rejected credentials and unknown users) updates the marker.
pub async fn track_latest(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let latest = latest_param(&req);

    if latest.is_some() {
        let tracker = state.latest.clone();
        if let Err(e) =
            tokio::task::spawn_blocking(move || record_if_present(tracker.as_ref(), latest)).await
        {
            error!("spawn_blocking join error: {}", e);
        }
    }

    next.run(req).await
}

/// GET /latest
pub async fn get_latest(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let tracker = state.latest.clone();
    let latest = tokio::task::spawn_blocking(move || tracker.read())
        .await
        .map_err(|e| ApiError::Store(anyhow::anyhow!("worker task failed: {}", e)))??;

    Ok(Json(LatestResponse { latest }))
}

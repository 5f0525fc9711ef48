//! Update-check polling.
//!
//! # Responsibilities
//! - Ask a [`VersionSource`] for the latest published version on a fixed interval
//! - Log once when a strictly newer version appears, then stop asking
//!
//! # Design Decisions
//! - One sequential loop per task: runs never overlap
//! - Failures wait for the next tick; there is no early retry

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::observability::metrics;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("version request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("version source answered {0}")]
    Status(reqwest::StatusCode),

    #[error("`{0}` is not a dotted version")]
    Malformed(String),
}

/// Where the latest published version comes from.
pub trait VersionSource: Send + Sync + 'static {
    fn latest_version(&self) -> BoxFuture<'_, Result<String, UpdateError>>;
}

#[derive(Debug, Deserialize)]
struct VersionDocument {
    version: String,
}

/// Fetches `{"version": "x.y.z"}` from a URL.
#[derive(Debug, Clone)]
pub struct HttpVersionSource {
    client: reqwest::Client,
    url: String,
}

impl HttpVersionSource {
    pub fn new(url: impl Into<String>) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("reload-backend/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl VersionSource for HttpVersionSource {
    fn latest_version(&self) -> BoxFuture<'_, Result<String, UpdateError>> {
        Box::pin(async move {
            let response = self.client.get(&self.url).send().await?;
            if !response.status().is_success() {
                return Err(UpdateError::Status(response.status()));
            }
            let document: VersionDocument = response.json().await?;
            Ok(document.version)
        })
    }
}

fn parse_version(raw: &str) -> Option<Vec<u64>> {
    let trimmed = raw.trim().trim_start_matches(['v', 'V']);
    if trimmed.is_empty() {
        return None;
    }
    // Pre-release and build suffixes are ignored: "1.2.3-beta" compares as 1.2.3.
    let core = trimmed.split(['-', '+']).next().unwrap_or(trimmed);
    core.split('.').map(|part| part.parse().ok()).collect()
}

/// Whether `candidate` is strictly newer than `current`. Missing trailing
/// components count as zero.
pub fn is_newer(candidate: &str, current: &str) -> Result<bool, UpdateError> {
    let candidate_parts = parse_version(candidate).ok_or_else(|| UpdateError::Malformed(candidate.to_string()))?;
    let current_parts = parse_version(current).ok_or_else(|| UpdateError::Malformed(current.to_string()))?;

    let len = candidate_parts.len().max(current_parts.len());
    for i in 0..len {
        let a = candidate_parts.get(i).copied().unwrap_or(0);
        let b = current_parts.get(i).copied().unwrap_or(0);
        match a.cmp(&b) {
            CmpOrdering::Greater => return Ok(true),
            CmpOrdering::Less => return Ok(false),
            CmpOrdering::Equal => {}
        }
    }
    Ok(false)
}

/// Result of one run of the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// An update was already found earlier; the source was not asked.
    Latched,
    UpToDate,
    UpdateFound(String),
    Failed,
}

pub struct UpdateCheckTask {
    source: Arc<dyn VersionSource>,
    current: String,
    interval: Duration,
    found: AtomicBool,
}

impl UpdateCheckTask {
    pub fn new(source: Arc<dyn VersionSource>, current: impl Into<String>, interval: Duration) -> Self {
        Self {
            source,
            current: current.into(),
            interval,
            found: AtomicBool::new(false),
        }
    }

    pub fn update_found(&self) -> bool {
        self.found.load(Ordering::SeqCst)
    }

    pub async fn run_once(&self) -> CheckOutcome {
        if self.update_found() {
            return CheckOutcome::Latched;
        }

        let latest = match self.source.latest_version().await {
            Ok(latest) => latest,
            Err(e) => {
                tracing::warn!(target: "backend", error = %e, "Update check failed");
                metrics::record_update_check("failed");
                return CheckOutcome::Failed;
            }
        };

        match is_newer(&latest, &self.current) {
            Ok(true) => {
                self.found.store(true, Ordering::SeqCst);
                tracing::warn!(
                    target: "backend",
                    current = %self.current,
                    latest = %latest,
                    "A new version of the backend is available"
                );
                metrics::record_update_check("found");
                CheckOutcome::UpdateFound(latest)
            }
            Ok(false) => {
                tracing::debug!(current = %self.current, latest = %latest, "Backend is up to date");
                metrics::record_update_check("current");
                CheckOutcome::UpToDate
            }
            Err(e) => {
                tracing::warn!(target: "backend", error = %e, "Update check failed");
                metrics::record_update_check("failed");
                CheckOutcome::Failed
            }
        }
    }

    /// Poll until shutdown. The first run happens immediately.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Update check starting");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Update check received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct ScriptedSource {
        calls: AtomicUsize,
        answers: Mutex<Vec<Result<String, UpdateError>>>,
    }

    impl ScriptedSource {
        fn new(mut answers: Vec<Result<String, UpdateError>>) -> Arc<Self> {
            answers.reverse();
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                answers: Mutex::new(answers),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl VersionSource for ScriptedSource {
        fn latest_version(&self) -> BoxFuture<'_, Result<String, UpdateError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let answer = self
                .answers
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok("1.0.0".to_string()));
            Box::pin(async move { answer })
        }
    }

    fn task(source: Arc<ScriptedSource>) -> UpdateCheckTask {
        UpdateCheckTask::new(source, "1.0.0", Duration::from_secs(60))
    }

    #[test]
    fn compares_dotted_versions() {
        assert!(is_newer("1.0.1", "1.0.0").unwrap());
        assert!(is_newer("1.10.0", "1.9.9").unwrap());
        assert!(is_newer("v2", "1.99.99").unwrap());
        assert!(!is_newer("1.0", "1.0.0").unwrap());
        assert!(!is_newer("0.9.9", "1.0.0").unwrap());
        assert!(!is_newer("1.0.0-beta", "1.0.0").unwrap());
        assert!(matches!(is_newer("latest", "1.0.0"), Err(UpdateError::Malformed(_))));
    }

    #[tokio::test]
    async fn same_version_is_up_to_date() {
        let source = ScriptedSource::new(vec![Ok("1.0.0".into())]);
        let task = task(Arc::clone(&source));
        assert_eq!(task.run_once().await, CheckOutcome::UpToDate);
        assert!(!task.update_found());
    }

    #[tokio::test]
    async fn latched_task_never_asks_again() {
        let source = ScriptedSource::new(vec![Ok("1.1.0".into())]);
        let task = task(Arc::clone(&source));

        assert_eq!(task.run_once().await, CheckOutcome::UpdateFound("1.1.0".into()));
        assert!(task.update_found());

        for _ in 0..5 {
            assert_eq!(task.run_once().await, CheckOutcome::Latched);
        }
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn failure_does_not_latch() {
        let source = ScriptedSource::new(vec![
            Err(UpdateError::Malformed("garbage".into())),
            Ok("1.2.0".into()),
        ]);
        let task = task(Arc::clone(&source));

        assert_eq!(task.run_once().await, CheckOutcome::Failed);
        assert!(!task.update_found());
        assert_eq!(task.run_once().await, CheckOutcome::UpdateFound("1.2.0".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn loop_polls_on_interval_until_shutdown() {
        let source = ScriptedSource::new(vec![]);
        let task = Arc::new(task(Arc::clone(&source)));
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(Arc::clone(&task).run(rx));
        // First tick is immediate, then one per minute.
        time::sleep(Duration::from_secs(150)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(source.calls(), 3);
    }
}

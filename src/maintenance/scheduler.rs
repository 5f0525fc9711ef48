//! Owner of the recurring background tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::BackendConfig;
use crate::lifecycle::Shutdown;
use crate::maintenance::companion::Companion;
use crate::maintenance::restart::{RestartHook, RestartSchedule, RestartScheduleError, RestartTask};
use crate::maintenance::update::{UpdateCheckTask, VersionSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    UpdateCheck,
    Restart,
    Rotation,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::UpdateCheck => "update-check",
            TaskKind::Restart => "restart",
            TaskKind::Rotation => "rotation",
        }
    }
}

/// The tasks enabled by configuration, not yet running.
#[derive(Default)]
pub struct MaintenancePlan {
    update_check: Option<Arc<UpdateCheckTask>>,
    restart: Option<RestartTask>,
    rotation: Option<Arc<dyn Companion>>,
}

impl MaintenancePlan {
    /// Decide which tasks run. `version_source` is `None` when nothing to
    /// poll is configured.
    pub fn from_config(
        config: &BackendConfig,
        version: &str,
        version_source: Option<Arc<dyn VersionSource>>,
        restart_hook: Arc<dyn RestartHook>,
        rotation: Arc<dyn Companion>,
    ) -> Result<Self, RestartScheduleError> {
        let mut plan = Self::default();

        if config.update_check.enabled {
            match version_source {
                Some(source) => {
                    plan.update_check = Some(Arc::new(UpdateCheckTask::new(
                        source,
                        version,
                        Duration::from_secs(config.update_check.interval_secs),
                    )));
                }
                None => tracing::info!("No version source configured, update check disabled"),
            }
        }

        if config.enable_auto_restart {
            let schedule = RestartSchedule::parse(&config.restart_time)?;
            plan.restart = Some(RestartTask::new(schedule, restart_hook));
        }

        if config.use_auto_rotate {
            plan.rotation = Some(rotation);
        }

        Ok(plan)
    }

    pub fn kinds(&self) -> Vec<TaskKind> {
        let mut kinds = Vec::new();
        if self.update_check.is_some() {
            kinds.push(TaskKind::UpdateCheck);
        }
        if self.restart.is_some() {
            kinds.push(TaskKind::Restart);
        }
        if self.rotation.is_some() {
            kinds.push(TaskKind::Rotation);
        }
        kinds
    }
}

/// Running maintenance tasks. Each one stops on the shutdown broadcast.
pub struct MaintenanceScheduler {
    tasks: Vec<(TaskKind, JoinHandle<()>)>,
    update_check: Option<Arc<UpdateCheckTask>>,
}

impl MaintenanceScheduler {
    pub fn start_all(plan: MaintenancePlan, shutdown: &Shutdown) -> Self {
        let mut tasks = Vec::new();

        if let Some(task) = &plan.update_check {
            let handle = tokio::spawn(Arc::clone(task).run(shutdown.subscribe()));
            tasks.push((TaskKind::UpdateCheck, handle));
        }

        if let Some(task) = plan.restart {
            tasks.push((TaskKind::Restart, tokio::spawn(task.run(shutdown.subscribe()))));
        }

        if let Some(companion) = plan.rotation {
            tasks.push((TaskKind::Rotation, tokio::spawn(companion.start(shutdown.subscribe()))));
        }

        let names: Vec<_> = tasks.iter().map(|(kind, _)| kind.as_str()).collect();
        tracing::info!(tasks = ?names, "Maintenance tasks started");

        Self {
            tasks,
            update_check: plan.update_check,
        }
    }

    pub fn running(&self) -> Vec<TaskKind> {
        self.tasks.iter().map(|(kind, _)| *kind).collect()
    }

    pub fn update_found(&self) -> bool {
        self.update_check.as_ref().is_some_and(|task| task.update_found())
    }

    /// Wait for every task to finish after shutdown has been triggered.
    pub async fn join(self) {
        for (kind, handle) in self.tasks {
            if let Err(e) = handle.await {
                tracing::error!(task = kind.as_str(), error = %e, "Maintenance task ended abnormally");
            }
        }
    }
}

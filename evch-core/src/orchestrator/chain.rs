//! Start, warning, cleanup and deletion extension.

use super::LifecycleOrchestrator;
use crate::registry::{EventKey, LifecycleState};
use crate::scheduler::TaskKind;
use crate::utils::timing;
use tracing::{debug, error, info, warn};

impl LifecycleOrchestrator {
    pub(super) async fn run_start(&self, key: EventKey) {
        let started = self
            .inner
            .registry
            .with_lock(key, |record| {
                (record.state == LifecycleState::Provisioned).then(|| {
                    record.state = LifecycleState::Started;
                    record.clone()
                })
            })
            .await
            .flatten();
        let Some(record) = started else {
            debug!(%key, "Start task no longer applies");
            return;
        };
        info!(%key, "Event started");
        self.schedule(key, TaskKind::Warning, timing::warning_time(record.delete_at));

        let config = self.inner.configs.get(key.guild).await;
        self.notify(&record, config.start_template(), record.start_time)
            .await;
    }

    /// Warn about the upcoming deletion and lock the resources.
    pub(super) async fn run_warning(&self, key: EventKey) {
        let warned = self
            .inner
            .registry
            .with_lock(key, |record| {
                (record.state == LifecycleState::Started).then(|| {
                    record.state = LifecycleState::Warned;
                    record.clone()
                })
            })
            .await
            .flatten();
        let Some(record) = warned else {
            debug!(%key, "Warning task no longer applies");
            return;
        };
        info!(%key, delete_at = %record.delete_at, "Deletion warning");
        self.schedule(key, TaskKind::Cleanup, record.delete_at);

        let config = self.inner.configs.get(key.guild).await;
        if let (Some(template), Some(text)) = (config.warning_template(), record.resources.text) {
            match self.inner.notifications.last_activity(key.guild, text).await {
                Ok(last) if timing::is_recent_activity(last, self.now()) => {
                    self.notify(&record, Some(template), record.delete_at).await;
                }
                Ok(_) => debug!(%key, "No recent activity, deletion warning not posted"),
                Err(e) => warn!(%key, error = %e, "Failed to read channel activity"),
            }
        }

        let access = Self::access(&record, &config);
        if let Err(e) = self
            .inner
            .provisioning
            .lock(key.guild, &record.resources, &access)
            .await
        {
            error!(%key, error = %e, "Failed to lock event resources");
        }
    }

    pub(super) async fn run_cleanup(&self, key: EventKey) {
        let taken = self
            .inner
            .registry
            .with_lock(key, |record| {
                (record.state == LifecycleState::Warned).then(|| {
                    record.state = LifecycleState::Cleanup;
                    (std::mem::take(&mut record.resources), record.role_id)
                })
            })
            .await
            .flatten();
        let Some((resources, role)) = taken else {
            debug!(%key, "Cleanup task no longer applies");
            return;
        };
        info!(%key, "Deleting event resources");

        self.delete_resources(key, &resources).await;
        if let Some(role) = role {
            self.inner.dividers.revoke(key.guild, role).await;
            if let Err(e) = self.inner.provisioning.delete_role(key.guild, role).await {
                warn!(%key, %role, error = %e, "Failed to delete event role");
            }
        }
        self.inner
            .registry
            .with_lock(key, |record| record.state = LifecycleState::Removed)
            .await;
        self.release_divider(key.guild).await;
        info!(%key, "Event removed after cleanup");
    }

    /// Postpone deletion by [`timing::EXTENSION`].
    ///
    /// Only events that have started can be extended. An event already warned
    /// is unlocked and returns to `Started`. Returns whether the deletion was
    /// postponed.
    pub async fn extend_deletion(&self, key: EventKey) -> bool {
        let extended = self
            .inner
            .registry
            .with_lock(key, |record| {
                let was_warned = match record.state {
                    LifecycleState::Started => false,
                    LifecycleState::Warned => true,
                    _ => return None,
                };
                record.delete_at = timing::extended_delete_time(record.delete_at);
                record.state = LifecycleState::Started;
                Some((was_warned, record.clone()))
            })
            .await
            .flatten();
        let Some((was_warned, record)) = extended else {
            debug!(%key, "Event cannot be extended in its current state");
            return false;
        };
        info!(%key, delete_at = %record.delete_at, "Deletion extended");

        self.inner.scheduler.cancel_kind(key, TaskKind::Cleanup);
        self.schedule(key, TaskKind::Warning, timing::warning_time(record.delete_at));

        let config = self.inner.configs.get(key.guild).await;
        if was_warned {
            let access = Self::access(&record, &config);
            if let Err(e) = self
                .inner
                .provisioning
                .unlock(key.guild, &record.resources, &access)
                .await
            {
                error!(%key, error = %e, "Failed to unlock event resources");
            }
        }

        self.notify(&record, config.extension_template(), record.delete_at)
            .await;
        true
    }
}

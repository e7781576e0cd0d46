//! Attendance checkpoints and provisioning.

use super::LifecycleOrchestrator;
use crate::attendance::{Decision, evaluate};
use crate::backend::{AttendanceCheckError, ProvisionRequest};
use crate::naming::NameFormatter;
use crate::registry::{EventKey, EventRecord, LifecycleState};
use crate::scheduler::TaskKind;
use crate::utils::timing;
use evch_sdk::config::GuildConfig;
use evch_sdk::objects::RoleId;
use tracing::{debug, error, info, warn};

enum Claim {
    Proceed(EventRecord),
    AlreadyProvisioned(EventRecord),
    Stale,
}

/// Whether `current` still sits at the checkpoint `entered` was taken at.
fn at_checkpoint(current: &EventRecord, entered: &EventRecord) -> bool {
    current.generation == entered.generation
        && current.state == LifecycleState::AttendanceRetry(entered.retry_count)
}

impl LifecycleOrchestrator {
    /// Evaluate one attendance checkpoint.
    pub(super) async fn run_checkpoint(&self, key: EventKey, kind: TaskKind) {
        let entered = self
            .inner
            .registry
            .with_lock(key, |record| match (kind, record.state) {
                (TaskKind::Main, LifecycleState::Scheduled) => {
                    record.state = LifecycleState::AttendanceRetry(0);
                    record.retry_count = 0;
                    Some(record.clone())
                }
                (TaskKind::Retry(n), LifecycleState::AttendanceRetry(current)) if n == current => {
                    Some(record.clone())
                }
                _ => None,
            })
            .await
            .flatten();
        let Some(record) = entered else {
            debug!(%key, %kind, "Checkpoint no longer applies");
            return;
        };
        let checkpoint = record.retry_count;
        let config = self.inner.configs.get(key.guild).await;

        match self.check_attendance(&record, &config).await {
            Ok((decision, role)) if decision.meets_minimum => {
                info!(
                    %key,
                    checkpoint,
                    members = decision.member_count,
                    required = ?decision.required_minimum,
                    "Attendance check passed"
                );
                self.provision(&record, role, &decision, &config).await;
            }
            Ok((decision, _)) => {
                info!(
                    %key,
                    checkpoint,
                    members = decision.member_count,
                    required = ?decision.required_minimum,
                    "Attendance below minimum"
                );
                self.fail_checkpoint(&record, &config).await;
            }
            Err(e) => {
                warn!(%key, checkpoint, error = %e, "Attendance check failed");
                self.fail_checkpoint(&record, &config).await;
            }
        }
    }

    async fn check_attendance(
        &self,
        record: &EventRecord,
        config: &GuildConfig,
    ) -> Result<(Decision, RoleId), AttendanceCheckError> {
        let key = record.key;
        let role = match record.role_id {
            Some(role) => role,
            None => {
                let roles = self.inner.membership.guild_roles(key.guild).await?;
                let role = NameFormatter::new(config).find_role(
                    &roles,
                    &record.name,
                    record.start_time,
                )?;
                self.inner
                    .registry
                    .with_lock(key, |r| {
                        if at_checkpoint(r, record) {
                            r.role_id = Some(role);
                        }
                    })
                    .await;
                debug!(%key, %role, "Resolved event role");
                role
            }
        };

        let members = self.inner.membership.member_count(key.guild, role).await?;
        if !members.reliable {
            warn!(
                %key,
                count = members.count,
                "Member count may be incomplete, gating and scaling may be off"
            );
        }
        let decision = evaluate(
            members.count,
            &record.name,
            &config.voice_multipliers,
            &config.minimum_attendance,
        );
        Ok((decision, role))
    }

    /// Claim the event for provisioning and create its resources.
    async fn provision(
        &self,
        entered: &EventRecord,
        role: RoleId,
        decision: &Decision,
        config: &GuildConfig,
    ) {
        let key = entered.key;
        let claim = self
            .inner
            .registry
            .with_lock(key, |record| {
                if !at_checkpoint(record, entered) {
                    return Claim::Stale;
                }
                record.role_id = Some(role);
                if record.has_resources() {
                    record.state = LifecycleState::Provisioned;
                    return Claim::AlreadyProvisioned(record.clone());
                }
                record.state = LifecycleState::Provisioning;
                Claim::Proceed(record.clone())
            })
            .await
            .unwrap_or(Claim::Stale);

        let record = match claim {
            Claim::Proceed(record) => record,
            Claim::AlreadyProvisioned(record) => {
                info!(%key, "Event already holds resources, skipping provisioning");
                self.inner.scheduler.cancel_all(key);
                self.schedule(key, TaskKind::Start, record.start_time);
                return;
            }
            Claim::Stale => {
                debug!(%key, checkpoint = entered.retry_count, "Provisioning no longer applies");
                return;
            }
        };
        self.inner.scheduler.cancel_all(key);

        let divider = self.inner.dividers.ensure(key.guild, config).await;
        let request = ProvisionRequest {
            guild: key.guild,
            category: config.category_id,
            role,
            whitelisted_roles: config.whitelisted_roles.clone(),
            names: NameFormatter::new(config)
                .resource_names(&record.name, decision.channel_count as usize),
            user_limit: decision.per_channel_limit,
        };
        info!(
            %key,
            voice_channels = decision.channel_count,
            user_limit = ?decision.per_channel_limit,
            "Provisioning event resources"
        );

        let mut resources = match self.inner.provisioning.create(&request).await {
            Ok(resources) => resources,
            Err(e) => {
                error!(%key, error = %e, "Provisioning failed, event left for manual cleanup");
                return;
            }
        };
        resources.divider = divider;

        let committed = self
            .inner
            .registry
            .with_lock(key, |record| {
                if record.state != LifecycleState::Provisioning || record.has_resources() {
                    return None;
                }
                record.resources = resources.clone();
                record.state = LifecycleState::Provisioned;
                Some(record.clone())
            })
            .await
            .flatten();
        let Some(record) = committed else {
            warn!(%key, "Event went away during provisioning, deleting its new resources");
            self.delete_resources(key, &resources).await;
            self.release_divider(key.guild).await;
            return;
        };

        if divider.is_some() {
            self.inner.dividers.grant(key.guild, role).await;
        }
        info!(%key, "Event provisioned");
        self.schedule(key, TaskKind::Start, record.start_time);
        self.notify(&record, config.announcement_template(), record.start_time)
            .await;
    }

    /// Move to the next checkpoint, or abandon after the final one.
    async fn fail_checkpoint(&self, record: &EventRecord, config: &GuildConfig) {
        let key = record.key;
        let failed = record.retry_count;
        let checkpoints = timing::checkpoint_times(record.start_time, config);
        let next = timing::next_checkpoint(&checkpoints, failed as usize, self.now());

        let outcome = self
            .inner
            .registry
            .with_lock(key, |r| {
                if !at_checkpoint(r, record) {
                    return None;
                }
                Some(match next {
                    Some(index) => {
                        let index = index as u32;
                        r.state = LifecycleState::AttendanceRetry(index);
                        r.retry_count = index;
                        Some(index)
                    }
                    None => {
                        r.state = LifecycleState::Abandoned;
                        None
                    }
                })
            })
            .await
            .flatten();

        match outcome {
            Some(Some(index)) => {
                let fire_at = checkpoints[index as usize];
                info!(%key, checkpoint = index, %fire_at, "Attendance re-check scheduled");
                self.schedule(key, TaskKind::Retry(index), fire_at);
            }
            Some(None) => {
                info!(%key, checkpoints = checkpoints.len(), "Attendance never met, event abandoned");
            }
            None => debug!(%key, checkpoint = failed, "Checkpoint outcome is stale"),
        }
    }
}

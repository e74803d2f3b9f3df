//! Schedule engine — fires due schedules and records what happened.
//!
//! Each firing emits exactly one device command through the [`CommandSink`]
//! and appends exactly one [`ExecutionRecord`], whether the sink accepted
//! the command or not. The rule is then moved to its next slot and saved.
//!
//! When several rules for the same device are due at once, only one fires:
//! the highest priority, then the oldest, then the lowest id. The others get
//! a `skipped` record and wait for their next slot.

use std::collections::BTreeMap;
use std::time::Instant;

use coophub_domain::error::{CoopHubError, NotFoundError, ValidationError};
use coophub_domain::execution::{ExecutionRecord, ExecutionStatus};
use coophub_domain::id::{DeviceId, ScheduleId};
use coophub_domain::schedule::{Firing, ScheduleRule};
use coophub_domain::time::Timestamp;

use crate::ports::{CommandSink, ExecutionLog, ScheduleRepository};

/// What one evaluation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Rules whose command reached the sink.
    pub fired: Vec<ScheduleId>,
    /// Rules that lost a same-device conflict.
    pub skipped: Vec<ScheduleId>,
    /// Rules whose firing failed or could not be recorded.
    pub failed: Vec<ScheduleId>,
}

/// Evaluates and fires schedule rules.
pub struct ScheduleEngine<S, L, C> {
    schedules: S,
    executions: L,
    commands: C,
}

impl<S, L, C> ScheduleEngine<S, L, C>
where
    S: ScheduleRepository,
    L: ExecutionLog,
    C: CommandSink,
{
    /// Create a new engine.
    pub fn new(schedules: S, executions: L, commands: C) -> Self {
        Self {
            schedules,
            executions,
            commands,
        }
    }

    /// When `rule` should fire next, evaluated from `from`. `None` for rules
    /// that only fire on demand.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidScheduleExpression`] if the cron
    /// expression has no matching minute left.
    pub fn compute_next_execution(
        rule: &ScheduleRule,
        from: Timestamp,
    ) -> Result<Option<Timestamp>, CoopHubError> {
        Ok(rule.next_execution_after(from)?)
    }

    /// Fire `rule` on its own cadence at `now`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record or the rule cannot be saved.
    /// A rejected command is not an error: it yields a `failed` record.
    #[tracing::instrument(skip(self, rule), fields(schedule_id = %rule.id, device_id = %rule.device_id))]
    pub async fn fire(
        &self,
        rule: ScheduleRule,
        now: Timestamp,
    ) -> Result<ExecutionRecord, CoopHubError> {
        self.run(rule, Firing::Scheduled, now).await
    }

    /// Fire schedule `id` right now, outside its cadence. The next-fire time
    /// and duty phase are left as they are.
    ///
    /// # Errors
    ///
    /// Returns [`CoopHubError::NotFound`] for an unknown id,
    /// [`ValidationError::ScheduleInactive`] for a retired rule, or a storage
    /// error.
    #[tracing::instrument(skip(self))]
    pub async fn execute_now(
        &self,
        id: ScheduleId,
        now: Timestamp,
    ) -> Result<ExecutionRecord, CoopHubError> {
        let rule = self
            .schedules
            .get_by_id(id)
            .await?
            .ok_or_else(|| NotFoundError {
                entity: "Schedule",
                id: id.to_string(),
            })?;
        if !rule.is_active {
            return Err(ValidationError::ScheduleInactive(id.to_string()).into());
        }
        self.run(rule, Firing::Manual, now).await
    }

    /// Fire every rule due at `now`, one per device.
    ///
    /// A failure on one rule is logged and does not stop the others.
    ///
    /// # Errors
    ///
    /// Returns a storage error only if the due rules cannot be loaded.
    #[tracing::instrument(skip(self))]
    pub async fn tick(&self, now: Timestamp) -> Result<TickReport, CoopHubError> {
        let mut by_device: BTreeMap<DeviceId, Vec<ScheduleRule>> = BTreeMap::new();
        for rule in self.schedules.get_due(now).await? {
            if rule.is_due(now) {
                by_device.entry(rule.device_id).or_default().push(rule);
            }
        }

        let mut report = TickReport::default();
        for (device_id, mut group) in by_device {
            group.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            });
            let mut rules = group.into_iter();
            let Some(winner) = rules.next() else {
                continue;
            };
            let winner_id = winner.id;

            match self.fire(winner, now).await {
                Ok(record) if record.status == ExecutionStatus::Executed => {
                    report.fired.push(winner_id);
                }
                Ok(_) => report.failed.push(winner_id),
                Err(err) => {
                    tracing::error!(schedule_id = %winner_id, error = %describe(&err), "failed to fire schedule");
                    report.failed.push(winner_id);
                }
            }

            for loser in rules {
                let loser_id = loser.id;
                match self.skip(loser, device_id, winner_id, now).await {
                    Ok(()) => report.skipped.push(loser_id),
                    Err(err) => {
                        tracing::error!(schedule_id = %loser_id, error = %describe(&err), "failed to skip schedule");
                        report.failed.push(loser_id);
                    }
                }
            }
        }

        if !report.fired.is_empty() || !report.skipped.is_empty() || !report.failed.is_empty() {
            tracing::info!(
                fired = report.fired.len(),
                skipped = report.skipped.len(),
                failed = report.failed.len(),
                "schedule tick"
            );
        }
        Ok(report)
    }

    async fn run(
        &self,
        mut rule: ScheduleRule,
        firing: Firing,
        now: Timestamp,
    ) -> Result<ExecutionRecord, CoopHubError> {
        let scheduled_time = match firing {
            Firing::Scheduled => rule.next_execution.unwrap_or(now),
            Firing::Manual => now,
        };

        let started = Instant::now();
        let record = match rule.command_for(firing, now) {
            Ok(command) => {
                let command_id = command.id;
                match self.commands.persist(command).await {
                    Ok(_) => {
                        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                        ExecutionRecord::executed(
                            rule.id,
                            rule.device_id,
                            scheduled_time,
                            now,
                            command_id,
                            elapsed,
                        )
                    }
                    Err(err) => {
                        tracing::warn!(schedule_id = %rule.id, error = %describe(&err), "command rejected");
                        ExecutionRecord::failed(
                            rule.id,
                            rule.device_id,
                            scheduled_time,
                            now,
                            Some(command_id),
                            describe(&err),
                        )
                    }
                }
            }
            Err(err) => ExecutionRecord::failed(
                rule.id,
                rule.device_id,
                scheduled_time,
                now,
                None,
                describe(&err),
            ),
        };
        // The command is already out; the rule advances even if the record is lost.
        let appended = self.executions.append(record).await;
        if let Err(err) = &appended {
            tracing::error!(schedule_id = %rule.id, error = %describe(err), "failed to record execution");
        }

        if let Err(err) = rule.advance(firing, now) {
            tracing::error!(schedule_id = %rule.id, error = %describe(&err), "cannot compute next execution, deactivating schedule");
        }
        self.save_progress(&rule, Some(firing)).await?;

        let record = appended?;
        tracing::debug!(execution_id = %record.id, status = %record.status, "schedule fired");
        Ok(record)
    }

    async fn skip(
        &self,
        mut rule: ScheduleRule,
        device_id: DeviceId,
        winner: ScheduleId,
        now: Timestamp,
    ) -> Result<(), CoopHubError> {
        let record = ExecutionRecord::skipped(
            rule.id,
            device_id,
            rule.next_execution.unwrap_or(now),
            now,
            format!("device {device_id} claimed by schedule {winner}"),
        );
        self.executions.append(record).await?;

        if let Err(err) = rule.defer(now) {
            tracing::error!(schedule_id = %rule.id, error = %describe(&err), "cannot compute next execution, deactivating schedule");
        }
        self.save_progress(&rule, None).await
    }

    async fn save_progress(
        &self,
        rule: &ScheduleRule,
        firing: Option<Firing>,
    ) -> Result<(), CoopHubError> {
        if !self.schedules.record_progress(rule.progress(firing)).await? {
            tracing::warn!(schedule_id = %rule.id, "schedule retired or removed while firing, bookkeeping dropped");
        }
        Ok(())
    }
}

/// Render an error and its sources as one line.
fn describe(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

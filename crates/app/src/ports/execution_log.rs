//! Execution log port — append-only history of schedule firings.

use std::future::Future;

use coophub_domain::error::CoopHubError;
use coophub_domain::execution::ExecutionRecord;
use coophub_domain::id::ScheduleId;
use coophub_domain::time::Timestamp;

/// Append-only store of [`ExecutionRecord`]s.
pub trait ExecutionLog {
    /// Append a record. Records are never updated afterwards.
    fn append(
        &self,
        record: ExecutionRecord,
    ) -> impl Future<Output = Result<ExecutionRecord, CoopHubError>> + Send;

    /// Records of one schedule scheduled at or after `since`, newest first.
    fn find_by_schedule(
        &self,
        schedule_id: ScheduleId,
        since: Timestamp,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<ExecutionRecord>, CoopHubError>> + Send;
}

impl<T: ExecutionLog + Send + Sync> ExecutionLog for std::sync::Arc<T> {
    fn append(
        &self,
        record: ExecutionRecord,
    ) -> impl Future<Output = Result<ExecutionRecord, CoopHubError>> + Send {
        (**self).append(record)
    }

    fn find_by_schedule(
        &self,
        schedule_id: ScheduleId,
        since: Timestamp,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<ExecutionRecord>, CoopHubError>> + Send {
        (**self).find_by_schedule(schedule_id, since, limit)
    }
}

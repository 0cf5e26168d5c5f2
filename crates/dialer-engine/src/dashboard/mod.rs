//! # Dashboard Aggregator
//!
//! Read-only rollups of queue depth, age and throughput per call list.
//! Nothing here writes; every figure is computed from the item and call log
//! tables at request time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use tracing::debug;

use crate::database::DatabaseManager;
use crate::error::Result;
use crate::types::{CallList, ListType};

/// Item counts per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub rescheduled: i64,
    pub skipped: i64,
    pub removed: i64,
}

impl StatusCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.in_progress + self.completed + self.rescheduled + self.skipped + self.removed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCount {
    pub outcome: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDashboard {
    pub list_id: String,
    pub name: String,
    pub list_type: ListType,
    pub is_active: bool,
    pub priority: i32,
    pub status_counts: StatusCounts,
    /// Items any unassigned agent could be handed right now
    pub eligible_now: i64,
    pub oldest_pending_age_secs: Option<i64>,
    pub avg_attempts: Option<f64>,
    pub calls_last_24h: i64,
    pub outcomes_last_24h: Vec<OutcomeCount>,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct DashboardAggregator {
    db: DatabaseManager,
}

impl DashboardAggregator {
    pub fn new(db: DatabaseManager) -> Self {
        Self { db }
    }

    pub async fn list_dashboard(&self, list_id: &str) -> Result<ListDashboard> {
        let list = self.db.require_call_list(list_id).await?;
        self.build(&list, Utc::now()).await
    }

    /// One dashboard per active list, highest priority first
    pub async fn overview(&self) -> Result<Vec<ListDashboard>> {
        let now = Utc::now();
        let lists = self.db.list_call_lists(true).await?;
        let mut dashboards = Vec::with_capacity(lists.len());
        for list in &lists {
            dashboards.push(self.build(list, now).await?);
        }
        Ok(dashboards)
    }

    async fn build(&self, list: &CallList, now: DateTime<Utc>) -> Result<ListDashboard> {
        let pool = self.db.pool();

        let row = sqlx::query(
            "SELECT
                COALESCE(SUM(CASE WHEN status = 'PENDING' THEN 1 ELSE 0 END), 0) AS pending,
                COALESCE(SUM(CASE WHEN status = 'IN_PROGRESS' THEN 1 ELSE 0 END), 0) AS in_progress,
                COALESCE(SUM(CASE WHEN status = 'COMPLETED' THEN 1 ELSE 0 END), 0) AS completed,
                COALESCE(SUM(CASE WHEN status = 'RESCHEDULED' THEN 1 ELSE 0 END), 0) AS rescheduled,
                COALESCE(SUM(CASE WHEN status = 'SKIPPED' THEN 1 ELSE 0 END), 0) AS skipped,
                COALESCE(SUM(CASE WHEN status = 'REMOVED' THEN 1 ELSE 0 END), 0) AS removed,
                COALESCE(SUM(CASE WHEN status IN ('PENDING', 'RESCHEDULED')
                          AND assigned_to_id IS NULL
                          AND attempt_count < ?
                          AND (next_attempt_at IS NULL OR next_attempt_at <= ?)
                          AND (expires_at IS NULL OR expires_at > ?)
                    THEN 1 ELSE 0 END), 0) AS eligible_now,
                MIN(CASE WHEN status IN ('PENDING', 'RESCHEDULED') THEN created_at END) AS oldest_pending,
                AVG(CAST(attempt_count AS REAL)) AS avg_attempts
             FROM call_list_items
             WHERE call_list_id = ?",
        )
        .bind(list.max_attempts)
        .bind(now)
        .bind(now)
        .bind(&list.id)
        .fetch_one(pool)
        .await?;

        let status_counts = StatusCounts {
            pending: row.try_get("pending")?,
            in_progress: row.try_get("in_progress")?,
            completed: row.try_get("completed")?,
            rescheduled: row.try_get("rescheduled")?,
            skipped: row.try_get("skipped")?,
            removed: row.try_get("removed")?,
        };
        let eligible_now: i64 = row.try_get("eligible_now")?;
        let oldest_pending: Option<String> = row.try_get("oldest_pending")?;
        let avg_attempts: Option<f64> = row.try_get("avg_attempts")?;

        let oldest_pending_age_secs = oldest_pending
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| (now - t.with_timezone(&Utc)).num_seconds().max(0));

        let since = now - Duration::hours(24);
        let outcome_rows = sqlx::query(
            "SELECT outcome, COUNT(*) AS count FROM call_logs
             WHERE call_list_id = ? AND logged_at >= ?
             GROUP BY outcome
             ORDER BY count DESC, outcome ASC",
        )
        .bind(&list.id)
        .bind(since)
        .fetch_all(pool)
        .await?;

        let outcomes_last_24h = outcome_rows
            .iter()
            .map(|r| {
                Ok(OutcomeCount {
                    outcome: r.try_get("outcome")?,
                    count: r.try_get("count")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let calls_last_24h = outcomes_last_24h.iter().map(|o| o.count).sum();

        debug!(
            "Dashboard for list {}: {} items, {} eligible",
            list.id,
            status_counts.total(),
            eligible_now
        );

        Ok(ListDashboard {
            list_id: list.id.clone(),
            name: list.name.clone(),
            list_type: list.list_type,
            is_active: list.is_active,
            priority: list.priority,
            status_counts,
            eligible_now,
            oldest_pending_age_secs,
            avg_attempts,
            calls_last_24h,
            outcomes_last_24h,
            last_refreshed_at: list.last_refreshed_at,
            generated_at: now,
        })
    }
}

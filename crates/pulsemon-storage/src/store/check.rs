use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};

use pulsemon_common::types::{CheckStatus, ScheduleKind};
use pulsemon_common::{id, FLIP_RETENTION_DAYS};

use crate::entities::check::{self, Column, Entity};
use crate::entities::{check_channel, flip, notification, ping};
use crate::store::FlipRow;
use crate::MonitorStore;

/// A monitored schedule, as stored in the `checks` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRow {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub badge_key: String,
    pub kind: ScheduleKind,
    pub timeout_secs: i64,
    pub schedule: String,
    pub tz: String,
    pub grace_secs: i64,
    pub status: CheckStatus,
    pub last_ping: Option<DateTime<Utc>>,
    pub last_start: Option<DateTime<Utc>>,
    pub alert_after: Option<DateTime<Utc>>,
    pub n_pings: i64,
    pub last_duration_secs: Option<i64>,
    pub manual_resume: bool,
    pub allowed_methods: String,
    pub success_kw: String,
    pub start_kw: String,
    pub failure_kw: String,
    pub body_regex: Option<String>,
    pub subject_regex: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CheckRow {
    /// A fresh simple check with sensible defaults (24h timeout, 1h grace).
    pub fn new(project_id: &str, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id::next_id(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            badge_key: id::badge_key(),
            kind: ScheduleKind::Simple,
            timeout_secs: 86_400,
            schedule: String::new(),
            tz: "UTC".to_string(),
            grace_secs: 3_600,
            status: CheckStatus::New,
            last_ping: None,
            last_start: None,
            alert_after: None,
            n_pings: 0,
            last_duration_secs: None,
            manual_resume: false,
            allowed_methods: String::new(),
            success_kw: String::new(),
            start_kw: String::new(),
            failure_kw: String::new(),
            body_regex: None,
            subject_regex: None,
            created_at: now,
            updated_at: now,
        }
    }
}

pub(crate) fn to_row(m: check::Model) -> CheckRow {
    CheckRow {
        id: m.id,
        project_id: m.project_id,
        name: m.name,
        badge_key: m.badge_key,
        kind: m.kind.parse().unwrap_or(ScheduleKind::Simple),
        timeout_secs: m.timeout_secs,
        schedule: m.schedule,
        tz: m.tz,
        grace_secs: m.grace_secs,
        status: m.status.parse().unwrap_or(CheckStatus::New),
        last_ping: m.last_ping.map(|t| t.with_timezone(&Utc)),
        last_start: m.last_start.map(|t| t.with_timezone(&Utc)),
        alert_after: m.alert_after.map(|t| t.with_timezone(&Utc)),
        n_pings: m.n_pings,
        last_duration_secs: m.last_duration_secs,
        manual_resume: m.manual_resume,
        allowed_methods: m.allowed_methods,
        success_kw: m.success_kw,
        start_kw: m.start_kw,
        failure_kw: m.failure_kw,
        body_regex: m.body_regex,
        subject_regex: m.subject_regex,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

fn to_active(row: &CheckRow) -> check::ActiveModel {
    check::ActiveModel {
        id: Set(row.id.clone()),
        project_id: Set(row.project_id.clone()),
        name: Set(row.name.clone()),
        badge_key: Set(row.badge_key.clone()),
        kind: Set(row.kind.to_string()),
        timeout_secs: Set(row.timeout_secs),
        schedule: Set(row.schedule.clone()),
        tz: Set(row.tz.clone()),
        grace_secs: Set(row.grace_secs),
        status: Set(row.status.to_string()),
        last_ping: Set(row.last_ping.map(|t| t.fixed_offset())),
        last_start: Set(row.last_start.map(|t| t.fixed_offset())),
        alert_after: Set(row.alert_after.map(|t| t.fixed_offset())),
        n_pings: Set(row.n_pings),
        last_duration_secs: Set(row.last_duration_secs),
        manual_resume: Set(row.manual_resume),
        allowed_methods: Set(row.allowed_methods.clone()),
        success_kw: Set(row.success_kw.clone()),
        start_kw: Set(row.start_kw.clone()),
        failure_kw: Set(row.failure_kw.clone()),
        body_regex: Set(row.body_regex.clone()),
        subject_regex: Set(row.subject_regex.clone()),
        created_at: Set(row.created_at.fixed_offset()),
        updated_at: Set(row.updated_at.fixed_offset()),
    }
}

impl MonitorStore {
    pub async fn insert_check(&self, row: &CheckRow) -> Result<CheckRow> {
        let model = to_active(row).insert(&self.db).await?;
        Ok(to_row(model))
    }

    pub async fn get_check(&self, id: &str) -> Result<Option<CheckRow>> {
        let model = Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(to_row))
    }

    pub async fn get_check_by_badge(&self, badge_key: &str) -> Result<Option<CheckRow>> {
        let model = Entity::find()
            .filter(Column::BadgeKey.eq(badge_key))
            .one(&self.db)
            .await?;
        Ok(model.map(to_row))
    }

    pub async fn list_checks(&self, project_id: Option<&str>) -> Result<Vec<CheckRow>> {
        let mut q = Entity::find();
        if let Some(p) = project_id {
            q = q.filter(Column::ProjectId.eq(p));
        }
        let rows = q.order_by(Column::CreatedAt, Order::Asc).all(&self.db).await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    pub async fn project_ids(&self) -> Result<Vec<String>> {
        use sea_orm::QuerySelect;
        let rows: Vec<String> = Entity::find()
            .select_only()
            .column(Column::ProjectId)
            .distinct()
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(rows)
    }

    /// The oldest check whose alert deadline has passed and that is not
    /// already down. Paused and new checks carry a NULL `alert_after`, so
    /// the comparison excludes them.
    pub async fn next_due_check(&self, now: DateTime<Utc>) -> Result<Option<CheckRow>> {
        let model = Entity::find()
            .filter(Column::AlertAfter.lte(now.fixed_offset()))
            .filter(Column::Status.ne(CheckStatus::Down.to_string()))
            .order_by(Column::AlertAfter, Order::Asc)
            .one(&self.db)
            .await?;
        Ok(model.map(to_row))
    }

    pub async fn down_checks(&self, project_id: Option<&str>) -> Result<Vec<CheckRow>> {
        let mut q = Entity::find().filter(Column::Status.eq(CheckStatus::Down.to_string()));
        if let Some(p) = project_id {
            q = q.filter(Column::ProjectId.eq(p));
        }
        let rows = q.order_by(Column::CreatedAt, Order::Asc).all(&self.db).await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    /// Compare-and-set `alert_after`, guarded on the status the caller
    /// observed. Zero rows updated means a peer worker changed the check
    /// first.
    pub async fn update_alert_after(
        &self,
        id: &str,
        expect: CheckStatus,
        alert_after: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let res = Entity::update_many()
            .col_expr(
                Column::AlertAfter,
                Expr::value(alert_after.map(|t| t.fixed_offset())),
            )
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(expect.to_string()))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected == 1)
    }

    /// Atomically flip a check's status and record the transition.
    ///
    /// The status update is a compare-and-set on the old status and runs
    /// in one transaction with the flip insert; peers racing on the same
    /// check see zero rows updated and back off.
    pub async fn transition_check(
        &self,
        id: &str,
        old: CheckStatus,
        new: CheckStatus,
        alert_after: Option<DateTime<Utc>>,
        flip_row: &FlipRow,
    ) -> Result<bool> {
        let txn = self.db.begin().await?;

        let res = Entity::update_many()
            .col_expr(Column::Status, Expr::value(new.to_string()))
            .col_expr(
                Column::AlertAfter,
                Expr::value(alert_after.map(|t| t.fixed_offset())),
            )
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(old.to_string()))
            .exec(&txn)
            .await?;

        if res.rows_affected != 1 {
            txn.rollback().await?;
            return Ok(false);
        }

        crate::store::flip::to_active(flip_row).insert(&txn).await?;
        txn.commit().await?;
        Ok(true)
    }

    pub async fn pause_check(&self, id: &str) -> Result<bool> {
        let res = Entity::update_many()
            .col_expr(Column::Status, Expr::value(CheckStatus::Paused.to_string()))
            .col_expr(Column::AlertAfter, Expr::value(None::<sea_orm::prelude::DateTimeWithTimeZone>))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected == 1)
    }

    /// Manual resume for checks with `manual_resume` set: down goes back
    /// up and the transition is recorded. The caller recomputes
    /// `alert_after` afterwards.
    pub async fn resume_check(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let flip_row = FlipRow::new(
            id,
            CheckStatus::Down,
            CheckStatus::Up,
            pulsemon_common::types::FlipReason::None,
            now,
        );
        self.transition_check(id, CheckStatus::Down, CheckStatus::Up, None, &flip_row)
            .await
    }

    /// Delete a check and everything it owns: pings, flips,
    /// notifications, and its channel subscriptions. Channels themselves
    /// are shared across the project and survive. The caller drops any
    /// offloaded ping bodies afterwards.
    pub async fn delete_check(&self, id: &str) -> Result<bool> {
        let txn = self.db.begin().await?;

        ping::Entity::delete_many()
            .filter(ping::Column::OwnerId.eq(id))
            .exec(&txn)
            .await?;
        flip::Entity::delete_many()
            .filter(flip::Column::OwnerId.eq(id))
            .exec(&txn)
            .await?;
        notification::Entity::delete_many()
            .filter(notification::Column::OwnerId.eq(id))
            .exec(&txn)
            .await?;
        check_channel::Entity::delete_many()
            .filter(check_channel::Column::CheckId.eq(id))
            .exec(&txn)
            .await?;
        let res = Entity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;
        Ok(res.rows_affected == 1)
    }

    /// Hourly housekeeping: drop flips past the retention horizon.
    pub async fn prune_expired_flips(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - chrono::Duration::days(FLIP_RETENTION_DAYS);
        let res = flip::Entity::delete_many()
            .filter(flip::Column::Created.lt(cutoff.fixed_offset()))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }
}

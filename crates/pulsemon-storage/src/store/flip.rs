use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, EntityTrait, Order, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

use pulsemon_common::id;
use pulsemon_common::types::{CheckStatus, FlipReason};

use crate::entities::flip::{self, Column, Entity};
use crate::MonitorStore;

/// One status transition, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlipRow {
    pub id: String,
    pub owner_id: String,
    pub created: DateTime<Utc>,
    pub processed: Option<DateTime<Utc>>,
    pub old_status: CheckStatus,
    pub new_status: CheckStatus,
    pub reason: FlipReason,
}

impl FlipRow {
    pub fn new(
        owner_id: &str,
        old_status: CheckStatus,
        new_status: CheckStatus,
        reason: FlipReason,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id::next_id(),
            owner_id: owner_id.to_string(),
            created,
            processed: None,
            old_status,
            new_status,
            reason,
        }
    }

    /// Nag flips repeat an ongoing down state; transports mark them as
    /// repeat notifications.
    pub fn is_nag(&self) -> bool {
        self.reason == FlipReason::Nag
    }
}

pub(crate) fn to_row(m: flip::Model) -> FlipRow {
    FlipRow {
        id: m.id,
        owner_id: m.owner_id,
        created: m.created.with_timezone(&Utc),
        processed: m.processed.map(|t| t.with_timezone(&Utc)),
        old_status: m.old_status.parse().unwrap_or(CheckStatus::Up),
        new_status: m.new_status.parse().unwrap_or(CheckStatus::Up),
        reason: m.reason.parse().unwrap_or(FlipReason::None),
    }
}

pub(crate) fn to_active(row: &FlipRow) -> flip::ActiveModel {
    flip::ActiveModel {
        id: Set(row.id.clone()),
        owner_id: Set(row.owner_id.clone()),
        created: Set(row.created.fixed_offset()),
        processed: Set(row.processed.map(|t| t.fixed_offset())),
        old_status: Set(row.old_status.to_string()),
        new_status: Set(row.new_status.to_string()),
        reason: Set(row.reason.to_string()),
    }
}

impl MonitorStore {
    pub async fn insert_flip(&self, row: &FlipRow) -> Result<FlipRow> {
        let model = to_active(row).insert(&self.db).await?;
        Ok(to_row(model))
    }

    /// Claim the oldest unprocessed flip for dispatch.
    ///
    /// Marking `processed` is a compare-and-set: the worker that turns
    /// NULL into a timestamp owns the flip, everyone else moves on. A flip
    /// is therefore dispatched at most once.
    pub async fn claim_next_flip(&self, now: DateTime<Utc>) -> Result<Option<FlipRow>> {
        loop {
            let model = Entity::find()
                .filter(Column::Processed.is_null())
                .order_by(Column::Created, Order::Asc)
                .one(&self.db)
                .await?;
            let Some(model) = model else {
                return Ok(None);
            };

            let res = Entity::update_many()
                .col_expr(Column::Processed, Expr::value(Some(now.fixed_offset())))
                .filter(Column::Id.eq(&model.id))
                .filter(Column::Processed.is_null())
                .exec(&self.db)
                .await?;

            if res.rows_affected == 1 {
                let mut row = to_row(model);
                row.processed = Some(now);
                return Ok(Some(row));
            }
            // A peer got there first; try the next one.
        }
    }

    pub async fn flips_for_check(&self, owner_id: &str, limit: u64) -> Result<Vec<FlipRow>> {
        let rows = Entity::find()
            .filter(Column::OwnerId.eq(owner_id))
            .order_by(Column::Created, Order::Desc)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    /// The event that started the check's current down spell, or the most
    /// recent nag for it — whichever is newer.
    ///
    /// The nag loop keys its "one nag per hour" decision off this flip.
    /// It must never consult the notification table instead: a nag
    /// notification is itself a down notification, and that predicate
    /// would block all future nags.
    pub async fn last_down_event(&self, owner_id: &str) -> Result<Option<FlipRow>> {
        let model = Entity::find()
            .filter(Column::OwnerId.eq(owner_id))
            .filter(
                Condition::any()
                    .add(Column::Reason.eq(FlipReason::Nag.to_string()))
                    .add(
                        Condition::all()
                            .add(Column::NewStatus.eq(CheckStatus::Down.to_string()))
                            .add(Column::OldStatus.ne(CheckStatus::Down.to_string())),
                    ),
            )
            .order_by(Column::Created, Order::Desc)
            .one(&self.db)
            .await?;
        Ok(model.map(to_row))
    }

    #[doc(hidden)]
    pub async fn count_unprocessed_flips(&self) -> Result<u64> {
        use sea_orm::PaginatorTrait;
        Ok(Entity::find()
            .filter(Column::Processed.is_null())
            .count(&self.db)
            .await?)
    }
}

use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::{Deserialize, Serialize};

use pulsemon_common::id;
use pulsemon_common::types::CheckStatus;

use crate::entities::notification::{self, Column, Entity};
use crate::MonitorStore;

/// Receipt of one delivery attempt. Created before the transport call so
/// a crashed dispatcher still leaves an audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRow {
    pub id: String,
    pub code: String,
    pub owner_id: String,
    pub check_status: CheckStatus,
    pub channel_id: String,
    pub created: DateTime<Utc>,
    pub error: String,
}

impl NotificationRow {
    pub fn new(
        owner_id: &str,
        channel_id: &str,
        check_status: CheckStatus,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id::next_id(),
            code: id::next_id(),
            owner_id: owner_id.to_string(),
            check_status,
            channel_id: channel_id.to_string(),
            created,
            error: "Sending".to_string(),
        }
    }
}

pub(crate) fn to_row(m: notification::Model) -> NotificationRow {
    NotificationRow {
        id: m.id,
        code: m.code,
        owner_id: m.owner_id,
        check_status: m.check_status.parse().unwrap_or(CheckStatus::Down),
        channel_id: m.channel_id,
        created: m.created.with_timezone(&Utc),
        error: m.error,
    }
}

impl MonitorStore {
    pub async fn insert_notification(&self, row: &NotificationRow) -> Result<NotificationRow> {
        let am = notification::ActiveModel {
            id: Set(row.id.clone()),
            code: Set(row.code.clone()),
            owner_id: Set(row.owner_id.clone()),
            check_status: Set(row.check_status.to_string()),
            channel_id: Set(row.channel_id.clone()),
            created: Set(row.created.fixed_offset()),
            error: Set(row.error.clone()),
        };
        let model = am.insert(&self.db).await?;
        Ok(to_row(model))
    }

    /// Overwrite the notification's error field: empty on success, the
    /// transport's error string otherwise.
    pub async fn set_notification_error(&self, id: &str, error: &str) -> Result<()> {
        Entity::update_many()
            .col_expr(Column::Error, Expr::value(error.to_string()))
            .filter(Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn notifications_for_check(
        &self,
        owner_id: &str,
        limit: u64,
    ) -> Result<Vec<NotificationRow>> {
        let rows = Entity::find()
            .filter(Column::OwnerId.eq(owner_id))
            .order_by(Column::Created, Order::Desc)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    pub async fn notifications_for_channel(
        &self,
        channel_id: &str,
        limit: u64,
    ) -> Result<Vec<NotificationRow>> {
        let rows = Entity::find()
            .filter(Column::ChannelId.eq(channel_id))
            .order_by(Column::Created, Order::Desc)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }
}

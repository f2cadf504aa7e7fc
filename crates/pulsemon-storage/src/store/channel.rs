use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};

use pulsemon_common::id;

use crate::entities::channel::{self, Column, Entity};
use crate::entities::check_channel;
use crate::MonitorStore;

/// A notification target. `value` is an opaque config blob interpreted by
/// the transport registered for `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRow {
    pub id: String,
    pub project_id: String,
    pub kind: String,
    pub name: String,
    pub value: String,
    pub email_verified: bool,
    pub disabled: bool,
    pub last_notify: Option<DateTime<Utc>>,
    pub last_notify_duration_ms: Option<i64>,
    pub last_error: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChannelRow {
    pub fn new(project_id: &str, kind: &str, value: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id::next_id(),
            project_id: project_id.to_string(),
            kind: kind.to_string(),
            name: String::new(),
            value: value.to_string(),
            email_verified: false,
            disabled: false,
            last_notify: None,
            last_notify_duration_ms: None,
            last_error: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

pub(crate) fn to_row(m: channel::Model) -> ChannelRow {
    ChannelRow {
        id: m.id,
        project_id: m.project_id,
        kind: m.kind,
        name: m.name,
        value: m.value,
        email_verified: m.email_verified,
        disabled: m.disabled,
        last_notify: m.last_notify.map(|t| t.with_timezone(&Utc)),
        last_notify_duration_ms: m.last_notify_duration_ms,
        last_error: m.last_error,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

impl MonitorStore {
    pub async fn insert_channel(&self, row: &ChannelRow) -> Result<ChannelRow> {
        let am = channel::ActiveModel {
            id: Set(row.id.clone()),
            project_id: Set(row.project_id.clone()),
            kind: Set(row.kind.clone()),
            name: Set(row.name.clone()),
            value: Set(row.value.clone()),
            email_verified: Set(row.email_verified),
            disabled: Set(row.disabled),
            last_notify: Set(row.last_notify.map(|t| t.fixed_offset())),
            last_notify_duration_ms: Set(row.last_notify_duration_ms),
            last_error: Set(row.last_error.clone()),
            created_at: Set(row.created_at.fixed_offset()),
            updated_at: Set(row.updated_at.fixed_offset()),
        };
        let model = am.insert(&self.db).await?;
        Ok(to_row(model))
    }

    pub async fn get_channel(&self, id: &str) -> Result<Option<ChannelRow>> {
        let model = Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(to_row))
    }

    pub async fn list_channels(&self, project_id: Option<&str>) -> Result<Vec<ChannelRow>> {
        let mut q = Entity::find();
        if let Some(p) = project_id {
            q = q.filter(Column::ProjectId.eq(p));
        }
        let rows = q.order_by(Column::CreatedAt, Order::Asc).all(&self.db).await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    /// Subscribe a check to a channel. Idempotent.
    pub async fn attach_channel(&self, check_id: &str, channel_id: &str) -> Result<()> {
        let am = check_channel::ActiveModel {
            check_id: Set(check_id.to_string()),
            channel_id: Set(channel_id.to_string()),
        };
        let result = check_channel::Entity::insert(am)
            .on_conflict(
                OnConflict::columns([
                    check_channel::Column::CheckId,
                    check_channel::Column::ChannelId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec(&self.db)
            .await;
        match result {
            Ok(_) | Err(sea_orm::DbErr::RecordNotInserted) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn channels_for_check(&self, check_id: &str) -> Result<Vec<ChannelRow>> {
        let joins = check_channel::Entity::find()
            .filter(check_channel::Column::CheckId.eq(check_id))
            .all(&self.db)
            .await?;
        if joins.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = joins.into_iter().map(|j| j.channel_id).collect();
        let rows = Entity::find()
            .filter(Column::Id.is_in(ids))
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    pub async fn record_notify_success(
        &self,
        channel_id: &str,
        sent_at: DateTime<Utc>,
        duration_ms: i64,
    ) -> Result<()> {
        Entity::update_many()
            .col_expr(Column::LastNotify, Expr::value(Some(sent_at.fixed_offset())))
            .col_expr(Column::LastNotifyDurationMs, Expr::value(Some(duration_ms)))
            .col_expr(Column::LastError, Expr::value(String::new()))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::Id.eq(channel_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Record a delivery failure. Permanent failures (provider-signalled
    /// revocation) additionally disable the channel so later flips skip it.
    pub async fn record_notify_failure(
        &self,
        channel_id: &str,
        error: &str,
        permanent: bool,
    ) -> Result<()> {
        let mut update = Entity::update_many()
            .col_expr(Column::LastError, Expr::value(error.to_string()))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()));
        if permanent {
            update = update.col_expr(Column::Disabled, Expr::value(true));
        }
        update.filter(Column::Id.eq(channel_id)).exec(&self.db).await?;
        Ok(())
    }
}

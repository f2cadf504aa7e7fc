use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use pulsemon_common::types::PingKind;
use pulsemon_common::{id, PING_RETENTION};

use crate::entities::check;
use crate::entities::ping::{self, Column, Entity};
use crate::store::{CheckRow, FlipRow};
use crate::MonitorStore;

/// One heartbeat event, as stored in the `pings` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingRow {
    pub id: String,
    pub owner_id: String,
    pub n: i64,
    pub kind: PingKind,
    pub created: DateTime<Utc>,
    pub scheme: String,
    pub remote_addr: String,
    pub method: String,
    pub ua: String,
    pub exit_status: Option<i64>,
    pub rid: Option<String>,
    pub body: Option<String>,
    pub object_key: Option<String>,
    pub object_size: Option<i64>,
}

impl PingRow {
    pub fn new(owner_id: &str, n: i64, kind: PingKind, created: DateTime<Utc>) -> Self {
        Self {
            id: id::next_id(),
            owner_id: owner_id.to_string(),
            n,
            kind,
            created,
            scheme: "http".to_string(),
            remote_addr: String::new(),
            method: String::new(),
            ua: String::new(),
            exit_status: None,
            rid: None,
            body: None,
            object_key: None,
            object_size: None,
        }
    }
}

pub(crate) fn to_row(m: ping::Model) -> PingRow {
    PingRow {
        id: m.id,
        owner_id: m.owner_id,
        n: m.n,
        kind: m.kind.parse().unwrap_or(PingKind::Ign),
        created: m.created.with_timezone(&Utc),
        scheme: m.scheme,
        remote_addr: m.remote_addr,
        method: m.method,
        ua: m.ua,
        exit_status: m.exit_status,
        rid: m.rid,
        body: m.body,
        object_key: m.object_key,
        object_size: m.object_size,
    }
}

fn to_active(row: &PingRow) -> ping::ActiveModel {
    ping::ActiveModel {
        id: Set(row.id.clone()),
        owner_id: Set(row.owner_id.clone()),
        n: Set(row.n),
        kind: Set(row.kind.to_string()),
        created: Set(row.created.fixed_offset()),
        scheme: Set(row.scheme.clone()),
        remote_addr: Set(row.remote_addr.clone()),
        method: Set(row.method.clone()),
        ua: Set(row.ua.clone()),
        exit_status: Set(row.exit_status),
        rid: Set(row.rid.clone()),
        body: Set(row.body.clone()),
        object_key: Set(row.object_key.clone()),
        object_size: Set(row.object_size),
    }
}

impl MonitorStore {
    pub async fn latest_ping(&self, owner_id: &str) -> Result<Option<PingRow>> {
        let model = Entity::find()
            .filter(Column::OwnerId.eq(owner_id))
            .order_by(Column::N, Order::Desc)
            .one(&self.db)
            .await?;
        Ok(model.map(to_row))
    }

    pub async fn list_pings(&self, owner_id: &str, limit: u64) -> Result<Vec<PingRow>> {
        let rows = Entity::find()
            .filter(Column::OwnerId.eq(owner_id))
            .order_by(Column::N, Order::Desc)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    /// Persist one ingested ping: the ping row, the updated check fields,
    /// and (for fail pings and revivals) the resulting flip, all in one
    /// transaction. Pings past the retention window are pruned on the way.
    pub async fn commit_ping(
        &self,
        updated: &CheckRow,
        ping_row: &PingRow,
        flip_row: Option<&FlipRow>,
    ) -> Result<()> {
        let txn = self.db.begin().await?;

        check::Entity::update_many()
            .col_expr(check::Column::Status, Expr::value(updated.status.to_string()))
            .col_expr(
                check::Column::LastPing,
                Expr::value(updated.last_ping.map(|t| t.fixed_offset())),
            )
            .col_expr(
                check::Column::LastStart,
                Expr::value(updated.last_start.map(|t| t.fixed_offset())),
            )
            .col_expr(
                check::Column::AlertAfter,
                Expr::value(updated.alert_after.map(|t| t.fixed_offset())),
            )
            .col_expr(check::Column::NPings, Expr::value(updated.n_pings))
            .col_expr(
                check::Column::LastDurationSecs,
                Expr::value(updated.last_duration_secs),
            )
            .col_expr(
                check::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(check::Column::Id.eq(&updated.id))
            .exec(&txn)
            .await?;

        to_active(ping_row).insert(&txn).await?;

        if let Some(flip_row) = flip_row {
            crate::store::flip::to_active(flip_row).insert(&txn).await?;
        }

        Entity::delete_many()
            .filter(Column::OwnerId.eq(&updated.id))
            .filter(Column::N.lte(ping_row.n - PING_RETENTION as i64))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(())
    }
}

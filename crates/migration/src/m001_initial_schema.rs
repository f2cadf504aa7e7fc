use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

const UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS checks (
    id TEXT PRIMARY KEY NOT NULL,
    project_id TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL DEFAULT '',
    badge_key TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL DEFAULT 'simple',
    timeout_secs INTEGER NOT NULL DEFAULT 86400,
    schedule TEXT NOT NULL DEFAULT '',
    tz TEXT NOT NULL DEFAULT 'UTC',
    grace_secs INTEGER NOT NULL DEFAULT 3600,
    status TEXT NOT NULL DEFAULT 'new',
    last_ping TEXT,
    last_start TEXT,
    alert_after TEXT,
    n_pings INTEGER NOT NULL DEFAULT 0,
    last_duration_secs INTEGER,
    manual_resume INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_checks_alert_after ON checks(alert_after, status);
CREATE INDEX IF NOT EXISTS idx_checks_status ON checks(status);
CREATE INDEX IF NOT EXISTS idx_checks_project ON checks(project_id);

CREATE TABLE IF NOT EXISTS pings (
    id TEXT PRIMARY KEY NOT NULL,
    owner_id TEXT NOT NULL,
    n INTEGER NOT NULL,
    kind TEXT NOT NULL DEFAULT 'success',
    created TEXT NOT NULL,
    scheme TEXT NOT NULL DEFAULT 'http',
    remote_addr TEXT NOT NULL DEFAULT '',
    method TEXT NOT NULL DEFAULT '',
    ua TEXT NOT NULL DEFAULT '',
    exit_status INTEGER,
    rid TEXT,
    body TEXT,
    object_key TEXT,
    object_size INTEGER,
    UNIQUE(owner_id, n)
);
CREATE INDEX IF NOT EXISTS idx_pings_owner_created ON pings(owner_id, created);

CREATE TABLE IF NOT EXISTS channels (
    id TEXT PRIMARY KEY NOT NULL,
    project_id TEXT NOT NULL DEFAULT '',
    kind TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    value TEXT NOT NULL DEFAULT '{}',
    email_verified INTEGER NOT NULL DEFAULT 0,
    disabled INTEGER NOT NULL DEFAULT 0,
    last_notify TEXT,
    last_notify_duration_ms INTEGER,
    last_error TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_channels_project ON channels(project_id);

CREATE TABLE IF NOT EXISTS check_channels (
    check_id TEXT NOT NULL,
    channel_id TEXT NOT NULL,
    PRIMARY KEY (check_id, channel_id)
);
CREATE INDEX IF NOT EXISTS idx_check_channels_channel ON check_channels(channel_id);

CREATE TABLE IF NOT EXISTS flips (
    id TEXT PRIMARY KEY NOT NULL,
    owner_id TEXT NOT NULL,
    created TEXT NOT NULL,
    processed TEXT,
    old_status TEXT NOT NULL,
    new_status TEXT NOT NULL,
    reason TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_flips_processed ON flips(processed, created);
CREATE INDEX IF NOT EXISTS idx_flips_owner_created ON flips(owner_id, created);

CREATE TABLE IF NOT EXISTS notifications (
    id TEXT PRIMARY KEY NOT NULL,
    code TEXT NOT NULL UNIQUE,
    owner_id TEXT NOT NULL,
    check_status TEXT NOT NULL,
    channel_id TEXT NOT NULL,
    created TEXT NOT NULL,
    error TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_notifications_owner ON notifications(owner_id, created);
CREATE INDEX IF NOT EXISTS idx_notifications_channel ON notifications(channel_id, created);
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS notifications;
DROP TABLE IF EXISTS flips;
DROP TABLE IF EXISTS check_channels;
DROP TABLE IF EXISTS channels;
DROP TABLE IF EXISTS pings;
DROP TABLE IF EXISTS checks;
";

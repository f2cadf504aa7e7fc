use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m002_check_ping_filters"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, _manager: &SchemaManager) -> Result<(), DbErr> {
        // Additive migration; columns stay on downgrade.
        Ok(())
    }
}

const UP_SQL: &str = "
ALTER TABLE checks ADD COLUMN allowed_methods TEXT NOT NULL DEFAULT '';
ALTER TABLE checks ADD COLUMN success_kw TEXT NOT NULL DEFAULT '';
ALTER TABLE checks ADD COLUMN start_kw TEXT NOT NULL DEFAULT '';
ALTER TABLE checks ADD COLUMN failure_kw TEXT NOT NULL DEFAULT '';
ALTER TABLE checks ADD COLUMN body_regex TEXT;
ALTER TABLE checks ADD COLUMN subject_regex TEXT;
";

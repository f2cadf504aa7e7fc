use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "channels")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub project_id: String,
    pub kind: String,
    pub name: String,
    pub value: String,
    pub email_verified: bool,
    pub disabled: bool,
    pub last_notify: Option<DateTimeWithTimeZone>,
    pub last_notify_duration_ms: Option<i64>,
    pub last_error: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl Related<super::check::Entity> for Entity {
    fn to() -> RelationDef {
        super::check_channel::Relation::Check.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::check_channel::Relation::Channel.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}

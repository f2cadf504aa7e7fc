use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "pings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub owner_id: String,
    pub n: i64,
    pub kind: String,
    pub created: DateTimeWithTimeZone,
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

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::check::Entity",
        from = "Column::OwnerId",
        to = "super::check::Column::Id"
    )]
    Check,
}

impl Related<super::check::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Check.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

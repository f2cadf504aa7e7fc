use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "checks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub project_id: String,
    pub name: String,
    #[sea_orm(unique)]
    pub badge_key: String,
    pub kind: String,
    pub timeout_secs: i64,
    pub schedule: String,
    pub tz: String,
    pub grace_secs: i64,
    pub status: String,
    pub last_ping: Option<DateTimeWithTimeZone>,
    pub last_start: Option<DateTimeWithTimeZone>,
    pub alert_after: Option<DateTimeWithTimeZone>,
    pub n_pings: i64,
    pub last_duration_secs: Option<i64>,
    pub manual_resume: bool,
    pub allowed_methods: String,
    pub success_kw: String,
    pub start_kw: String,
    pub failure_kw: String,
    pub body_regex: Option<String>,
    pub subject_regex: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::ping::Entity")]
    Ping,
    #[sea_orm(has_many = "super::flip::Entity")]
    Flip,
}

impl Related<super::ping::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ping.def()
    }
}

impl Related<super::flip::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Flip.def()
    }
}

// Checks and channels form the only cycle in the ownership graph; the
// join entity breaks it, so neither side owns the other.
impl Related<super::channel::Entity> for Entity {
    fn to() -> RelationDef {
        super::check_channel::Relation::Channel.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::check_channel::Relation::Check.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}

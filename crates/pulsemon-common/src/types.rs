use serde::{Deserialize, Serialize};

/// Persisted status of a check.
///
/// `grace` and `started` are never stored; they exist only in
/// [`DisplayStatus`], which API consumers see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    New,
    Up,
    Down,
    Paused,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::New => write!(f, "new"),
            CheckStatus::Up => write!(f, "up"),
            CheckStatus::Down => write!(f, "down"),
            CheckStatus::Paused => write!(f, "paused"),
        }
    }
}

impl std::str::FromStr for CheckStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(CheckStatus::New),
            "up" => Ok(CheckStatus::Up),
            "down" => Ok(CheckStatus::Down),
            "paused" => Ok(CheckStatus::Paused),
            _ => Err(format!("unknown check status: {s}")),
        }
    }
}

/// Status reported to API consumers. Superset of [`CheckStatus`]:
/// a check inside its grace window reports `grace`, a check with an
/// unmatched start ping reports `started`; both are stored as `up`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    New,
    Up,
    Grace,
    Started,
    Down,
    Paused,
}

impl DisplayStatus {
    /// The value persisted in the `status` column.
    pub fn stored(self) -> CheckStatus {
        match self {
            DisplayStatus::New => CheckStatus::New,
            DisplayStatus::Up | DisplayStatus::Grace | DisplayStatus::Started => CheckStatus::Up,
            DisplayStatus::Down => CheckStatus::Down,
            DisplayStatus::Paused => CheckStatus::Paused,
        }
    }
}

impl std::fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisplayStatus::New => write!(f, "new"),
            DisplayStatus::Up => write!(f, "up"),
            DisplayStatus::Grace => write!(f, "grace"),
            DisplayStatus::Started => write!(f, "started"),
            DisplayStatus::Down => write!(f, "down"),
            DisplayStatus::Paused => write!(f, "paused"),
        }
    }
}

/// Kind of a heartbeat event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PingKind {
    Success,
    Start,
    Fail,
    Log,
    Ign,
}

impl std::fmt::Display for PingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PingKind::Success => write!(f, "success"),
            PingKind::Start => write!(f, "start"),
            PingKind::Fail => write!(f, "fail"),
            PingKind::Log => write!(f, "log"),
            PingKind::Ign => write!(f, "ign"),
        }
    }
}

impl std::str::FromStr for PingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(PingKind::Success),
            "start" => Ok(PingKind::Start),
            "fail" => Ok(PingKind::Fail),
            "log" => Ok(PingKind::Log),
            "ign" => Ok(PingKind::Ign),
            _ => Err(format!("unknown ping kind: {s}")),
        }
    }
}

/// Why a flip was created.
///
/// `None` (empty string in the database) marks flips triggered directly by
/// a ping, e.g. a success ping bringing a down check back up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlipReason {
    None,
    Timeout,
    Fail,
    Nag,
}

impl FlipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FlipReason::None => "",
            FlipReason::Timeout => "timeout",
            FlipReason::Fail => "fail",
            FlipReason::Nag => "nag",
        }
    }
}

impl std::fmt::Display for FlipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FlipReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(FlipReason::None),
            "timeout" => Ok(FlipReason::Timeout),
            "fail" => Ok(FlipReason::Fail),
            "nag" => Ok(FlipReason::Nag),
            _ => Err(format!("unknown flip reason: {s}")),
        }
    }
}

/// Schedule kind of a check, as stored in the `kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    Simple,
    Cron,
    OnCalendar,
}

impl std::fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleKind::Simple => write!(f, "simple"),
            ScheduleKind::Cron => write!(f, "cron"),
            ScheduleKind::OnCalendar => write!(f, "oncalendar"),
        }
    }
}

impl std::str::FromStr for ScheduleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(ScheduleKind::Simple),
            "cron" => Ok(ScheduleKind::Cron),
            "oncalendar" => Ok(ScheduleKind::OnCalendar),
            _ => Err(format!("unknown schedule kind: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn check_status_roundtrip(status in prop_oneof![
            Just(CheckStatus::New),
            Just(CheckStatus::Up),
            Just(CheckStatus::Down),
            Just(CheckStatus::Paused),
        ]) {
            let s = status.to_string();
            let parsed: CheckStatus = s.parse().unwrap();
            prop_assert_eq!(status, parsed);
        }

        #[test]
        fn ping_kind_roundtrip(kind in prop_oneof![
            Just(PingKind::Success),
            Just(PingKind::Start),
            Just(PingKind::Fail),
            Just(PingKind::Log),
            Just(PingKind::Ign),
        ]) {
            let s = kind.to_string();
            let parsed: PingKind = s.parse().unwrap();
            prop_assert_eq!(kind, parsed);
        }

        #[test]
        fn flip_reason_roundtrip(reason in prop_oneof![
            Just(FlipReason::None),
            Just(FlipReason::Timeout),
            Just(FlipReason::Fail),
            Just(FlipReason::Nag),
        ]) {
            let s = reason.to_string();
            let parsed: FlipReason = s.parse().unwrap();
            prop_assert_eq!(reason, parsed);
        }
    }

    #[test]
    fn display_status_stores_as_up_within_grace() {
        assert_eq!(DisplayStatus::Grace.stored(), CheckStatus::Up);
        assert_eq!(DisplayStatus::Started.stored(), CheckStatus::Up);
        assert_eq!(DisplayStatus::Down.stored(), CheckStatus::Down);
    }
}

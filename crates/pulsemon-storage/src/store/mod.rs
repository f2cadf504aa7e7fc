pub mod channel;
pub mod check;
pub mod flip;
pub mod notification;
pub mod ping;

pub use channel::ChannelRow;
pub use check::CheckRow;
pub use flip::FlipRow;
pub use notification::NotificationRow;
pub use ping::PingRow;

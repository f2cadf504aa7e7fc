/// Errors surfaced by the notification subsystem.
///
/// The dispatcher distinguishes transient failures (recorded on the
/// channel, delivery continues next flip) from permanent ones
/// (provider-signalled revocation; the channel is disabled).
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Channel configuration is missing a required field or malformed.
    #[error("invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// The channel kind is not registered.
    #[error("unknown channel kind '{0}'")]
    UnknownKind(String),

    /// An HTTP request to a notification endpoint failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// SMTP transport error when sending email.
    #[error("SMTP error: {0}")]
    Smtp(String),

    /// Parsing a channel's `value` blob failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The external API rejected the request. `permanent` marks
    /// responses that will never succeed again (410 Gone, revoked key).
    #[error("API error from {service}: status={status}, body={body}")]
    Api {
        service: String,
        status: u16,
        body: String,
        permanent: bool,
    },

    /// The email address has not been verified yet.
    #[error("email address is not verified")]
    NotVerified,

    /// The per-call delivery timeout elapsed.
    #[error("delivery timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl NotifyError {
    /// Whether retrying this channel can ever succeed. Permanent errors
    /// set `disabled` on the channel.
    pub fn permanent(&self) -> bool {
        matches!(self, NotifyError::Api { permanent: true, .. })
    }
}

pub type Result<T> = std::result::Result<T, NotifyError>;

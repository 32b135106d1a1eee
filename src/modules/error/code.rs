use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[repr(u32)]
pub enum ErrorCode {
    // Client-side errors (10000–10999)
    InvalidParameter = 10000,
    MissingConfiguration = 10020,
    MessageParseError = 10050,

    // Network connection errors (40000–40999)
    NetworkError = 40000,
    ConnectionTimeout = 40010,

    // Mail service errors (50000–50999)
    SmtpCommandFailed = 50030,
    SmtpConnectionFailed = 50040,
    ProxyBridgeFailed = 50060,

    // Internal system errors (70000–70999)
    InternalError = 70000,
}

impl ErrorCode {
    /// True for errors caused by invalid caller input rather than the
    /// environment; these never reach the transport layer.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ErrorCode::InvalidParameter
                | ErrorCode::MissingConfiguration
                | ErrorCode::MessageParseError
        )
    }
}

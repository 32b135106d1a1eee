use code::ErrorCode;
use snafu::{Location, Snafu};

pub mod code;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MailForgeError {
    #[snafu(display("{message}"))]
    Generic {
        message: String,
        #[snafu(implicit)]
        location: Location,
        code: ErrorCode,
    },
}

pub type MailForgeResult<T, E = MailForgeError> = std::result::Result<T, E>;

impl MailForgeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            MailForgeError::Generic { code, .. } => *code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            MailForgeError::Generic { message, .. } => message,
        }
    }
}

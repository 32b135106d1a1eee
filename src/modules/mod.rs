pub mod convert;
pub mod email;
pub mod error;
pub mod mailer;
pub mod settings;
pub mod transport;
pub mod utils;

//! Email construction and SMTP transport configuration.
//!
//! `mailforge` sits on top of the `mail-send`/`mail-parser` stack and adds
//! two things those crates deliberately leave to the caller:
//!
//! - an immutable [`Email`] aggregate built through a validating,
//!   non-consuming [`EmailBuilder`], including reply/forward seeding from an
//!   existing wire-format message, and
//! - a [`Mailer`] that maps high-level connection options (host, port,
//!   credentials, proxy, TLS strategy) onto flat protocol-session properties
//!   via [`TransportStrategy`], bridges authenticated SOCKS proxies through a
//!   local relay when the transport cannot authenticate itself, and performs
//!   delivery.
//!
//! ```no_run
//! use mailforge::{EmailBuilder, MailerBuilder, TransportStrategy};
//!
//! # async fn demo() -> mailforge::MailForgeResult<()> {
//! let email = EmailBuilder::new()
//!     .from(Some("Michel Baker"), "m.baker@mbakery.example")?
//!     .to(Some("C. Cane"), "candycane@candyshop.example")?
//!     .with_subject("Delivery schedule")
//!     .with_plain_text("The truck leaves at noon.")
//!     .build_email();
//!
//! let mailer = MailerBuilder::new()
//!     .with_smtp_server("smtp.mbakery.example", 587, Some("m.baker"), Some("secret"))
//!     .with_transport_strategy(TransportStrategy::SmtpTls)
//!     .build_mailer()?;
//!
//! let outcome = mailer.send(&email).await?;
//! println!("sent as {}", outcome.message_id());
//! # Ok(())
//! # }
//! ```

pub mod modules;

pub use modules::email::builder::EmailBuilder;
pub use modules::email::{AttachmentResource, CalendarMethod, Email, Recipient, RecipientKind};
pub use modules::error::{code::ErrorCode, MailForgeError, MailForgeResult};
pub use modules::mailer::{Mailer, MailerBuilder, SendOutcome};
pub use modules::settings::{clear_config, load_config, load_config_file};
pub use modules::transport::session::{ProxyConfig, ServerConfig, Session};
pub use modules::transport::strategy::TransportStrategy;

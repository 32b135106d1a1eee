//! The send orchestrator: resolves transport configuration into a
//! [`Session`], manages the proxy bridge lifecycle around each connection
//! and drives the SMTP conversation.

use std::collections::BTreeMap;

use mail_send::smtp::message::Message;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::modules::convert::email_to_message;
use crate::modules::email::Email;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::mailer::client::SmtpTransport;
use crate::modules::settings::{self, ConfigSnapshot};
use crate::modules::transport::proxy::ProxyBridge;
use crate::modules::transport::session::{ProxyConfig, ServerConfig, Session};
use crate::modules::transport::strategy::TransportStrategy;
use crate::modules::utils::generate_message_id;
use crate::raise_error;

pub mod client;

pub const DEFAULT_SMTP_PORT: u16 = 25;

/// The result of a successful send. Emails stay immutable, so the
/// protocol-assigned message id travels back here instead of being written
/// into the sent [`Email`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SendOutcome {
    message_id: String,
}

impl SendOutcome {
    /// The Message-ID the mail went out with, either the one pinned on the
    /// email or a freshly generated one.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }
}

/// Staged transport configuration for a [`Mailer`].
///
/// Every value resolves through the same precedence chain: an explicit
/// builder call beats the loaded configuration, which beats the built-in
/// default. The configuration snapshot is captured once at construction,
/// so a concurrent reload never changes a builder mid-flight.
#[derive(Clone, Debug, Default)]
pub struct MailerBuilder {
    config: ConfigSnapshot,
    strategy: Option<TransportStrategy>,
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    proxy_host: Option<String>,
    proxy_port: Option<u16>,
    proxy_username: Option<String>,
    proxy_password: Option<String>,
    proxy_bridge_port: Option<u16>,
    proxy_cleared: bool,
    opportunistic_tls: Option<bool>,
    debug_logging: Option<bool>,
    extra_properties: BTreeMap<String, String>,
    preset_session: Option<Session>,
}

impl MailerBuilder {
    pub fn new() -> MailerBuilder {
        Self::from_snapshot(settings::snapshot())
    }

    pub(crate) fn from_snapshot(config: ConfigSnapshot) -> MailerBuilder {
        MailerBuilder {
            config,
            ..MailerBuilder::default()
        }
    }

    pub fn with_transport_strategy(mut self, strategy: TransportStrategy) -> MailerBuilder {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_smtp_server(
        mut self,
        host: impl Into<String>,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
    ) -> MailerBuilder {
        self.host = Some(host.into());
        self.port = Some(port);
        self.username = username.map(String::from);
        self.password = password.map(String::from);
        self
    }

    pub fn with_proxy(mut self, host: impl Into<String>, port: u16) -> MailerBuilder {
        self.proxy_host = Some(host.into());
        self.proxy_port = Some(port);
        self.proxy_username = None;
        self.proxy_password = None;
        self.proxy_cleared = false;
        self
    }

    pub fn with_authenticated_proxy(
        mut self,
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> MailerBuilder {
        self.proxy_host = Some(host.into());
        self.proxy_port = Some(port);
        self.proxy_username = Some(username.into());
        self.proxy_password = Some(password.into());
        self.proxy_cleared = false;
        self
    }

    /// Local listen port for the authenticating proxy bridge; only
    /// meaningful together with an authenticated proxy.
    pub fn with_proxy_bridge_port(mut self, port: u16) -> MailerBuilder {
        self.proxy_bridge_port = Some(port);
        self
    }

    /// Disables proxying even when the loaded configuration defines one.
    pub fn clear_proxy(mut self) -> MailerBuilder {
        self.proxy_host = None;
        self.proxy_port = None;
        self.proxy_username = None;
        self.proxy_password = None;
        self.proxy_cleared = true;
        self
    }

    /// Sets one extra session property, merged over the mapped keys last.
    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> MailerBuilder {
        self.extra_properties.insert(key.into(), value.into());
        self
    }

    pub fn with_debug_logging(mut self, debug_logging: bool) -> MailerBuilder {
        self.debug_logging = Some(debug_logging);
        self
    }

    pub fn with_opportunistic_tls(mut self, opportunistic_tls: bool) -> MailerBuilder {
        self.opportunistic_tls = Some(opportunistic_tls);
        self
    }

    /// Adopts a previously mapped session verbatim, skipping resolution.
    pub fn using_session(mut self, session: Session) -> MailerBuilder {
        self.preset_session = Some(session);
        self
    }

    /// Resolves everything into a [`Session`] and wraps it in a [`Mailer`].
    /// Fails when no SMTP host is available from any source.
    pub fn build_mailer(self) -> MailForgeResult<Mailer> {
        if let Some(session) = self.preset_session {
            return Ok(Mailer { session });
        }

        let strategy = self
            .strategy
            .or(self.config.transport_strategy)
            .unwrap_or_default();

        let host = self
            .host
            .or_else(|| self.config.smtp_host.clone())
            .ok_or_else(|| {
                raise_error!(
                    "No SMTP host configured: set one on the builder or in the loaded configuration"
                        .into(),
                    ErrorCode::MissingConfiguration
                )
            })?;
        let port = self
            .port
            .or(self.config.smtp_port)
            .unwrap_or(DEFAULT_SMTP_PORT);
        let server = ServerConfig {
            host,
            port,
            username: self.username.or_else(|| self.config.smtp_username.clone()),
            password: self.password.or_else(|| self.config.smtp_password.clone()),
        };

        let proxy = if self.proxy_cleared {
            None
        } else {
            let proxy_host = self
                .proxy_host
                .or_else(|| self.config.proxy_host.clone());
            let proxy_port = self.proxy_port.or(self.config.proxy_port);
            match (proxy_host, proxy_port) {
                (Some(host), Some(port)) => Some(ProxyConfig {
                    host,
                    port,
                    username: self
                        .proxy_username
                        .or_else(|| self.config.proxy_username.clone()),
                    password: self
                        .proxy_password
                        .or_else(|| self.config.proxy_password.clone()),
                    bridge_port: self.proxy_bridge_port.or(self.config.proxy_bridge_port),
                }),
                _ => None,
            }
        };

        let opportunistic_tls = self
            .opportunistic_tls
            .or(self.config.opportunistic_tls)
            .unwrap_or_else(|| strategy.default_opportunistic_tls());
        let debug_logging = self
            .debug_logging
            .or(self.config.debug)
            .unwrap_or(false);

        let session = Session::map(
            strategy,
            &server,
            proxy.as_ref(),
            opportunistic_tls,
            debug_logging,
            &self.extra_properties,
        );
        Ok(Mailer { session })
    }
}

/// Sends [`Email`]s over the transport its [`Session`] describes.
///
/// Cheap to clone; every send opens a fresh connection and, when the
/// session demands it, runs a proxy bridge for exactly the duration of
/// that connection.
#[derive(Clone, Debug)]
pub struct Mailer {
    session: Session,
}

impl Mailer {
    pub fn builder() -> MailerBuilder {
        MailerBuilder::new()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Sends one email and returns the Message-ID it went out with.
    ///
    /// The SMTP envelope originates from the bounce-to recipient when one
    /// is set, the from recipient otherwise, and addresses every To/Cc/Bcc
    /// entry. A required proxy bridge is started before connecting and torn
    /// down on every exit path; bridge teardown never masks a send error.
    pub async fn send(&self, email: &Email) -> MailForgeResult<SendOutcome> {
        let envelope_from = email
            .bounce_to_recipient()
            .or_else(|| email.from_recipient())
            .map(|r| r.address.clone())
            .ok_or_else(|| {
                raise_error!(
                    "Email has no from recipient".into(),
                    ErrorCode::InvalidParameter
                )
            })?;
        if email.recipients().is_empty() {
            return Err(raise_error!(
                "Email has no recipients".into(),
                ErrorCode::InvalidParameter
            ));
        }

        let message_id = match email.id() {
            Some(id) => id.to_string(),
            None => generate_message_id(),
        };
        let mut builder = email_to_message(email)?;
        if email.id().is_none() {
            builder = builder.message_id(message_id.clone());
        }
        let body = builder.write_to_vec().map_err(|e| {
            raise_error!(
                format!("Failed to serialize message: {}", e),
                ErrorCode::InternalError
            )
        })?;
        let rcpt_to: Vec<String> = email
            .recipients()
            .iter()
            .map(|r| r.address.clone())
            .collect();
        let message = Message::new(envelope_from, rcpt_to, body);

        let bridge = self.start_bridge_if_planned().await?;
        let result = async {
            let mut transport = SmtpTransport::connect(&self.session).await?;
            transport.send_message(message).await?;
            if let Err(e) = transport.quit().await {
                warn!(error = %e.message(), "QUIT after successful send failed");
            }
            Ok(())
        }
        .await;
        if let Some(bridge) = bridge {
            bridge.shutdown();
        }
        result?;

        info!(message_id = %message_id, "email sent");
        Ok(SendOutcome { message_id })
    }

    /// Fire-and-forget variant of [`send`](Mailer::send) running on its own
    /// task.
    pub fn send_async(&self, email: Email) -> JoinHandle<MailForgeResult<SendOutcome>> {
        let mailer = self.clone();
        tokio::spawn(async move { mailer.send(&email).await })
    }

    /// Opens a connection, negotiates like a real send would and exchanges
    /// a NOOP, then disconnects.
    pub async fn test_connection(&self) -> MailForgeResult<()> {
        let bridge = self.start_bridge_if_planned().await?;
        let result = async {
            let mut transport = SmtpTransport::connect(&self.session).await?;
            transport.noop().await?;
            if let Err(e) = transport.quit().await {
                warn!(error = %e.message(), "QUIT after connection test failed");
            }
            Ok(())
        }
        .await;
        if let Some(bridge) = bridge {
            bridge.shutdown();
        }
        result
    }

    async fn start_bridge_if_planned(&self) -> MailForgeResult<Option<ProxyBridge>> {
        let Some(plan) = self.session.proxy_bridge_plan() else {
            return Ok(None);
        };
        let host = self.session.host().ok_or_else(|| {
            raise_error!(
                "Session carries no host property".into(),
                ErrorCode::MissingConfiguration
            )
        })?;
        let port = self.session.port().ok_or_else(|| {
            raise_error!(
                "Session carries no port property".into(),
                ErrorCode::MissingConfiguration
            )
        })?;
        ProxyBridge::start(plan, host, port).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ConfigSnapshot {
        ConfigSnapshot {
            transport_strategy: Some(TransportStrategy::SmtpTls),
            smtp_host: Some("smtp.default.com".to_string()),
            smtp_port: Some(25),
            smtp_username: Some("username smtp".to_string()),
            smtp_password: Some("password smtp".to_string()),
            proxy_host: Some("proxy.default.com".to_string()),
            proxy_port: Some(1080),
            proxy_username: Some("username proxy".to_string()),
            proxy_password: Some("password proxy".to_string()),
            proxy_bridge_port: Some(1081),
            opportunistic_tls: None,
            debug: None,
        }
    }

    #[test]
    fn configuration_fills_everything_the_builder_leaves_out() {
        let mailer = MailerBuilder::from_snapshot(snapshot())
            .build_mailer()
            .unwrap();
        let session = mailer.session();
        assert_eq!(session.strategy(), TransportStrategy::SmtpTls);
        assert_eq!(session.host(), Some("smtp.default.com"));
        assert_eq!(session.port(), Some(25));
        assert_eq!(session.username(), Some("username smtp"));
        assert_eq!(session.password(), Some("password smtp"));
        // Authenticated proxy from configuration gets the bridge treatment.
        assert_eq!(session.socks_host(), Some("localhost"));
        assert_eq!(session.socks_port(), Some(1081));
        assert_eq!(
            session.proxy_bridge_plan().unwrap().proxy_host,
            "proxy.default.com"
        );
    }

    #[test]
    fn explicit_values_beat_the_configuration() {
        let mailer = MailerBuilder::from_snapshot(snapshot())
            .with_transport_strategy(TransportStrategy::Smtps)
            .with_smtp_server("smtp.explicit.com", 465, Some("user"), Some("pass"))
            .build_mailer()
            .unwrap();
        let session = mailer.session();
        assert_eq!(session.strategy(), TransportStrategy::Smtps);
        assert_eq!(session.host(), Some("smtp.explicit.com"));
        assert_eq!(session.port(), Some(465));
        assert_eq!(session.username(), Some("user"));
    }

    #[test]
    fn missing_host_everywhere_is_an_error() {
        let err = MailerBuilder::from_snapshot(ConfigSnapshot::default())
            .build_mailer()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingConfiguration);
    }

    #[test]
    fn defaults_without_configuration() {
        let mailer = MailerBuilder::from_snapshot(ConfigSnapshot::default())
            .with_smtp_server("smtp.example.com", 587, None, None)
            .build_mailer()
            .unwrap();
        let session = mailer.session();
        assert_eq!(session.strategy(), TransportStrategy::Smtp);
        assert!(session.starttls_enabled());
        assert!(!session.debug());
    }

    #[test]
    fn clear_proxy_discards_the_configured_proxy() {
        let mailer = MailerBuilder::from_snapshot(snapshot())
            .clear_proxy()
            .build_mailer()
            .unwrap();
        assert_eq!(mailer.session().socks_host(), None);
        assert!(mailer.session().proxy_bridge_plan().is_none());
    }

    #[test]
    fn opportunistic_tls_override_beats_configuration() {
        let mut config = snapshot();
        config.transport_strategy = Some(TransportStrategy::Smtp);
        config.opportunistic_tls = Some(false);

        let from_config = MailerBuilder::from_snapshot(config.clone())
            .clear_proxy()
            .build_mailer()
            .unwrap();
        assert!(!from_config.session().starttls_enabled());

        let overridden = MailerBuilder::from_snapshot(config)
            .clear_proxy()
            .with_opportunistic_tls(true)
            .build_mailer()
            .unwrap();
        assert!(overridden.session().starttls_enabled());
    }

    #[test]
    fn extra_properties_reach_the_session() {
        let mailer = MailerBuilder::from_snapshot(ConfigSnapshot::default())
            .with_smtp_server("smtp.example.com", 587, None, None)
            .with_property("mail.smtp.timeout", "60000")
            .with_property("mail.smtp.port", "2525")
            .build_mailer()
            .unwrap();
        assert_eq!(
            mailer.session().property("mail.smtp.timeout"),
            Some("60000")
        );
        assert_eq!(mailer.session().port(), Some(2525));
    }

    #[test]
    fn preset_session_is_adopted_verbatim() {
        let source = MailerBuilder::from_snapshot(ConfigSnapshot::default())
            .with_smtp_server("smtp.example.com", 587, None, None)
            .build_mailer()
            .unwrap();
        let session = source.session().clone();
        let mailer = MailerBuilder::from_snapshot(ConfigSnapshot::default())
            .using_session(session.clone())
            .build_mailer()
            .unwrap();
        assert_eq!(mailer.session(), &session);
    }
}

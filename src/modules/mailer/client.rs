use std::time::Duration;

use mail_send::smtp::message::IntoMessage;
use mail_send::smtp::tls::build_tls_connector;
use mail_send::smtp::AssertReply;
use mail_send::{Credentials, SmtpClient};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_socks::tcp::Socks5Stream;
use tracing::debug;

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::transport::session::Session;
use crate::modules::transport::strategy::TransportStrategy;
use crate::raise_error;

pub const EXT_START_TLS: u32 = 1 << 24;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A connected SMTP conversation, plain or TLS depending on how the
/// session's strategy and the server's capabilities played out.
pub enum SmtpTransport {
    Plain(SmtpClient<TcpStream>),
    Tls(SmtpClient<TlsStream<TcpStream>>),
}

impl SmtpTransport {
    /// Connects and completes greeting, EHLO, optional TLS negotiation and
    /// optional authentication according to `session`.
    ///
    /// The route is taken from the session's socks keys: when they point at
    /// the local bridge the connection is plain TCP (the bridge owns the
    /// SOCKS authentication), when they point at a real proxy the SOCKS
    /// handshake happens here, and without socks keys the server is dialed
    /// directly.
    pub async fn connect(session: &Session) -> MailForgeResult<SmtpTransport> {
        let host = session.host().ok_or_else(|| {
            raise_error!(
                "Session carries no host property".into(),
                ErrorCode::MissingConfiguration
            )
        })?;
        let port = session.port().ok_or_else(|| {
            raise_error!(
                "Session carries no port property".into(),
                ErrorCode::MissingConfiguration
            )
        })?;

        let tcp_stream = Self::open_route(session, host, port).await?;
        tcp_stream
            .set_nodelay(true)
            .map_err(|e| raise_error!(e.to_string(), ErrorCode::NetworkError))?;

        tokio::time::timeout(
            CONNECT_TIMEOUT,
            Self::negotiate(session, host, tcp_stream),
        )
        .await
        .map_err(|_| {
            raise_error!(
                format!("Timed out negotiating with {}:{}", host, port),
                ErrorCode::ConnectionTimeout
            )
        })?
    }

    async fn open_route(session: &Session, host: &str, port: u16) -> MailForgeResult<TcpStream> {
        match (session.socks_host(), session.socks_port()) {
            (Some(socks_host), Some(socks_port)) if session.proxy_bridge_plan().is_some() => {
                // The bridge performs the authenticated SOCKS handshake;
                // locally this is an ordinary TCP connection.
                debug!(socks_host, socks_port, "routing through local proxy bridge");
                TcpStream::connect((socks_host, socks_port))
                    .await
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::NetworkError))
            }
            (Some(socks_host), Some(socks_port)) => {
                debug!(socks_host, socks_port, "routing through SOCKS proxy");
                let socks_stream =
                    Socks5Stream::connect((socks_host, socks_port), (host.to_string(), port))
                        .await
                        .map_err(|e| {
                            raise_error!(format!("{:#?}", e), ErrorCode::NetworkError)
                        })?;
                Ok(socks_stream.into_inner())
            }
            _ => TcpStream::connect((host, port))
                .await
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::NetworkError)),
        }
    }

    async fn negotiate(
        session: &Session,
        host: &str,
        tcp_stream: TcpStream,
    ) -> MailForgeResult<SmtpTransport> {
        let mut client = SmtpClient {
            stream: tcp_stream,
            timeout: CONNECT_TIMEOUT,
        };

        let local_host = gethostname::gethostname()
            .to_str()
            .unwrap_or("[127.0.0.1]")
            .to_string();
        let lenient_tls = session.strategy() == TransportStrategy::Smtp;
        let tls_connector = build_tls_connector(lenient_tls);
        let credentials = match (session.username(), session.password()) {
            (Some(username), Some(password)) => Some(Credentials::new(
                username.to_string(),
                password.to_string(),
            )),
            _ => None,
        };

        let transport = match session.strategy() {
            TransportStrategy::Smtps => {
                let mut client = client
                    .into_tls(&tls_connector, host)
                    .await
                    .map_err(connect_err)?;
                client
                    .read()
                    .await
                    .map_err(connect_err)?
                    .assert_positive_completion()
                    .map_err(connect_err)?;
                let capabilities = client
                    .capabilities(&local_host, false)
                    .await
                    .map_err(connect_err)?;
                if let Some(credentials) = &credentials {
                    client
                        .authenticate(credentials, &capabilities)
                        .await
                        .map_err(connect_err)?;
                }
                SmtpTransport::Tls(client)
            }
            TransportStrategy::SmtpTls | TransportStrategy::Smtp => {
                client
                    .read()
                    .await
                    .map_err(connect_err)?
                    .assert_positive_completion()
                    .map_err(connect_err)?;
                let response = client.ehlo(&local_host).await.map_err(connect_err)?;
                let offers_starttls = response.has_capability(EXT_START_TLS);

                let upgrade = session.starttls_enabled() && offers_starttls;
                if session.starttls_required() && !offers_starttls {
                    return Err(raise_error!(
                        format!("{} does not offer STARTTLS but the session requires it", host),
                        ErrorCode::SmtpConnectionFailed
                    ));
                }

                if upgrade {
                    let mut client = client
                        .start_tls(&tls_connector, host)
                        .await
                        .map_err(connect_err)?;
                    let capabilities = client
                        .capabilities(&local_host, false)
                        .await
                        .map_err(connect_err)?;
                    if let Some(credentials) = &credentials {
                        client
                            .authenticate(credentials, &capabilities)
                            .await
                            .map_err(connect_err)?;
                    }
                    SmtpTransport::Tls(client)
                } else {
                    if let Some(credentials) = &credentials {
                        client
                            .authenticate(credentials, &response)
                            .await
                            .map_err(connect_err)?;
                    }
                    SmtpTransport::Plain(client)
                }
            }
        };

        Ok(transport)
    }

    pub async fn send_message<'x>(
        &mut self,
        message: impl IntoMessage<'x>,
    ) -> MailForgeResult<()> {
        match self {
            SmtpTransport::Plain(client) => client
                .send(message)
                .await
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::SmtpCommandFailed)),
            SmtpTransport::Tls(client) => client
                .send(message)
                .await
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::SmtpCommandFailed)),
        }
    }

    pub async fn noop(&mut self) -> MailForgeResult<()> {
        match self {
            SmtpTransport::Plain(client) => client
                .noop()
                .await
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::SmtpCommandFailed)),
            SmtpTransport::Tls(client) => client
                .noop()
                .await
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::SmtpCommandFailed)),
        }
    }

    pub async fn quit(self) -> MailForgeResult<()> {
        match self {
            SmtpTransport::Plain(client) => client
                .quit()
                .await
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::SmtpCommandFailed)),
            SmtpTransport::Tls(client) => client
                .quit()
                .await
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::SmtpCommandFailed)),
        }
    }
}

fn connect_err(e: mail_send::Error) -> crate::modules::error::MailForgeError {
    raise_error!(format!("{:#?}", e), ErrorCode::SmtpConnectionFailed)
}

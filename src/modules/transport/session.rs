use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::modules::transport::strategy::TransportStrategy;

pub const DEFAULT_PROXY_BRIDGE_PORT: u16 = 1080;

/// The SMTP server endpoint and optional account credentials.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// An upstream SOCKS proxy, optionally authenticated.
///
/// `bridge_port` is only consulted when credentials are present; it is the
/// local port the authenticating [`ProxyBridge`](super::ProxyBridge) will
/// listen on.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bridge_port: Option<u16>,
}

impl ProxyConfig {
    pub fn anonymous(host: impl Into<String>, port: u16) -> ProxyConfig {
        ProxyConfig {
            host: host.into(),
            port,
            username: None,
            password: None,
            bridge_port: None,
        }
    }

    pub fn authenticated(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> ProxyConfig {
        ProxyConfig {
            host: host.into(),
            port,
            username: Some(username.into()),
            password: Some(password.into()),
            bridge_port: None,
        }
    }

    fn requires_bridge(&self) -> bool {
        self.username.is_some()
    }

    fn effective_bridge_port(&self) -> u16 {
        self.bridge_port.unwrap_or(DEFAULT_PROXY_BRIDGE_PORT)
    }
}

/// Everything the proxy bridge needs to authenticate upstream on behalf of
/// the transport client.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BridgePlan {
    pub proxy_host: String,
    pub proxy_port: u16,
    pub username: String,
    pub password: String,
    pub bridge_port: u16,
}

/// An immutable snapshot of everything needed to open an SMTP connection:
/// the flat property map in protocol-session key form, the strategy, the
/// account credentials and, when an authenticated proxy is involved, the
/// bridge plan.
///
/// The password never enters the property map; it travels alongside it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Session {
    properties: BTreeMap<String, String>,
    strategy: TransportStrategy,
    debug: bool,
    password: Option<String>,
    proxy_bridge: Option<BridgePlan>,
}

impl Session {
    /// Maps a logical transport configuration onto the concrete property
    /// map for `strategy`.
    ///
    /// Proxy handling depends on the variant and on whether the proxy is
    /// authenticated: an unauthenticated proxy is emitted as-is under the
    /// socks keys, an authenticated one is rewritten to point at the local
    /// bridge, and the implicit-TLS variant drops proxies altogether.
    /// `extra_properties` are merged last and override anything the mapping
    /// produced.
    pub fn map(
        strategy: TransportStrategy,
        server: &ServerConfig,
        proxy: Option<&ProxyConfig>,
        opportunistic_tls: bool,
        debug_logging: bool,
        extra_properties: &BTreeMap<String, String>,
    ) -> Session {
        let mut properties = BTreeMap::new();
        properties.insert(
            "mail.transport.protocol".to_string(),
            strategy.protocol_name().to_string(),
        );
        properties.insert(strategy.property_host(), server.host.clone());
        properties.insert(strategy.property_port(), server.port.to_string());
        properties.insert("mail.debug".to_string(), debug_logging.to_string());

        if let Some(username) = &server.username {
            properties.insert(strategy.property_username(), username.clone());
            properties.insert(strategy.property_auth(), "true".to_string());
        }

        if strategy.uses_starttls_keys() {
            if opportunistic_tls {
                properties.insert(strategy.property_starttls_enable(), "true".to_string());
                match strategy {
                    TransportStrategy::Smtp => {
                        properties
                            .insert(strategy.property_starttls_required(), "false".to_string());
                        properties.insert(strategy.property_ssl_trust(), "*".to_string());
                        properties.insert(
                            strategy.property_check_server_identity(),
                            "false".to_string(),
                        );
                    }
                    TransportStrategy::SmtpTls => {
                        properties
                            .insert(strategy.property_starttls_required(), "true".to_string());
                        properties.insert(
                            strategy.property_check_server_identity(),
                            "true".to_string(),
                        );
                    }
                    TransportStrategy::Smtps => unreachable!(),
                }
            }
        } else {
            properties.insert(strategy.property_quitwait(), "false".to_string());
        }

        let mut proxy_bridge = None;
        if let Some(proxy) = proxy {
            if !strategy.supports_proxy() {
                debug!(
                    strategy = %strategy,
                    proxy_host = %proxy.host,
                    "proxy configured but ignored: implicit TLS never routes over SOCKS"
                );
            } else if proxy.requires_bridge() {
                let bridge_port = proxy.effective_bridge_port();
                properties.insert(strategy.property_socks_host(), "localhost".to_string());
                properties.insert(strategy.property_socks_port(), bridge_port.to_string());
                proxy_bridge = Some(BridgePlan {
                    proxy_host: proxy.host.clone(),
                    proxy_port: proxy.port,
                    username: proxy.username.clone().unwrap_or_default(),
                    password: proxy.password.clone().unwrap_or_default(),
                    bridge_port,
                });
            } else {
                properties.insert(strategy.property_socks_host(), proxy.host.clone());
                properties.insert(strategy.property_socks_port(), proxy.port.to_string());
            }
        }

        for (key, value) in extra_properties {
            properties.insert(key.clone(), value.clone());
        }

        Session {
            properties,
            strategy,
            debug: debug_logging,
            password: server.password.clone(),
            proxy_bridge,
        }
    }

    pub fn strategy(&self) -> TransportStrategy {
        self.strategy
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// The complete flat property map, password excluded.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn host(&self) -> Option<&str> {
        self.property(&self.strategy.property_host())
    }

    pub fn port(&self) -> Option<u16> {
        self.property(&self.strategy.property_port())
            .and_then(|p| p.parse().ok())
    }

    pub fn username(&self) -> Option<&str> {
        self.property(&self.strategy.property_username())
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn socks_host(&self) -> Option<&str> {
        self.property(&self.strategy.property_socks_host())
    }

    pub fn socks_port(&self) -> Option<u16> {
        self.property(&self.strategy.property_socks_port())
            .and_then(|p| p.parse().ok())
    }

    pub fn starttls_enabled(&self) -> bool {
        self.property(&self.strategy.property_starttls_enable()) == Some("true")
    }

    pub fn starttls_required(&self) -> bool {
        self.property(&self.strategy.property_starttls_required()) == Some("true")
    }

    /// Present when an authenticating proxy bridge must be running for this
    /// session's connections to succeed.
    pub fn proxy_bridge_plan(&self) -> Option<&BridgePlan> {
        self.proxy_bridge.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(username: Option<&str>) -> ServerConfig {
        ServerConfig {
            host: "host".to_string(),
            port: 25,
            username: username.map(String::from),
            password: username.map(|_| "secret".to_string()),
        }
    }

    #[test]
    fn smtp_tls_without_credentials_or_proxy() {
        let session = Session::map(
            TransportStrategy::SmtpTls,
            &server(None),
            None,
            true,
            false,
            &BTreeMap::new(),
        );
        assert_eq!(session.property("mail.transport.protocol"), Some("smtp"));
        assert_eq!(session.property("mail.smtp.host"), Some("host"));
        assert_eq!(session.property("mail.smtp.port"), Some("25"));
        assert_eq!(session.property("mail.smtp.starttls.enable"), Some("true"));
        assert_eq!(session.property("mail.smtp.starttls.required"), Some("true"));
        assert_eq!(
            session.property("mail.smtp.ssl.checkserveridentity"),
            Some("true")
        );
        assert_eq!(session.property("mail.smtp.username"), None);
        assert_eq!(session.property("mail.smtp.auth"), None);
        assert_eq!(session.socks_host(), None);
    }

    #[test]
    fn plain_smtp_gets_the_soft_starttls_profile() {
        let session = Session::map(
            TransportStrategy::Smtp,
            &server(Some("user")),
            None,
            true,
            false,
            &BTreeMap::new(),
        );
        assert_eq!(session.property("mail.smtp.starttls.enable"), Some("true"));
        assert_eq!(
            session.property("mail.smtp.starttls.required"),
            Some("false")
        );
        assert_eq!(session.property("mail.smtp.ssl.trust"), Some("*"));
        assert_eq!(
            session.property("mail.smtp.ssl.checkserveridentity"),
            Some("false")
        );
        assert_eq!(session.property("mail.smtp.username"), Some("user"));
        assert_eq!(session.property("mail.smtp.auth"), Some("true"));
        assert_eq!(session.password(), Some("secret"));
    }

    #[test]
    fn opportunistic_tls_disabled_emits_no_starttls_keys() {
        let session = Session::map(
            TransportStrategy::Smtp,
            &server(None),
            None,
            false,
            false,
            &BTreeMap::new(),
        );
        assert_eq!(session.property("mail.smtp.starttls.enable"), None);
        assert_eq!(session.property("mail.smtp.starttls.required"), None);
        assert_eq!(session.property("mail.smtp.ssl.trust"), None);
    }

    #[test]
    fn authenticated_proxy_is_rewritten_to_the_local_bridge() {
        let mut proxy =
            ProxyConfig::authenticated("proxy.example.com", 1030, "proxy user", "proxy password");
        proxy.bridge_port = Some(999);
        let session = Session::map(
            TransportStrategy::SmtpTls,
            &server(Some("user")),
            Some(&proxy),
            true,
            false,
            &BTreeMap::new(),
        );
        assert_eq!(session.socks_host(), Some("localhost"));
        assert_eq!(session.socks_port(), Some(999));
        assert_eq!(session.property("mail.smtp.auth"), Some("true"));
        let plan = session.proxy_bridge_plan().unwrap();
        assert_eq!(plan.proxy_host, "proxy.example.com");
        assert_eq!(plan.proxy_port, 1030);
        assert_eq!(plan.bridge_port, 999);
        assert_eq!(plan.username, "proxy user");
    }

    #[test]
    fn anonymous_proxy_points_straight_at_the_proxy() {
        let proxy = ProxyConfig::anonymous("proxy.example.com", 1030);
        let session = Session::map(
            TransportStrategy::Smtp,
            &server(None),
            Some(&proxy),
            true,
            false,
            &BTreeMap::new(),
        );
        assert_eq!(session.socks_host(), Some("proxy.example.com"));
        assert_eq!(session.socks_port(), Some(1030));
        assert!(session.proxy_bridge_plan().is_none());
    }

    #[test]
    fn implicit_tls_ignores_proxies_and_waives_quit() {
        let proxy =
            ProxyConfig::authenticated("proxy.example.com", 1030, "proxy user", "proxy password");
        let session = Session::map(
            TransportStrategy::Smtps,
            &server(Some("user")),
            Some(&proxy),
            true,
            false,
            &BTreeMap::new(),
        );
        assert_eq!(session.property("mail.transport.protocol"), Some("smtps"));
        assert_eq!(session.property("mail.smtps.host"), Some("host"));
        assert_eq!(session.property("mail.smtps.quitwait"), Some("false"));
        assert_eq!(session.socks_host(), None);
        assert!(session
            .properties()
            .keys()
            .all(|k| !k.contains("socks") && !k.contains("starttls")));
        assert!(session.proxy_bridge_plan().is_none());
    }

    #[test]
    fn extra_properties_always_win() {
        let mut extra = BTreeMap::new();
        extra.insert("mail.smtp.port".to_string(), "2525".to_string());
        extra.insert("mail.smtp.timeout".to_string(), "60000".to_string());
        let session = Session::map(
            TransportStrategy::Smtp,
            &server(None),
            None,
            true,
            false,
            &extra,
        );
        assert_eq!(session.property("mail.smtp.port"), Some("2525"));
        assert_eq!(session.property("mail.smtp.timeout"), Some("60000"));
    }

    #[test]
    fn default_bridge_port_is_1080() {
        let proxy =
            ProxyConfig::authenticated("proxy.example.com", 1030, "proxy user", "proxy password");
        let session = Session::map(
            TransportStrategy::Smtp,
            &server(None),
            Some(&proxy),
            true,
            false,
            &BTreeMap::new(),
        );
        assert_eq!(session.socks_port(), Some(1080));
    }
}

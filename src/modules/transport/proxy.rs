use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_socks::tcp::Socks5Stream;
use tracing::{debug, warn};

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::transport::session::BridgePlan;
use crate::raise_error;

/// A local relay that performs SOCKS authentication on behalf of a
/// transport client that cannot authenticate to a SOCKS proxy itself.
///
/// Listens on `127.0.0.1:{bridge_port}` and, for every accepted
/// connection, opens an authenticated SOCKS5 tunnel through the upstream
/// proxy to the fixed target endpoint, then pumps bytes both ways until
/// either side closes. The bridge speaks plain TCP on the local side, so
/// nothing sensitive ever leaves the loopback interface unauthenticated.
#[derive(Debug)]
pub struct ProxyBridge {
    accept_task: JoinHandle<()>,
    local_port: u16,
}

impl ProxyBridge {
    /// Binds the local listener and starts accepting. The returned bridge
    /// keeps relaying until [`shutdown`](ProxyBridge::shutdown) or drop.
    pub async fn start(
        plan: &BridgePlan,
        target_host: &str,
        target_port: u16,
    ) -> MailForgeResult<ProxyBridge> {
        let listener = TcpListener::bind(("127.0.0.1", plan.bridge_port))
            .await
            .map_err(|e| {
                raise_error!(
                    format!(
                        "Failed to bind proxy bridge on 127.0.0.1:{}: {}",
                        plan.bridge_port, e
                    ),
                    ErrorCode::ProxyBridgeFailed
                )
            })?;
        let local_port = listener
            .local_addr()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ProxyBridgeFailed))?
            .port();

        debug!(
            port = local_port,
            proxy = %format!("{}:{}", plan.proxy_host, plan.proxy_port),
            "proxy bridge listening"
        );

        let plan = Arc::new(plan.clone());
        let target_host = target_host.to_string();
        let accept_task = tokio::spawn(async move {
            loop {
                let (local_stream, peer) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "proxy bridge accept failed, stopping");
                        break;
                    }
                };
                let plan = plan.clone();
                let target_host = target_host.clone();
                tokio::spawn(async move {
                    if let Err(e) =
                        relay(local_stream, &plan, &target_host, target_port).await
                    {
                        warn!(peer = %peer, error = %e.message(), "proxy bridge relay failed");
                    }
                });
            }
        });

        Ok(ProxyBridge {
            accept_task,
            local_port,
        })
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Stops accepting new connections. In-flight relays run to completion
    /// on their own tasks.
    pub fn shutdown(&self) {
        self.accept_task.abort();
        debug!(port = self.local_port, "proxy bridge stopped");
    }
}

impl Drop for ProxyBridge {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn relay(
    mut local_stream: TcpStream,
    plan: &BridgePlan,
    target_host: &str,
    target_port: u16,
) -> MailForgeResult<()> {
    let mut upstream = Socks5Stream::connect_with_password(
        (plan.proxy_host.as_str(), plan.proxy_port),
        (target_host.to_string(), target_port),
        &plan.username,
        &plan.password,
    )
    .await
    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ProxyBridgeFailed))?;

    tokio::io::copy_bidirectional(&mut local_stream, &mut upstream)
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ProxyBridgeFailed))?;
    Ok(())
}

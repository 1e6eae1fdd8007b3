//! The main server which wires the store, the notification bus and the HTTP server.

use std::sync::Arc;

use iroh_metrics::Registry;
use n0_snafu::{Result, ResultExt};
use tracing::info;

use crate::{
    bus::NotificationBus,
    config::Config,
    context::ContextBuilder,
    graphql::build_schema,
    http::HttpServer,
    metrics::ServerMetrics,
    state::AppState,
    store::{ProfileCollection, ProfileStore},
};

/// Spawn the server and run until the `Ctrl-C` signal is received, then shutdown.
pub async fn run_with_config_until_ctrl_c(config: Config) -> Result<()> {
    let store = ProfileCollection::persistent(config.store_path().e()?).e()?;
    let server = Server::spawn(config, store).await?;
    tokio::signal::ctrl_c().await.e()?;
    info!("shutdown");
    server.shutdown().await?;
    Ok(())
}

/// The profile server.
#[derive(Debug)]
pub struct Server {
    http_server: HttpServer,
    bus: NotificationBus,
}

impl Server {
    /// Spawn the server.
    ///
    /// The store and the notification bus are created once here and shared by every
    /// request.
    pub async fn spawn(config: Config, store: ProfileCollection) -> Result<Self> {
        let metrics = store.metrics().clone();
        let store = store.with_op_timeout(config.store.op_timeout);
        let store: Arc<dyn ProfileStore> = Arc::new(store);
        let bus = NotificationBus::new(config.notifications.capacity).with_metrics(metrics.clone());

        let registry = config.metrics_enabled().then(|| {
            let mut registry = Registry::default();
            registry.register_all(&ServerMetrics {
                profiles: metrics.clone(),
            });
            Arc::new(registry)
        });

        let state = AppState {
            schema: build_schema(store.clone(), bus.clone()),
            store,
            context: ContextBuilder::default(),
            metrics,
            registry,
        };
        let http_server = HttpServer::spawn(config.http, state).await.e()?;
        Ok(Self { http_server, bus })
    }

    /// Get the bound address of the HTTP server.
    pub fn http_addr(&self) -> std::net::SocketAddr {
        self.http_server.http_addr()
    }

    /// The notification bus shared by all requests.
    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    /// Cancel the server tasks and wait for all tasks to complete.
    pub async fn shutdown(self) -> Result<()> {
        self.http_server.shutdown().await.e()?;
        Ok(())
    }

    /// Wait for all tasks to complete.
    ///
    /// This will run forever unless all tasks close with an error, or [`Self::shutdown`]
    /// is called.
    pub async fn run_until_error(self) -> Result<()> {
        self.http_server.run_until_done().await.e()?;
        Ok(())
    }

    /// Spawn a server suitable for testing.
    ///
    /// It uses an in-memory store, binds to a random port on localhost and serves
    /// metrics. Returns the server handle and the bound address.
    #[cfg(test)]
    pub async fn spawn_for_tests() -> Result<(Self, std::net::SocketAddr)> {
        use std::net::{IpAddr, Ipv4Addr};

        let mut config = Config::default();
        config.http.port = 0;
        config.http.bind_addr = Some(IpAddr::V4(Ipv4Addr::LOCALHOST));

        let store = ProfileCollection::in_memory().e()?;
        let server = Self::spawn(config, store).await?;
        let http_addr = server.http_addr();
        Ok((server, http_addr))
    }
}

//! Server runtime
//!
//! ## Table of Contents
//! - **GameServer**: Main runtime struct (tick task + WebSocket listener)
//! - **GameServerBuilder**: Builder pattern for server configuration
//!
//! The runtime owns the two halves of the server: the fixed-rate tick task
//! and the axum listener feeding the gateway. Both share the world behind
//! one `RwLock`; the write lock is the serialization point required between
//! physics steps and inbound mutations.

use crate::config::GameConfig;
use crate::error::{Result, ServerError};
use crate::gateway::{ws_handler, ClientRegistry, GatewayState, SharedWorld};
use crate::tick;
use crate::world::WorldState;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Simulation tick period (≈60 Hz).
const TICK_INTERVAL: Duration = Duration::from_millis(16);

/// Environment variable naming the listen port.
const PORT_ENV: &str = "PORT";

/// Listen port used when `PORT` is absent.
const DEFAULT_PORT: u16 = 8080;

/// Main game server runtime.
pub struct GameServer {
    bind_addr: SocketAddr,
    world: SharedWorld,
    registry: Arc<ClientRegistry>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Builder for constructing [`GameServer`] instances.
pub struct GameServerBuilder {
    config: GameConfig,
    bind_addr: SocketAddr,
}

impl GameServerBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: GameConfig::default(),
            bind_addr: ([0, 0, 0, 0], DEFAULT_PORT).into(),
        }
    }

    /// Set the game configuration.
    pub fn with_config(mut self, config: GameConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the bind address.
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Parse the bind address from a string.
    pub fn with_addr_str(mut self, addr: &str) -> Result<Self> {
        self.bind_addr = addr
            .parse()
            .map_err(|e| ServerError::config(format!("invalid address: {}", e)))?;
        Ok(self)
    }

    /// Take the listen port from the `PORT` environment variable, keeping
    /// the default when it is absent.
    pub fn with_port_from_env(mut self) -> Result<Self> {
        if let Ok(raw) = std::env::var(PORT_ENV) {
            let port: u16 = raw
                .parse()
                .map_err(|_| ServerError::config(format!("invalid {}: {:?}", PORT_ENV, raw)))?;
            self.bind_addr.set_port(port);
        }
        Ok(self)
    }

    /// Validate the configuration and build the server.
    pub fn build(self) -> Result<GameServer> {
        self.config.validate()?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(GameServer {
            bind_addr: self.bind_addr,
            world: Arc::new(RwLock::new(WorldState::new(self.config))),
            registry: Arc::new(ClientRegistry::new()),
            shutdown_tx,
        })
    }
}

impl Default for GameServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GameServer {
    /// Start building a server.
    pub fn builder() -> GameServerBuilder {
        GameServerBuilder::new()
    }

    /// The shared world, for embedding and tests.
    pub fn world(&self) -> SharedWorld {
        Arc::clone(&self.world)
    }

    /// A handle that stops the server when a unit is sent on it.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Run the server until shutdown or a fatal listener error.
    pub async fn run(self) -> Result<()> {
        let gateway = GatewayState {
            world: Arc::clone(&self.world),
            registry: Arc::clone(&self.registry),
        };

        // Fixed-rate simulation task.
        let tick_world = Arc::clone(&self.world);
        let tick_registry = Arc::clone(&self.registry);
        let mut tick_shutdown = self.shutdown_tx.subscribe();
        let tick_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last = Instant::now();
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let now = Instant::now();
                        let dt = now.duration_since(last).as_secs_f32();
                        last = now;
                        let events = {
                            let mut world = tick_world.write().await;
                            tick::advance(&mut world, now, dt)
                        };
                        for event in &events {
                            tick_registry.broadcast_all(event);
                        }
                    }
                    _ = tick_shutdown.recv() => break,
                }
            }
        });

        let app = Router::new()
            .route("/ws", get(ws_handler))
            .layer(CorsLayer::permissive())
            .with_state(gateway);

        let listener = tokio::net::TcpListener::bind(self.bind_addr)
            .await
            .map_err(|e| {
                ServerError::network(format!("failed to bind {}: {}", self.bind_addr, e))
            })?;
        info!(addr = %self.bind_addr, "kingstone server listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let serve = async move { axum::serve(listener, app).await };
        let outcome = tokio::select! {
            result = serve => {
                result.map_err(|e| ServerError::network(format!("listener error: {}", e)))
            }
            _ = shutdown_rx.recv() => {
                info!("shutdown signal received");
                Ok(())
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                Ok(())
            }
        };

        let _ = self.shutdown_tx.send(());
        let _ = tick_task.await;

        match outcome {
            Ok(()) => {
                info!("server stopped");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "server terminated abnormally");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_build() {
        let server = GameServer::builder().build();
        assert!(server.is_ok());
    }

    #[test]
    fn test_builder_rejects_bad_addr() {
        assert!(GameServerBuilder::new().with_addr_str("not-an-addr").is_err());
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let mut config = GameConfig::default();
        config.physics.speed_multiplier = 0.0;
        assert!(GameServer::builder().with_config(config).build().is_err());
    }

    #[tokio::test]
    async fn test_run_and_graceful_shutdown() {
        let server = GameServer::builder()
            .with_addr(([127, 0, 0, 1], 0).into())
            .build()
            .unwrap();
        let shutdown = server.shutdown_handle();

        let running = tokio::spawn(server.run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.send(()).unwrap();

        let result = running.await.unwrap();
        use tokio_test::assert_ok;
        assert_ok!(result);
    }
}

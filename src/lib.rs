//! # Kingstone
//!
//! Authoritative simulation and session server for the island
//! stone-stacking game: players wander an island, pick up stones that wash
//! in from the sea, throw them into piles that fuse into towers, and climb
//! them, while wandering clouds tear the tallest towers back down. The
//! player standing on top of the tallest tower is crowned king.
//!
//! ## Features
//!
//! - **Fixed-tick simulation**: ≈60 Hz loop integrating stone physics over
//!   a baked heightfield terrain
//! - **Emergent towers**: settled stone clusters fuse into leveled towers
//! - **Cloud choreography**: wandering clouds run a three-phase
//!   destruction sequence against the tallest tower
//! - **King arbitration**: throttled king-of-the-hill checks with
//!   transition-only broadcasts
//! - **WebSocket sessions**: JSON protocol with per-connection bounded
//!   fan-out queues
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kingstone::{GameConfig, GameServer};
//!
//! #[tokio::main]
//! async fn main() -> kingstone::Result<()> {
//!     let server = GameServer::builder()
//!         .with_config(GameConfig::default())
//!         .with_addr_str("0.0.0.0:8080")?
//!         .build()?;
//!
//!     server.run().await
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod cloud;
pub mod config;
pub mod error;
pub mod gateway;
pub mod player;
pub mod protocol;
pub mod runtime;
pub mod stone;
pub mod terrain;
pub mod tick;
pub mod tower;
pub mod types;
pub mod world;

// Re-exports for ergonomic API
pub use config::{GameConfig, StoneConfig, TowerConfig, WorldConfig};
pub use error::{Result, ServerError};
pub use gateway::{ClientRegistry, GatewayState};
pub use protocol::{ClientMessage, ServerMessage};
pub use runtime::{GameServer, GameServerBuilder};
pub use terrain::Terrain;
pub use types::{CloudId, PlayerId, StoneId, TowerId};
pub use world::WorldState;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::GameConfig;
    pub use crate::error::Result;
    pub use crate::protocol::{ClientMessage, ServerMessage};
    pub use crate::runtime::{GameServer, GameServerBuilder};
    pub use crate::types::{CloudId, PlayerId, StoneId, TowerId};
    pub use crate::world::WorldState;
}

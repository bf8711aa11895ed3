//! WebSocket wire protocol
//!
//! This module owns every message that crosses the socket boundary between
//! the server and its clients.
//!
//! ## Design rules
//!
//! 1. Every message is a JSON object with a snake_case `type` tag and
//!    camelCase fields.
//! 2. No simulation types leak out: the wire carries DTOs built from the
//!    world entities at broadcast time.
//! 3. Cross-references are id-based in both directions; a client never
//!    receives an object graph.
//! 4. Vectors are `{x, y, z}` objects.

use crate::cloud::{Cloud, DestructionPhase, DestructionSequence};
use crate::error::{Result, ServerError};
use crate::player::PlayerSession;
use crate::stone::Stone;
use crate::tower::Tower;
use crate::types::{CloudId, PlayerId, StoneId, TowerId};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Vector DTO; the wire shape is `{x, y, z}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireVec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl From<Vec3> for WireVec3 {
    fn from(v: Vec3) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

impl From<WireVec3> for Vec3 {
    fn from(v: WireVec3) -> Self {
        Vec3::new(v.x, v.y, v.z)
    }
}

/// Serialized stone state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireStone {
    /// Stone identity
    pub id: StoneId,
    /// World position
    pub position: WireVec3,
    /// Velocity
    pub velocity: WireVec3,
    /// Euler rotation
    pub rotation: WireVec3,
    /// Whether a player carries the stone
    pub is_held: bool,
    /// The carrying player, when held
    pub held_by: Option<PlayerId>,
    /// Whether the stone has been thrown
    pub is_thrown: bool,
    /// Whether the stone is at rest
    pub is_static: bool,
}

impl From<&Stone> for WireStone {
    fn from(stone: &Stone) -> Self {
        Self {
            id: stone.id,
            position: stone.position.into(),
            velocity: stone.velocity.into(),
            rotation: stone.rotation.into(),
            is_held: stone.is_held(),
            held_by: stone.held_by.clone(),
            is_thrown: stone.is_thrown,
            is_static: stone.is_static,
        }
    }
}

/// Serialized tower state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTower {
    /// Tower identity
    pub id: TowerId,
    /// Ground position
    pub position: WireVec3,
    /// Current level
    pub level: u32,
}

impl From<&Tower> for WireTower {
    fn from(tower: &Tower) -> Self {
        Self {
            id: tower.id,
            position: tower.position.into(),
            level: tower.level,
        }
    }
}

/// Serialized cloud state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCloud {
    /// Cloud identity
    pub id: CloudId,
    /// World position
    pub position: WireVec3,
    /// Unit travel direction
    pub direction: WireVec3,
    /// Travel speed
    pub speed: f32,
}

impl From<&Cloud> for WireCloud {
    fn from(cloud: &Cloud) -> Self {
        Self {
            id: cloud.id,
            position: cloud.position.into(),
            direction: cloud.direction.into(),
            speed: cloud.speed,
        }
    }
}

/// Serialized player state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePlayer {
    /// Player identity
    pub player_id: PlayerId,
    /// Display name
    pub username: String,
    /// Last reported position
    pub position: WireVec3,
    /// Last reported rotation
    pub rotation: WireVec3,
    /// Carried stones in pickup order
    pub held_stones: Vec<StoneId>,
}

impl From<&PlayerSession> for WirePlayer {
    fn from(session: &PlayerSession) -> Self {
        Self {
            player_id: session.id.clone(),
            username: session.username.clone(),
            position: session.position.into(),
            rotation: session.rotation.into(),
            held_stones: session.held_stones.clone(),
        }
    }
}

/// Inbound client intents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Register a session
    PlayerJoin {
        /// Client-chosen identity
        player_id: PlayerId,
        /// Display name
        #[serde(default)]
        username: String,
        /// Initial position
        position: WireVec3,
        /// Initial rotation
        rotation: WireVec3,
    },
    /// Update pose and held-stone list
    PlayerUpdate {
        /// Sender identity
        player_id: PlayerId,
        /// New position
        position: WireVec3,
        /// New rotation
        rotation: WireVec3,
        /// Carried stones in pickup order
        #[serde(default)]
        held_stones: Vec<StoneId>,
    },
    /// Ask for a full state snapshot
    RequestState,
    /// Try to pick up a stone
    StonePickup {
        /// Target stone
        stone_id: StoneId,
    },
    /// Throw a held stone
    StoneThrow {
        /// Target stone
        stone_id: StoneId,
        /// Client-side stone position at release (informational)
        #[serde(default)]
        position: Option<WireVec3>,
        /// Direction hint; the server derives the actual throw force
        velocity: WireVec3,
    },
    /// Dismantle one level of a tower
    TowerDestack {
        /// Target tower
        tower_id: TowerId,
    },
}

impl ClientMessage {
    /// Parse a client message from a text frame.
    pub fn from_text(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| ServerError::protocol(format!("bad client message: {}", e)))
    }
}

/// Outbound server events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Full snapshot, sent to a joiner and on `request_state`
    InitialState {
        /// All live sessions
        players: Vec<WirePlayer>,
        /// All towers
        towers: Vec<WireTower>,
        /// All stones
        stones: Vec<WireStone>,
        /// All clouds
        clouds: Vec<WireCloud>,
    },
    /// A player joined (sent to the others)
    PlayerJoin {
        /// Joiner identity
        player_id: PlayerId,
        /// Display name
        username: String,
        /// Initial position
        position: WireVec3,
        /// Initial rotation
        rotation: WireVec3,
    },
    /// A player left
    PlayerLeave {
        /// Leaver identity
        player_id: PlayerId,
    },
    /// A player moved (sent to the others)
    PlayerUpdate {
        /// Sender identity
        player_id: PlayerId,
        /// New position
        position: WireVec3,
        /// New rotation
        rotation: WireVec3,
        /// Carried stones in pickup order
        held_stones: Vec<StoneId>,
    },
    /// The spawner or a destack produced a stone
    StoneSpawned {
        /// The new stone
        stone: WireStone,
    },
    /// Per-tick batch of stones whose pose changed
    StoneUpdate {
        /// Changed stones
        stones: Vec<WireStone>,
    },
    /// A pickup was accepted
    StonePickup {
        /// Target stone
        stone_id: StoneId,
        /// New holder
        player_id: PlayerId,
    },
    /// A throw was accepted
    StoneThrow {
        /// Thrown stone
        stone_id: StoneId,
        /// Thrower
        player_id: PlayerId,
        /// Release position
        position: WireVec3,
        /// Assigned velocity
        velocity: WireVec3,
    },
    /// Settled stones fused into a new tower
    TowerCreate {
        /// The new tower
        tower: WireTower,
        /// Stones consumed by the formation
        consumed_stones: Vec<StoneId>,
    },
    /// A tower changed level
    TowerUpdate {
        /// Target tower
        tower_id: TowerId,
        /// Level after the change
        new_level: u32,
        /// Stones consumed by a level-up
        #[serde(skip_serializing_if = "Option::is_none")]
        consumed_stones: Option<Vec<StoneId>>,
        /// Set when the change came from a destack
        #[serde(skip_serializing_if = "Option::is_none")]
        was_destacked: Option<bool>,
    },
    /// A tower was removed
    TowerDestroy {
        /// Index of the removed tower
        tower_index: usize,
    },
    /// Throttled batch of cloud poses
    CloudUpdate {
        /// All clouds
        clouds: Vec<WireCloud>,
    },
    /// A destruction sequence started
    TowerStartDestruction {
        /// Acting cloud
        cloud_id: CloudId,
        /// Target tower
        tower_id: TowerId,
        /// Target tower index at sequence start
        tower_index: usize,
        /// Target tower ground position
        tower_position: WireVec3,
        /// Cloud position at sequence start
        start_position: WireVec3,
        /// Initial phase
        phase: DestructionPhase,
    },
    /// A destruction sequence advanced to a new phase
    TowerUpdateDestruction {
        /// Acting cloud
        cloud_id: CloudId,
        /// Target tower
        tower_id: TowerId,
        /// New phase
        phase: DestructionPhase,
    },
    /// The king changed
    KingUpdate {
        /// New king, or null when the throne is empty
        king_id: Option<PlayerId>,
    },
}

impl ServerMessage {
    /// Serialize for a text frame.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Build the start-of-destruction event from a sequence record.
    pub fn destruction_started(sequence: &DestructionSequence) -> Self {
        Self::TowerStartDestruction {
            cloud_id: sequence.cloud_id,
            tower_id: sequence.tower_id,
            tower_index: sequence.tower_index,
            tower_position: sequence.tower_position.into(),
            start_position: sequence.start_position.into(),
            phase: sequence.phase,
        }
    }
}

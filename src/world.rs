//! World state
//!
//! ## Table of Contents
//! - **WorldState**: Single owner of all players, stones, towers, clouds,
//!   destruction sequences and return paths
//! - **Session operations**: join / update / pickup / throw / destack /
//!   remove, each returning the broadcasts it produced
//! - **self_heal**: Invariant repair run at the top of every tick
//!
//! Everything outside this container refers to entities by id and resolves
//! them here at each site of use; nothing holds an object edge into the
//! world, so destroying an entity can never dangle.

use crate::cloud::{Cloud, CloudReturnPath, DestructionSequence};
use crate::config::GameConfig;
use crate::error::{Result, ServerError};
use crate::player::PlayerSession;
use crate::protocol::{ServerMessage, WireCloud, WirePlayer, WireStone, WireTower};
use crate::stone::Stone;
use crate::terrain::Terrain;
use crate::tower::Tower;
use crate::types::{CloudId, PlayerId, StoneId, TowerId};
use glam::Vec3;
use rand::Rng;
use std::collections::HashMap;
use std::f32::consts::TAU;
use std::time::Instant;
use tracing::{info, warn};

/// Random spread applied to the throw angle, ±π/12.
const THROW_SPREAD: f32 = std::f32::consts::PI / 12.0;

/// The mutable heart of the server. One instance per process, shared
/// behind the runtime's lock.
pub struct WorldState {
    pub(crate) config: GameConfig,
    pub(crate) terrain: Terrain,
    pub(crate) players: HashMap<PlayerId, PlayerSession>,
    pub(crate) stones: HashMap<StoneId, Stone>,
    pub(crate) towers: Vec<Tower>,
    pub(crate) clouds: Vec<Cloud>,
    pub(crate) sequences: Vec<DestructionSequence>,
    pub(crate) return_paths: Vec<CloudReturnPath>,
    pub(crate) last_spawn: Option<Instant>,
    pub(crate) last_cloud_broadcast: Option<Instant>,
    pub(crate) last_king_check: Option<Instant>,
    pub(crate) king: Option<PlayerId>,
    next_stone_id: u64,
    next_tower_id: u64,
}

impl WorldState {
    /// Build the world: bake the terrain and launch the cloud population.
    pub fn new(config: GameConfig) -> Self {
        let terrain = Terrain::generate(&config.world);
        let mut rng = rand::thread_rng();
        let clouds = (0..config.world.cloud_count)
            .map(|i| {
                Cloud::spawn(
                    CloudId::new(i as u64),
                    config.half_size(),
                    config.world.cloud_height,
                    &mut rng,
                )
            })
            .collect();

        Self {
            config,
            terrain,
            players: HashMap::new(),
            stones: HashMap::new(),
            towers: Vec::new(),
            clouds,
            sequences: Vec::new(),
            return_paths: Vec::new(),
            last_spawn: None,
            last_cloud_broadcast: None,
            last_king_check: None,
            king: None,
            next_stone_id: 0,
            next_tower_id: 0,
        }
    }

    /// The read-only configuration this world runs with.
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// The baked terrain.
    pub fn terrain(&self) -> &Terrain {
        &self.terrain
    }

    /// Number of live stones.
    pub fn stone_count(&self) -> usize {
        self.stones.len()
    }

    /// Current king, if any.
    pub fn king(&self) -> Option<&PlayerId> {
        self.king.as_ref()
    }

    pub(crate) fn alloc_stone_id(&mut self) -> StoneId {
        let id = StoneId::new(self.next_stone_id);
        self.next_stone_id += 1;
        id
    }

    pub(crate) fn alloc_tower_id(&mut self) -> TowerId {
        let id = TowerId::new(self.next_tower_id);
        self.next_tower_id += 1;
        id
    }

    /// Insert a fresh free stone and return a reference to it.
    pub(crate) fn insert_stone(&mut self, position: Vec3) -> &Stone {
        let id = self.alloc_stone_id();
        self.stones.entry(id).or_insert(Stone::new(id, position))
    }

    /// Stone ids in ascending order; the deterministic iteration order used
    /// by the formation rules.
    pub(crate) fn sorted_stone_ids(&self) -> Vec<StoneId> {
        let mut ids: Vec<StoneId> = self.stones.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Index of a tower in formation order.
    pub(crate) fn tower_index_of(&self, id: TowerId) -> Option<usize> {
        self.towers.iter().position(|t| t.id == id)
    }

    /// Full state snapshot for `initial_state`.
    pub fn snapshot(&self) -> ServerMessage {
        let mut players: Vec<&PlayerSession> = self.players.values().collect();
        players.sort_by(|a, b| a.id.cmp(&b.id));

        let stone_ids = self.sorted_stone_ids();
        ServerMessage::InitialState {
            players: players.into_iter().map(WirePlayer::from).collect(),
            towers: self.towers.iter().map(WireTower::from).collect(),
            stones: stone_ids
                .iter()
                .filter_map(|id| self.stones.get(id))
                .map(WireStone::from)
                .collect(),
            clouds: self.clouds.iter().map(WireCloud::from).collect(),
        }
    }

    // Session operations

    /// Register a session from a `player_join` intent. Returns the
    /// `player_join` broadcast for the other clients.
    pub fn join_player(
        &mut self,
        id: PlayerId,
        username: String,
        position: Vec3,
        rotation: Vec3,
    ) -> Result<ServerMessage> {
        if self.players.contains_key(&id) {
            return Err(ServerError::session(format!(
                "player {} already registered",
                id
            )));
        }

        let username = if username.is_empty() {
            id.as_str().to_string()
        } else {
            username
        };

        let session = PlayerSession::new(id.clone(), username.clone(), position, rotation);
        self.players.insert(id.clone(), session);
        info!(player_id = %id, %username, "player joined");

        Ok(ServerMessage::PlayerJoin {
            player_id: id,
            username,
            position: position.into(),
            rotation: rotation.into(),
        })
    }

    /// Apply a `player_update` intent. The held-stone list is taken from
    /// the client but filtered against actual holdership; pickup and throw
    /// remain the only operations that change who holds what.
    pub fn update_player(
        &mut self,
        id: &PlayerId,
        position: Vec3,
        rotation: Vec3,
        held_stones: Vec<StoneId>,
    ) -> Result<ServerMessage> {
        let held: Vec<StoneId> = held_stones
            .into_iter()
            .filter(|stone_id| {
                self.stones
                    .get(stone_id)
                    .map(|s| s.held_by.as_ref() == Some(id))
                    .unwrap_or(false)
            })
            .collect();

        let session = self
            .players
            .get_mut(id)
            .ok_or_else(|| ServerError::unknown_entity(format!("player {}", id)))?;

        session.position = position;
        session.rotation = rotation;
        session.held_stones = held.clone();
        session.last_update = Instant::now();

        Ok(ServerMessage::PlayerUpdate {
            player_id: id.clone(),
            position: position.into(),
            rotation: rotation.into(),
            held_stones: held,
        })
    }

    /// Apply a `stone_pickup` intent.
    pub fn pickup_stone(&mut self, player: &PlayerId, stone_id: StoneId) -> Result<ServerMessage> {
        if !self.players.contains_key(player) {
            return Err(ServerError::unknown_entity(format!("player {}", player)));
        }
        let stone = self
            .stones
            .get_mut(&stone_id)
            .ok_or_else(|| ServerError::unknown_entity(stone_id.to_string()))?;
        if stone.is_held() {
            return Err(ServerError::authority(format!(
                "{} is already held",
                stone_id
            )));
        }

        let mut rng = rand::thread_rng();
        stone.pick_up(player.clone(), &mut rng);

        if let Some(session) = self.players.get_mut(player) {
            session.held_stones.push(stone_id);
        }

        Ok(ServerMessage::StonePickup {
            stone_id,
            player_id: player.clone(),
        })
    }

    /// Apply a `stone_throw` intent. The client supplies only a direction
    /// hint; force and spread are rolled here.
    pub fn throw_stone(
        &mut self,
        player: &PlayerId,
        stone_id: StoneId,
        direction: Vec3,
        now: Instant,
    ) -> Result<ServerMessage> {
        let stone = self
            .stones
            .get_mut(&stone_id)
            .ok_or_else(|| ServerError::unknown_entity(stone_id.to_string()))?;
        if stone.held_by.as_ref() != Some(player) {
            return Err(ServerError::authority(format!(
                "{} does not hold {}",
                player, stone_id
            )));
        }

        let mut rng = rand::thread_rng();
        let angle = direction.x.atan2(direction.z) + rng.gen_range(-THROW_SPREAD..THROW_SPREAD);
        let force = rng.gen_range(5.0..7.0);
        let velocity = Vec3::new(angle.sin() * force, rng.gen_range(2.0..3.0), angle.cos() * force);

        stone.release_thrown(velocity, now);
        let position = stone.position;

        if let Some(session) = self.players.get_mut(player) {
            session.held_stones.retain(|&s| s != stone_id);
        }

        Ok(ServerMessage::StoneThrow {
            stone_id,
            player_id: player.clone(),
            position: position.into(),
            velocity: velocity.into(),
        })
    }

    /// Apply a `tower_destack` intent: always spill one level's worth of
    /// stones, then shrink or destroy the tower.
    pub fn destack_tower(&mut self, player: &PlayerId, tower_id: TowerId) -> Result<Vec<ServerMessage>> {
        let session = self
            .players
            .get(player)
            .ok_or_else(|| ServerError::unknown_entity(format!("player {}", player)))?;
        let position = session.position;

        let index = self
            .tower_index_of(tower_id)
            .ok_or_else(|| ServerError::unknown_entity(tower_id.to_string()))?;
        let tower = self.towers[index].clone();
        if tower.horizontal_distance(position) > self.config.tower.base_radius {
            return Err(ServerError::authority(format!(
                "{} is too far from {}",
                player, tower_id
            )));
        }

        let count = self.config.tower.stones_per_level;
        let top = tower.top_height(self.config.stone.depth) + 2.0;
        let mut events = Vec::with_capacity(count + 1);

        for k in 0..count {
            let angle = k as f32 / count as f32 * TAU;
            let spawn = Vec3::new(
                tower.position.x + angle.sin() * 2.0,
                top,
                tower.position.z + angle.cos() * 2.0,
            );
            let stone = self.insert_stone(spawn);
            events.push(ServerMessage::StoneSpawned {
                stone: WireStone::from(stone),
            });
        }

        if tower.level <= 1 {
            self.towers.remove(index);
            info!(tower_id = %tower_id, "tower destacked away");
            events.push(ServerMessage::TowerDestroy { tower_index: index });
        } else {
            let tower = &mut self.towers[index];
            tower.level -= 1;
            events.push(ServerMessage::TowerUpdate {
                tower_id,
                new_level: tower.level,
                consumed_stones: None,
                was_destacked: Some(true),
            });
        }

        Ok(events)
    }

    /// Remove a session and drop everything it held. Safe to call twice;
    /// the second call is a no-op returning `None`.
    pub fn remove_player(&mut self, id: &PlayerId, now: Instant) -> Option<Vec<ServerMessage>> {
        let session = self.players.remove(id)?;

        for stone_id in &session.held_stones {
            if let Some(stone) = self.stones.get_mut(stone_id) {
                stone.release_thrown(Vec3::ZERO, now);
            }
        }
        if self.king.as_ref() == Some(id) {
            self.king = None;
        }

        info!(player_id = %id, dropped = session.held_stones.len(), "player left");
        Some(vec![ServerMessage::PlayerLeave { player_id: id.clone() }])
    }

    /// Repair breached invariants before a physics step.
    ///
    /// A held stone whose holder is gone (or whose holder no longer lists
    /// it) is released in place; the ids are returned so the tick can
    /// include them in `stone_update`.
    pub fn self_heal(&mut self) -> Vec<StoneId> {
        let mut healed = Vec::new();

        for (id, stone) in self.stones.iter_mut() {
            let Some(holder) = stone.held_by.clone() else {
                continue;
            };
            let listed = self
                .players
                .get(&holder)
                .map(|s| s.held_stones.contains(id))
                .unwrap_or(false);
            if !listed {
                warn!(stone_id = %id, holder = %holder, "held stone without holder, releasing");
                stone.held_by = None;
                stone.velocity = Vec3::ZERO;
                healed.push(*id);
            }
        }

        for session in self.players.values_mut() {
            let stones = &self.stones;
            session
                .held_stones
                .retain(|stone_id| stones.contains_key(stone_id));
        }

        healed.sort();
        healed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> WorldState {
        WorldState::new(GameConfig::default())
    }

    fn join(world: &mut WorldState, id: &str, position: Vec3) {
        world
            .join_player(PlayerId::new(id), id.into(), position, Vec3::ZERO)
            .unwrap();
    }

    #[test]
    fn test_join_then_disconnect_leaves_no_residue() {
        let mut w = world();
        let baseline_stones = w.stone_count();

        join(&mut w, "alice", Vec3::new(0.0, 2.0, 0.0));
        assert!(w.players.contains_key(&PlayerId::new("alice")));

        let events = w.remove_player(&PlayerId::new("alice"), Instant::now());
        assert!(events.is_some());
        assert!(w.players.is_empty());
        assert_eq!(w.stone_count(), baseline_stones);

        // Second cleanup is a no-op.
        assert!(w.remove_player(&PlayerId::new("alice"), Instant::now()).is_none());
    }

    #[test]
    fn test_duplicate_join_rejected() {
        let mut w = world();
        join(&mut w, "alice", Vec3::ZERO);
        let err = w
            .join_player(PlayerId::new("alice"), "alice".into(), Vec3::ZERO, Vec3::ZERO)
            .unwrap_err();
        assert!(matches!(err, ServerError::Session(_)));
    }

    #[test]
    fn test_pickup_and_throw_roundtrip() {
        let mut w = world();
        join(&mut w, "alice", Vec3::ZERO);
        let stone_id = w.insert_stone(Vec3::new(1.0, 1.0, 0.0)).id;

        w.pickup_stone(&PlayerId::new("alice"), stone_id).unwrap();
        {
            let stone = &w.stones[&stone_id];
            assert_eq!(stone.held_by, Some(PlayerId::new("alice")));
            assert_eq!(stone.velocity, Vec3::ZERO);
        }
        assert_eq!(
            w.players[&PlayerId::new("alice")].held_stones,
            vec![stone_id]
        );

        let msg = w
            .throw_stone(
                &PlayerId::new("alice"),
                stone_id,
                Vec3::new(0.0, 0.0, 1.0),
                Instant::now(),
            )
            .unwrap();

        let stone = &w.stones[&stone_id];
        assert!(stone.held_by.is_none());
        assert!(stone.is_thrown);
        assert!(w.players[&PlayerId::new("alice")].held_stones.is_empty());

        // Throw force for direction +z: z gets most of the 5..7 force.
        match msg {
            ServerMessage::StoneThrow { velocity, .. } => {
                assert!(velocity.z >= 4.5 && velocity.z <= 7.1, "vz = {}", velocity.z);
                assert!(velocity.y >= 2.0 && velocity.y <= 3.0);
            }
            other => panic!("wrong message: {:?}", other),
        }
    }

    #[test]
    fn test_pickup_of_held_stone_rejected() {
        let mut w = world();
        join(&mut w, "alice", Vec3::ZERO);
        join(&mut w, "bob", Vec3::ZERO);
        let stone_id = w.insert_stone(Vec3::ZERO).id;

        w.pickup_stone(&PlayerId::new("alice"), stone_id).unwrap();
        let err = w.pickup_stone(&PlayerId::new("bob"), stone_id).unwrap_err();
        assert!(matches!(err, ServerError::Authority(_)));
    }

    #[test]
    fn test_throw_by_non_holder_rejected() {
        let mut w = world();
        join(&mut w, "alice", Vec3::ZERO);
        join(&mut w, "bob", Vec3::ZERO);
        let stone_id = w.insert_stone(Vec3::ZERO).id;
        w.pickup_stone(&PlayerId::new("alice"), stone_id).unwrap();

        let err = w
            .throw_stone(&PlayerId::new("bob"), stone_id, Vec3::Z, Instant::now())
            .unwrap_err();
        assert!(matches!(err, ServerError::Authority(_)));
    }

    #[test]
    fn test_destack_level_one_destroys_tower() {
        let mut w = world();
        join(&mut w, "alice", Vec3::new(10.0, 1.0, 10.0));
        let id = w.alloc_tower_id();
        w.towers.push(Tower::new(id, Vec3::new(10.0, 0.5, 10.0)));
        let stones_before = w.stone_count();

        let events = w.destack_tower(&PlayerId::new("alice"), id).unwrap();
        let k = w.config.tower.stones_per_level;

        assert!(w.towers.is_empty());
        assert_eq!(w.stone_count(), stones_before + k);
        assert_eq!(events.len(), k + 1);
        assert!(matches!(
            events.last(),
            Some(ServerMessage::TowerDestroy { tower_index: 0 })
        ));
        // Spilled stones are free, unthrown and motionless.
        for event in &events[..k] {
            match event {
                ServerMessage::StoneSpawned { stone } => {
                    assert!(!stone.is_held);
                    assert!(!stone.is_thrown);
                    assert_eq!(stone.velocity.y, 0.0);
                }
                other => panic!("wrong event: {:?}", other),
            }
        }
    }

    #[test]
    fn test_destack_higher_level_decrements() {
        let mut w = world();
        join(&mut w, "alice", Vec3::new(10.0, 1.0, 10.0));
        let id = w.alloc_tower_id();
        let mut tower = Tower::new(id, Vec3::new(10.0, 0.5, 10.0));
        tower.level = 3;
        w.towers.push(tower);

        let events = w.destack_tower(&PlayerId::new("alice"), id).unwrap();
        assert_eq!(w.towers[0].level, 2);
        assert!(matches!(
            events.last(),
            Some(ServerMessage::TowerUpdate {
                new_level: 2,
                was_destacked: Some(true),
                ..
            })
        ));
    }

    #[test]
    fn test_destack_from_afar_rejected() {
        let mut w = world();
        join(&mut w, "alice", Vec3::new(50.0, 1.0, 50.0));
        let id = w.alloc_tower_id();
        w.towers.push(Tower::new(id, Vec3::new(10.0, 0.5, 10.0)));

        let err = w.destack_tower(&PlayerId::new("alice"), id).unwrap_err();
        assert!(matches!(err, ServerError::Authority(_)));
        assert_eq!(w.towers.len(), 1);
    }

    #[test]
    fn test_self_heal_releases_orphans() {
        let mut w = world();
        let stone_id = w.insert_stone(Vec3::ZERO).id;
        // Force the breach: held by a player that never joined.
        w.stones.get_mut(&stone_id).unwrap().held_by = Some(PlayerId::new("ghost"));

        let healed = w.self_heal();
        assert_eq!(healed, vec![stone_id]);
        assert!(w.stones[&stone_id].held_by.is_none());
    }

    #[test]
    fn test_update_filters_foreign_stones() {
        let mut w = world();
        join(&mut w, "alice", Vec3::ZERO);
        join(&mut w, "bob", Vec3::ZERO);
        let mine = w.insert_stone(Vec3::ZERO).id;
        let theirs = w.insert_stone(Vec3::ZERO).id;
        w.pickup_stone(&PlayerId::new("alice"), mine).unwrap();
        w.pickup_stone(&PlayerId::new("bob"), theirs).unwrap();

        let msg = w
            .update_player(
                &PlayerId::new("alice"),
                Vec3::new(1.0, 2.0, 3.0),
                Vec3::ZERO,
                vec![mine, theirs],
            )
            .unwrap();

        match msg {
            ServerMessage::PlayerUpdate { held_stones, .. } => {
                assert_eq!(held_stones, vec![mine]);
            }
            other => panic!("wrong message: {:?}", other),
        }
    }
}

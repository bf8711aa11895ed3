//! Fixed-tick simulation rules
//!
//! ## Table of Contents
//! - **advance**: One tick: heal, spawn, integrate, carry, form towers,
//!   run the destruction choreography, arbitrate the king
//! - **Per-tick event assembly**: spawns, then stone updates, then tower
//!   events, then throttled cloud updates, then throttled king updates
//!
//! All functions here mutate the world under the caller's lock and return
//! the broadcasts they produced; nothing in this module touches a socket.

use crate::cloud::{CloudReturnPath, DestructionPhase, DestructionSequence, TRIGGER_DISTANCE};
use crate::player::PlayerSession;
use crate::protocol::{ServerMessage, WireCloud, WireStone, WireTower};
use crate::stone::{carried_pose, Stone};
use crate::tower::Tower;
use crate::types::{CloudId, StoneId};
use crate::world::WorldState;
use glam::{Vec3, Vec3Swizzles};
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Cloud pose broadcast period (≈10 Hz).
const CLOUD_BROADCAST_INTERVAL: Duration = Duration::from_millis(100);

/// King arbitration period.
const KING_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Vertical window around a tower top inside which a player counts as
/// standing on it.
const KING_VERTICAL_WINDOW: f32 = 3.0;

/// Advance the simulation by one tick of `dt` seconds ending at `now`.
///
/// Returns the tick's outbound events in broadcast order.
pub fn advance(world: &mut WorldState, now: Instant, dt: f32) -> Vec<ServerMessage> {
    let mut changed = world.self_heal();
    let mut events = Vec::new();

    events.extend(spawn_stones(world, now));
    step_stones(world, dt, &mut changed);
    carry_stones(world, &mut changed);

    let mut tower_events = level_up_towers(world);
    tower_events.extend(form_tower(world));
    tower_events.extend(update_destruction(world, now));
    update_return_paths(world, now);
    wander_clouds(world, dt);
    tower_events.extend(trigger_destruction(world, now));

    changed.sort();
    changed.dedup();
    let stones: Vec<WireStone> = changed
        .iter()
        .filter_map(|id| world.stones.get(id))
        .map(WireStone::from)
        .collect();
    if !stones.is_empty() {
        events.push(ServerMessage::StoneUpdate { stones });
    }

    events.extend(tower_events);
    events.extend(broadcast_clouds(world, now));
    events.extend(arbitrate_king(world, now));
    events
}

/// Beach spawner: one stone per interval while under the cap, washed in
/// from a random edge.
fn spawn_stones(world: &mut WorldState, now: Instant) -> Vec<ServerMessage> {
    let stone_cfg = &world.config.stone;
    if world.stones.len() >= stone_cfg.max_count {
        return Vec::new();
    }
    let interval = Duration::from_millis(stone_cfg.spawn_interval_ms);
    let due = world
        .last_spawn
        .map(|t| now.duration_since(t) >= interval)
        .unwrap_or(true);
    if !due {
        return Vec::new();
    }

    let mut rng = rand::thread_rng();
    let distance = 1.2 * world.config.world.shore_radius * world.config.half_size();
    let offset = rng.gen_range(-0.3..0.3) * world.config.world.size;
    let lateral = rng.gen_range(-0.4..0.4);

    let (position, velocity) = match rng.gen_range(0..4) {
        0 => (Vec3::new(distance, -8.0, offset), Vec3::new(0.0, 1.5, lateral)),
        1 => (Vec3::new(-distance, -8.0, offset), Vec3::new(0.0, 1.5, lateral)),
        2 => (Vec3::new(offset, -8.0, distance), Vec3::new(lateral, 1.5, 0.0)),
        _ => (Vec3::new(offset, -8.0, -distance), Vec3::new(lateral, 1.5, 0.0)),
    };

    let id = world.alloc_stone_id();
    let mut stone = Stone::new(id, position);
    stone.velocity = velocity;
    let event = ServerMessage::StoneSpawned {
        stone: WireStone::from(&stone),
    };
    world.stones.insert(id, stone);
    world.last_spawn = Some(now);
    debug!(stone_id = %id, "stone washed in");

    vec![event]
}

/// Integrate every free stone.
fn step_stones(world: &mut WorldState, dt: f32, changed: &mut Vec<StoneId>) {
    for id in world.sorted_stone_ids() {
        let (stones, terrain, config) = (&mut world.stones, &world.terrain, &world.config);
        if let Some(stone) = stones.get_mut(&id) {
            if stone.step(terrain, config, dt) {
                changed.push(id);
            }
        }
    }
}

/// Overwrite the pose of every held stone from its holder.
fn carry_stones(world: &mut WorldState, changed: &mut Vec<StoneId>) {
    let mut carried: Vec<(StoneId, Vec3, f32, usize)> = Vec::new();
    for session in world.players.values() {
        for (ordinal, &stone_id) in session.held_stones.iter().enumerate() {
            carried.push((stone_id, session.position, session.yaw(), ordinal));
        }
    }

    for (stone_id, holder_position, yaw, ordinal) in carried {
        if let Some(stone) = world.stones.get_mut(&stone_id) {
            let (position, rotation) = carried_pose(holder_position, yaw, ordinal);
            if stone.position != position || stone.rotation != rotation {
                stone.position = position;
                stone.rotation = rotation;
                changed.push(stone_id);
            }
        }
    }
}

/// Formation phase A: settled stones near an existing tower level it up.
fn level_up_towers(world: &mut WorldState) -> Vec<ServerMessage> {
    let group_radius = world.config.tower.group_radius;
    let per_level = world.config.tower.stones_per_level;

    // Associate each settled stone with the first tower in range.
    let mut associated: Vec<Vec<StoneId>> = vec![Vec::new(); world.towers.len()];
    for id in world.sorted_stone_ids() {
        let stone = &world.stones[&id];
        if !stone.is_settled() {
            continue;
        }
        if let Some(index) = world
            .towers
            .iter()
            .position(|t| t.horizontal_distance(stone.position) < group_radius)
        {
            associated[index].push(id);
        }
    }

    let mut events = Vec::new();
    for (index, stones) in associated.iter().enumerate() {
        if stones.len() < per_level {
            continue;
        }
        let consumed: Vec<StoneId> = stones[..per_level].to_vec();
        for id in &consumed {
            world.stones.remove(id);
        }
        let tower = &mut world.towers[index];
        tower.level += 1;
        info!(tower_id = %tower.id, level = tower.level, "tower leveled up");
        events.push(ServerMessage::TowerUpdate {
            tower_id: tower.id,
            new_level: tower.level,
            consumed_stones: Some(consumed),
            was_destacked: None,
        });
    }
    events
}

/// Formation phase B: a cluster of settled stones becomes a new tower.
/// At most one tower forms per tick.
fn form_tower(world: &mut WorldState) -> Vec<ServerMessage> {
    let group_radius = world.config.tower.group_radius;
    let per_level = world.config.tower.stones_per_level;

    let settled: Vec<StoneId> = world
        .sorted_stone_ids()
        .into_iter()
        .filter(|id| world.stones[id].is_settled())
        .collect();

    for &seed in &settled {
        let seed_position = world.stones[&seed].position;
        let neighbors: Vec<StoneId> = settled
            .iter()
            .copied()
            .filter(|&other| {
                other != seed
                    && (world.stones[&other].position.xz() - seed_position.xz()).length()
                        < group_radius
            })
            .collect();
        if neighbors.len() < per_level - 1 {
            continue;
        }

        let members: Vec<StoneId> = std::iter::once(seed)
            .chain(neighbors.into_iter().take(per_level - 1))
            .collect();
        let sum: Vec3 = members.iter().map(|id| world.stones[id].position).sum();
        let mut center = sum / per_level as f32;
        center.y = world.terrain.height(center.x, center.z);

        for id in &members {
            world.stones.remove(id);
        }
        let id = world.alloc_tower_id();
        let tower = Tower::new(id, center);
        info!(tower_id = %id, x = center.x, z = center.z, "tower formed");
        let event = ServerMessage::TowerCreate {
            tower: WireTower::from(&tower),
            consumed_stones: members,
        };
        world.towers.push(tower);
        return vec![event];
    }
    Vec::new()
}

/// Advance every active destruction sequence; the sequence owns its
/// cloud's movement until the finale.
fn update_destruction(world: &mut WorldState, now: Instant) -> Vec<ServerMessage> {
    let timings = world.config.destruction.clone();
    let mut events = Vec::new();
    let mut finished = Vec::new();

    for index in 0..world.sequences.len() {
        let sequence = world.sequences[index].clone();
        let elapsed = now.duration_since(sequence.start_time);

        // A destack can remove the target mid-sequence; the cloud just
        // gives up and heads home.
        let Some(tower_index) = world.tower_index_of(sequence.tower_id) else {
            schedule_return(world, sequence.cloud_id, now);
            finished.push(index);
            continue;
        };

        match sequence.phase_at(elapsed, &timings) {
            Some(DestructionPhase::Moving) => {
                let position = sequence.moving_position(elapsed, &timings);
                set_cloud_position(world, sequence.cloud_id, position);
            }
            Some(phase) => {
                let pinned = Vec3::new(
                    sequence.tower_position.x,
                    sequence.start_position.y,
                    sequence.tower_position.z,
                );
                set_cloud_position(world, sequence.cloud_id, pinned);
                if phase != sequence.phase {
                    world.sequences[index].phase = phase;
                    events.push(ServerMessage::TowerUpdateDestruction {
                        cloud_id: sequence.cloud_id,
                        tower_id: sequence.tower_id,
                        phase,
                    });
                }
            }
            None => {
                world.towers.remove(tower_index);
                info!(tower_id = %sequence.tower_id, "tower destroyed by cloud");
                events.push(ServerMessage::TowerDestroy { tower_index });
                schedule_return(world, sequence.cloud_id, now);
                finished.push(index);
            }
        }
    }

    for index in finished.into_iter().rev() {
        world.sequences.remove(index);
    }
    events
}

fn set_cloud_position(world: &mut WorldState, cloud_id: CloudId, position: Vec3) {
    if let Some(cloud) = world.clouds.iter_mut().find(|c| c.id == cloud_id) {
        cloud.position = position;
    }
}

/// Send a cloud back to a random idle spot after its sequence ends.
fn schedule_return(world: &mut WorldState, cloud_id: CloudId, now: Instant) {
    let Some(cloud) = world.clouds.iter().find(|c| c.id == cloud_id) else {
        return;
    };
    let mut rng = rand::thread_rng();
    let third = world.config.world.size / 3.0;
    let end = Vec3::new(
        rng.gen_range(-third..third),
        world.config.world.cloud_height,
        rng.gen_range(-third..third),
    );
    world.return_paths.push(CloudReturnPath {
        cloud_id,
        start_position: cloud.position,
        end_position: end,
        start_time: now,
        duration: Duration::from_millis(world.config.destruction.return_ms),
    });
}

/// Move returning clouds along their paths and drop completed paths.
fn update_return_paths(world: &mut WorldState, now: Instant) {
    let mut arrivals = Vec::new();
    for path in &world.return_paths {
        let (position, done) = path.position_at(now.duration_since(path.start_time));
        arrivals.push((path.cloud_id, position, done));
    }
    for (cloud_id, position, _) in &arrivals {
        set_cloud_position(world, *cloud_id, *position);
    }
    let done: Vec<CloudId> = arrivals
        .iter()
        .filter(|(_, _, done)| *done)
        .map(|(id, _, _)| *id)
        .collect();
    world.return_paths.retain(|p| !done.contains(&p.cloud_id));
}

/// Background wander for clouds not owned by a sequence or return path.
fn wander_clouds(world: &mut WorldState, dt: f32) {
    let half = world.config.half_size();
    let mut rng = rand::thread_rng();
    let busy: Vec<CloudId> = world
        .sequences
        .iter()
        .map(|s| s.cloud_id)
        .chain(world.return_paths.iter().map(|p| p.cloud_id))
        .collect();

    for cloud in &mut world.clouds {
        if !busy.contains(&cloud.id) {
            cloud.wander(half, dt, &mut rng);
        }
    }
}

/// Check every idle cloud for a destruction trigger.
fn trigger_destruction(world: &mut WorldState, now: Instant) -> Vec<ServerMessage> {
    let base_radius = world.config.tower.base_radius;
    let depth = world.config.stone.depth;
    let mut events = Vec::new();

    for cloud_index in 0..world.clouds.len() {
        let cloud = world.clouds[cloud_index].clone();
        let busy = world.sequences.iter().any(|s| s.cloud_id == cloud.id)
            || world.return_paths.iter().any(|p| p.cloud_id == cloud.id);
        if busy {
            continue;
        }

        let mut players: Vec<&PlayerSession> = world.players.values().collect();
        players.sort_by(|a, b| a.id.cmp(&b.id));

        let mut target: Option<usize> = None;
        for player in players {
            let distance = (player.position.xz() - cloud.position.xz()).length();
            if distance >= TRIGGER_DISTANCE {
                continue;
            }
            let standing_on = world
                .towers
                .iter()
                .find(|t| t.horizontal_distance(player.position) < base_radius)
                .map(|t| t.id);

            let mut best: Option<(usize, f32)> = None;
            for (index, tower) in world.towers.iter().enumerate() {
                if Some(tower.id) == standing_on {
                    continue;
                }
                if world.sequences.iter().any(|s| s.tower_id == tower.id) {
                    continue;
                }
                let top = tower.top_height(depth);
                if best.map(|(_, tallest)| top > tallest).unwrap_or(true) {
                    best = Some((index, top));
                }
            }
            if let Some((index, _)) = best {
                target = Some(index);
                break;
            }
        }

        if let Some(index) = target {
            let tower = &world.towers[index];
            let sequence = DestructionSequence::new(
                cloud.id,
                tower.id,
                index,
                tower.position,
                cloud.position,
                now,
            );
            info!(cloud_id = %cloud.id, tower_id = %tower.id, "destruction sequence started");
            events.push(ServerMessage::destruction_started(&sequence));
            world.sequences.push(sequence);
        }
    }
    events
}

/// Throttled cloud pose broadcast.
fn broadcast_clouds(world: &mut WorldState, now: Instant) -> Vec<ServerMessage> {
    if world.clouds.is_empty() {
        return Vec::new();
    }
    let due = world
        .last_cloud_broadcast
        .map(|t| now.duration_since(t) >= CLOUD_BROADCAST_INTERVAL)
        .unwrap_or(true);
    if !due {
        return Vec::new();
    }
    world.last_cloud_broadcast = Some(now);
    vec![ServerMessage::CloudUpdate {
        clouds: world.clouds.iter().map(WireCloud::from).collect(),
    }]
}

/// Crown the player on top of the tallest tower, at most once per second.
/// Emits only on transitions, including to and from an empty throne.
fn arbitrate_king(world: &mut WorldState, now: Instant) -> Vec<ServerMessage> {
    let due = world
        .last_king_check
        .map(|t| now.duration_since(t) >= KING_CHECK_INTERVAL)
        .unwrap_or(true);
    if !due {
        return Vec::new();
    }
    world.last_king_check = Some(now);

    let depth = world.config.stone.depth;
    let mut tallest: Option<&Tower> = None;
    for tower in &world.towers {
        if tallest
            .map(|t| tower.top_height(depth) > t.top_height(depth))
            .unwrap_or(true)
        {
            tallest = Some(tower);
        }
    }

    let crown_radius = 1.3 * world.config.tower.base_radius;
    let new_king = tallest.and_then(|tower| {
        let top = tower.top_height(depth);
        let mut players: Vec<&PlayerSession> = world.players.values().collect();
        players.sort_by(|a, b| a.id.cmp(&b.id));
        players
            .into_iter()
            .find(|p| {
                tower.horizontal_distance(p.position) < crown_radius
                    && (p.position.y - top).abs() < KING_VERTICAL_WINDOW
            })
            .map(|p| p.id.clone())
    });

    if new_king == world.king {
        return Vec::new();
    }
    world.king = new_king.clone();
    info!(king = ?new_king.as_ref().map(|k| k.as_str()), "king changed");
    vec![ServerMessage::KingUpdate { king_id: new_king }]
}

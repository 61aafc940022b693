use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::constants::is_core_block;
use crate::host::WorldAccess;
use crate::policy::{self, amplified_health};
use crate::scheduler::Outbox;
use crate::types::{
    DifficultyFlags, DifficultyMode, HostCommand, MessageKey, PlayerId, PlayerRecordView,
    PlayerRuntimeState, PlayerSample, TrackerSnapshot, UnitHealthSample, UnitId,
};

/// Per-player liveness, respawn blocking and death counting.
///
/// Every entry point takes `&mut self`; a host that dispatches from several
/// threads wraps the tracker in one lock (see `service`), which keeps each
/// player's `was_alive`/`respawn_blocked` read-modify-write atomic.
#[derive(Clone, Debug, Default)]
pub struct PlayerStateTracker {
    players: HashMap<PlayerId, PlayerRuntimeState>,
    samples: HashMap<UnitId, UnitHealthSample>,
}

impl PlayerStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_tick(&mut self, mode: DifficultyMode, world: &mut dyn WorldAccess, out: &mut Outbox) {
        let flags = policy::flags(mode);
        let players = world.players();

        for player in &players {
            let alive = player.is_alive();
            let state = self.players.entry(player.id.clone()).or_default();

            if flags.respawn_blocked_on_death {
                if state.was_alive && !alive && !state.respawn_blocked {
                    trigger_permadeath(player, state, mode, out);
                }
                if state.respawn_blocked {
                    out.now(HostCommand::ForceRespawnTimer {
                        player_id: player.id.clone(),
                        value: 0.0,
                    });
                    if player.unit.is_some() {
                        out.post(HostCommand::ClearUnit {
                            player_id: player.id.clone(),
                        });
                    }
                }
            }

            // Unconditional so a unit we cleared ourselves never reads as a fresh death.
            state.was_alive = alive;
            if player.unit.is_some() {
                state.last_unit = player.unit;
            }
        }

        if let Some(cap) = flags.health_cap {
            cap_health(world, cap);
        }

        if flags.amplifies_damage() {
            self.amplify_damage(&players, &flags, world, out);
        } else if !self.samples.is_empty() {
            self.samples.clear();
        }
    }

    fn amplify_damage(
        &mut self,
        players: &[PlayerSample],
        flags: &DifficultyFlags,
        world: &mut dyn WorldAccess,
        out: &mut Outbox,
    ) {
        let mut sampled = HashSet::new();
        for player in players {
            let Some(state) = self.players.get(&player.id) else {
                continue;
            };
            let unit = match player.unit {
                Some(unit) if !state.respawn_blocked && player.is_alive() => unit,
                _ => {
                    if let Some(stale) = state.last_unit {
                        self.samples.remove(&stale);
                    }
                    continue;
                }
            };
            let Some(pool) = world.unit_health(unit) else {
                continue;
            };

            let mut health = pool.health;
            if let Some(sample) = self.samples.get(&unit) {
                if health < sample.last_health {
                    health = amplified_health(sample.last_health, health, flags.health_multiplier);
                    debug!(
                        player = %player.id,
                        %unit,
                        before = sample.last_health,
                        observed = pool.health,
                        after = health,
                        "[permadeath] damage amplified"
                    );
                    if let Err(error) = world.set_unit_health(unit, pool.with_health(health)) {
                        warn!(%error, %unit, "[permadeath] could not write amplified health");
                    }
                    if health <= 0.0 {
                        out.now(HostCommand::DestroyUnit { unit_id: unit });
                    }
                }
            }
            self.samples.insert(
                unit,
                UnitHealthSample {
                    last_health: health,
                },
            );
            sampled.insert(unit);
        }

        // Anything not refreshed this tick belongs to a unit we no longer track.
        self.samples.retain(|unit, _| sampled.contains(unit));
    }

    pub fn on_unit_changed(
        &mut self,
        mode: DifficultyMode,
        player_id: &PlayerId,
        unit: Option<UnitId>,
        out: &mut Outbox,
    ) {
        if mode.is_normal() {
            return;
        }
        let Some(unit) = unit else {
            return;
        };
        let Some(state) = self.players.get(player_id) else {
            return;
        };
        if !state.respawn_blocked {
            return;
        }

        info!(player = %player_id, %unit, "[permadeath] respawn attempt blocked");
        out.post(HostCommand::ClearUnit {
            player_id: player_id.clone(),
        });
        out.now(HostCommand::NotifyPlayer {
            player_id: player_id.clone(),
            message: MessageKey::RespawnBlocked,
        });
    }

    pub fn on_player_join(&mut self, player_id: &PlayerId, out: &mut Outbox) {
        if let Some(previous) = self.players.insert(player_id.clone(), PlayerRuntimeState::default())
        {
            if let Some(stale) = previous.last_unit {
                self.samples.remove(&stale);
            }
        }
        out.now(HostCommand::ForceRespawnTimer {
            player_id: player_id.clone(),
            value: 0.0,
        });
        out.post(HostCommand::ClearUnit {
            player_id: player_id.clone(),
        });
    }

    pub fn on_player_leave(&mut self, player_id: &PlayerId) {
        if let Some(state) = self.players.remove(player_id) {
            if let Some(stale) = state.last_unit {
                self.samples.remove(&stale);
            }
        }
    }

    pub fn on_world_reload(&mut self, out: &mut Outbox) {
        self.samples.clear();
        out.request_reset();
    }

    pub fn on_return_to_menu(&mut self, out: &mut Outbox) {
        self.samples.clear();
        out.request_reset();
    }

    /// Drops all player records and samples, zeroing every connected player's respawn timer.
    pub fn reset_all(&mut self, connected: &[PlayerSample], out: &mut Outbox) {
        self.players.clear();
        self.samples.clear();
        for player in connected {
            out.now(HostCommand::ForceRespawnTimer {
                player_id: player.id.clone(),
                value: 0.0,
            });
        }
        info!("[permadeath] internal player state cleared");
    }

    pub fn state(&self, player_id: &PlayerId) -> Option<&PlayerRuntimeState> {
        self.players.get(player_id)
    }

    pub fn sample(&self, unit: UnitId) -> Option<&UnitHealthSample> {
        self.samples.get(&unit)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        let mut players: Vec<PlayerRecordView> = self
            .players
            .iter()
            .map(|(id, state)| PlayerRecordView {
                id: id.clone(),
                was_alive: state.was_alive,
                respawn_blocked: state.respawn_blocked,
                death_count: state.death_count,
            })
            .collect();
        players.sort_by(|a, b| a.id.cmp(&b.id));
        TrackerSnapshot {
            players,
            health_samples: self.samples.len(),
        }
    }
}

fn trigger_permadeath(
    player: &PlayerSample,
    state: &mut PlayerRuntimeState,
    mode: DifficultyMode,
    out: &mut Outbox,
) {
    state.death_count = state.death_count.saturating_add(1);
    state.respawn_blocked = true;
    info!(
        player = %player.id,
        name = %player.name,
        deaths = state.death_count,
        %mode,
        "[permadeath] player died"
    );

    out.now(HostCommand::ForceRespawnTimer {
        player_id: player.id.clone(),
        value: 0.0,
    });
    out.now(HostCommand::NotifyPlayer {
        player_id: player.id.clone(),
        message: MessageKey::Permadeath,
    });
    out.post(HostCommand::ShowDeathScreen);
}

fn cap_health(world: &mut dyn WorldAccess, cap: f32) {
    for unit in world.player_units() {
        let Some(pool) = world.unit_health(unit) else {
            continue;
        };
        let capped = pool.capped(cap);
        if capped != pool {
            if let Err(error) = world.set_unit_health(unit, capped) {
                warn!(%error, %unit, "[permadeath] could not cap unit health");
            }
        }
    }

    for structure in world.structures() {
        if !is_core_block(&structure.block) {
            continue;
        }
        let Some(pool) = world.structure_health(structure.id) else {
            continue;
        };
        let capped = pool.capped(cap);
        if capped != pool {
            if let Err(error) = world.set_structure_health(structure.id, capped) {
                warn!(%error, block = %structure.block, "[permadeath] could not cap core health");
            }
        }
    }
}

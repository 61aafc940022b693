use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::host::{CommandSink, HostError, ProgressView, WorldAccess};
use crate::types::{
    GameState, HealthPool, HostCommand, MessageKey, PlayerId, PlayerSample, SectorRef,
    StructureId, StructureSample, UnitId,
};

/// Frames a player waits before the sandbox lets them respawn.
pub const SANDBOX_RESPAWN_FRAMES: f32 = 60.0;

#[derive(Clone, Debug)]
pub struct SandboxPlayer {
    pub id: PlayerId,
    pub name: String,
    pub unit: Option<UnitId>,
    pub dead: bool,
    pub respawn_timer: f32,
    pub inbox: Vec<MessageKey>,
}

#[derive(Clone, Debug)]
pub struct SandboxUnit {
    pub owner: Option<PlayerId>,
    pub pool: HealthPool,
}

#[derive(Clone, Debug)]
pub struct SandboxStructure {
    pub block: String,
    pub pool: HealthPool,
}

/// In-memory host used by the simulator and the tests.
///
/// Applies every [`HostCommand`] to its own world and progress state and keeps
/// a log of what it was asked to do.
#[derive(Clone, Debug, Default)]
pub struct SandboxHost {
    players: BTreeMap<PlayerId, SandboxPlayer>,
    units: BTreeMap<UnitId, SandboxUnit>,
    structures: BTreeMap<StructureId, SandboxStructure>,
    unlocked: BTreeSet<String>,
    campaign_active: bool,
    loadout_info: bool,
    active_sector: Option<SectorRef>,
    known_sectors: BTreeSet<SectorRef>,
    sector_info: BTreeSet<SectorRef>,
    current_save: Option<String>,
    game_state: GameState,
    dialogs: Vec<HostCommand>,
    executed: Vec<HostCommand>,
    next_unit_id: u32,
    next_structure_id: u32,
}

impl SandboxHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, id: &str, name: &str) -> PlayerId {
        let player_id = PlayerId::from(id);
        self.players.insert(
            player_id.clone(),
            SandboxPlayer {
                id: player_id.clone(),
                name: name.to_string(),
                unit: None,
                dead: false,
                respawn_timer: 0.0,
                inbox: Vec::new(),
            },
        );
        player_id
    }

    pub fn disconnect(&mut self, player_id: &PlayerId) -> bool {
        let Some(player) = self.players.remove(player_id) else {
            return false;
        };
        if let Some(unit) = player.unit {
            self.units.remove(&unit);
        }
        true
    }

    /// Spawns a fresh unit for the player regardless of its respawn timer.
    pub fn spawn_unit(&mut self, player_id: &PlayerId, max_health: f32) -> Option<UnitId> {
        let player = self.players.get_mut(player_id)?;
        self.next_unit_id += 1;
        let unit = UnitId(self.next_unit_id);
        if let Some(previous) = player.unit.replace(unit) {
            self.units.remove(&previous);
        }
        player.dead = false;
        self.units.insert(
            unit,
            SandboxUnit {
                owner: Some(player_id.clone()),
                pool: HealthPool::new(max_health, max_health),
            },
        );
        Some(unit)
    }

    /// Respawns the player if it has no unit and its timer has run out.
    pub fn try_respawn(&mut self, player_id: &PlayerId, max_health: f32) -> Option<UnitId> {
        let player = self.players.get(player_id)?;
        if player.unit.is_some() || player.respawn_timer > 0.0 {
            return None;
        }
        self.spawn_unit(player_id, max_health)
    }

    /// Counts every respawn timer down by one frame.
    pub fn tick_timers(&mut self) {
        for player in self.players.values_mut() {
            player.respawn_timer = (player.respawn_timer - 1.0).max(0.0);
        }
    }

    /// Applies raw damage, killing the unit at zero. Returns the resulting health.
    pub fn damage_unit(&mut self, unit: UnitId, amount: f32) -> Option<f32> {
        let entry = self.units.get_mut(&unit)?;
        entry.pool.health -= amount;
        let health = entry.pool.health;
        if health <= 0.0 {
            self.kill_unit(unit);
        }
        Some(health)
    }

    pub fn kill_player(&mut self, player_id: &PlayerId) -> bool {
        match self.players.get(player_id).and_then(|player| player.unit) {
            Some(unit) => self.kill_unit(unit),
            None => false,
        }
    }

    fn kill_unit(&mut self, unit: UnitId) -> bool {
        let Some(removed) = self.units.remove(&unit) else {
            return false;
        };
        if let Some(player) = removed
            .owner
            .as_ref()
            .and_then(|owner| self.players.get_mut(owner))
        {
            if player.unit == Some(unit) {
                player.unit = None;
                player.dead = true;
                player.respawn_timer = SANDBOX_RESPAWN_FRAMES;
            }
        }
        true
    }

    pub fn add_structure(&mut self, block: &str, max_health: f32) -> StructureId {
        self.next_structure_id += 1;
        let id = StructureId(self.next_structure_id);
        self.structures.insert(
            id,
            SandboxStructure {
                block: block.to_string(),
                pool: HealthPool::new(max_health, max_health),
            },
        );
        id
    }

    pub fn unlock(&mut self, content: &str) {
        self.unlocked.insert(content.to_string());
    }

    /// Starts a campaign in `sector`, with loadout info and a save.
    pub fn start_campaign(&mut self, sector: SectorRef, save_name: &str) {
        self.campaign_active = true;
        self.loadout_info = true;
        self.known_sectors.insert(sector.clone());
        self.sector_info.insert(sector.clone());
        self.active_sector = Some(sector);
        self.current_save = Some(save_name.to_string());
        self.game_state = GameState::Playing;
    }

    pub fn discover_sector(&mut self, sector: SectorRef) {
        self.known_sectors.insert(sector.clone());
        self.sector_info.insert(sector);
    }

    pub fn player(&self, player_id: &PlayerId) -> Option<&SandboxPlayer> {
        self.players.get(player_id)
    }

    pub fn unit(&self, unit: UnitId) -> Option<&SandboxUnit> {
        self.units.get(&unit)
    }

    pub fn unlocked_count(&self) -> usize {
        self.unlocked.len()
    }

    pub fn has_loadout_info(&self) -> bool {
        self.loadout_info
    }

    pub fn sectors_with_info(&self) -> usize {
        self.sector_info.len()
    }

    pub fn current_save(&self) -> Option<&str> {
        self.current_save.as_deref()
    }

    pub fn game_state(&self) -> GameState {
        self.game_state
    }

    /// Screens and dialogs the core asked the host to show, oldest first.
    pub fn dialogs(&self) -> &[HostCommand] {
        &self.dialogs
    }

    pub fn take_dialogs(&mut self) -> Vec<HostCommand> {
        std::mem::take(&mut self.dialogs)
    }

    pub fn executed(&self) -> &[HostCommand] {
        &self.executed
    }

    fn player_mut(&mut self, player_id: &PlayerId) -> Result<&mut SandboxPlayer, HostError> {
        self.players
            .get_mut(player_id)
            .ok_or_else(|| HostError::PlayerGone(player_id.clone()))
    }
}

impl WorldAccess for SandboxHost {
    fn players(&self) -> Vec<PlayerSample> {
        self.players
            .values()
            .map(|player| PlayerSample {
                id: player.id.clone(),
                name: player.name.clone(),
                unit: player.unit,
                dead: player.dead,
            })
            .collect()
    }

    fn player_units(&self) -> Vec<UnitId> {
        self.units
            .iter()
            .filter(|(_, unit)| unit.owner.is_some())
            .map(|(id, _)| *id)
            .collect()
    }

    fn structures(&self) -> Vec<StructureSample> {
        self.structures
            .iter()
            .map(|(id, structure)| StructureSample {
                id: *id,
                block: structure.block.clone(),
            })
            .collect()
    }

    fn unit_health(&self, unit: UnitId) -> Option<HealthPool> {
        self.units.get(&unit).map(|entry| entry.pool)
    }

    fn set_unit_health(&mut self, unit: UnitId, pool: HealthPool) -> Result<(), HostError> {
        let entry = self.units.get_mut(&unit).ok_or(HostError::UnitGone(unit))?;
        entry.pool = pool;
        Ok(())
    }

    fn structure_health(&self, structure: StructureId) -> Option<HealthPool> {
        self.structures.get(&structure).map(|entry| entry.pool)
    }

    fn set_structure_health(
        &mut self,
        structure: StructureId,
        pool: HealthPool,
    ) -> Result<(), HostError> {
        let entry = self
            .structures
            .get_mut(&structure)
            .ok_or(HostError::StructureGone(structure))?;
        entry.pool = pool;
        Ok(())
    }
}

impl CommandSink for SandboxHost {
    fn execute(&mut self, command: &HostCommand) -> Result<(), HostError> {
        debug!(?command, "[sandbox] execute");
        match command {
            HostCommand::ForceRespawnTimer { player_id, value } => {
                self.player_mut(player_id)?.respawn_timer = *value;
            }
            HostCommand::ClearUnit { player_id } => {
                let player = self.player_mut(player_id)?;
                let unit = player.unit.take();
                if unit.is_some() {
                    player.dead = true;
                }
                if let Some(unit) = unit {
                    self.units.remove(&unit);
                }
            }
            HostCommand::DestroyUnit { unit_id } => {
                if !self.kill_unit(*unit_id) {
                    return Err(HostError::UnitGone(*unit_id));
                }
            }
            HostCommand::NotifyPlayer { player_id, message } => {
                self.player_mut(player_id)?.inbox.push(*message);
            }
            HostCommand::ShowInfo { .. }
            | HostCommand::ShowDeathScreen
            | HostCommand::ShowComplexityWarning
            | HostCommand::ShowDifficultyDialog => {
                self.dialogs.push(command.clone());
            }
            HostCommand::RequestGameState { state } => {
                self.game_state = *state;
                if *state == GameState::Menu {
                    self.campaign_active = false;
                    self.active_sector = None;
                }
            }
            HostCommand::ClearAllUnlocks => self.unlocked.clear(),
            HostCommand::ClearLoadoutInfo => self.loadout_info = false,
            HostCommand::DeleteCurrentSave => self.current_save = None,
            HostCommand::ClearSectorInfo { sector } => {
                self.sector_info.remove(sector);
            }
        }
        self.executed.push(command.clone());
        Ok(())
    }
}

impl ProgressView for SandboxHost {
    fn campaign_active(&self) -> bool {
        self.campaign_active
    }

    fn active_sector(&self) -> Option<SectorRef> {
        self.active_sector.clone()
    }

    fn has_current_save(&self) -> bool {
        self.current_save.is_some()
    }

    fn known_sectors(&self) -> Vec<SectorRef> {
        self.known_sectors.iter().cloned().collect()
    }
}

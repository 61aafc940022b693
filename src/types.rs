use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Transient host unit id. Invalidated whenever the owning unit changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructureId(pub u32);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectorRef {
    pub planet: String,
    pub sector: u32,
}

impl fmt::Display for SectorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.planet, self.sector)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyMode {
    #[default]
    Normal,
    Hardcore,
    Ultra,
    Death,
}

impl DifficultyMode {
    pub const ALL: [DifficultyMode; 4] = [Self::Normal, Self::Hardcore, Self::Ultra, Self::Death];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "normal" => Some(Self::Normal),
            "hardcore" => Some(Self::Hardcore),
            "ultra" => Some(Self::Ultra),
            "death" => Some(Self::Death),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Hardcore => "hardcore",
            Self::Ultra => "ultra",
            Self::Death => "death",
        }
    }

    pub fn is_normal(self) -> bool {
        self == Self::Normal
    }
}

impl fmt::Display for DifficultyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DifficultyFlags {
    #[serde(rename = "respawnBlockedOnDeath")]
    pub respawn_blocked_on_death: bool,
    #[serde(rename = "healthMultiplier")]
    pub health_multiplier: f32,
    #[serde(rename = "forcesSaveDeletion")]
    pub forces_save_deletion: bool,
    #[serde(rename = "healthCap")]
    pub health_cap: Option<f32>,
}

impl DifficultyFlags {
    pub fn amplifies_damage(&self) -> bool {
        self.health_multiplier > 1.0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlayerRuntimeState {
    pub was_alive: bool,
    pub respawn_blocked: bool,
    pub death_count: u32,
    pub last_unit: Option<UnitId>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitHealthSample {
    pub last_health: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthPool {
    pub health: f32,
    #[serde(rename = "maxHealth")]
    pub max_health: f32,
}

impl HealthPool {
    pub fn new(health: f32, max_health: f32) -> Self {
        Self { health, max_health }
    }

    pub fn with_health(self, health: f32) -> Self {
        Self { health, ..self }
    }

    pub fn capped(self, cap: f32) -> Self {
        Self {
            health: self.health.min(cap),
            max_health: cap,
        }
    }
}

/// A connected player as the host sees it at the start of a tick.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerSample {
    pub id: PlayerId,
    pub name: String,
    pub unit: Option<UnitId>,
    pub dead: bool,
}

impl PlayerSample {
    pub fn is_alive(&self) -> bool {
        self.unit.is_some() && !self.dead
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructureSample {
    pub id: StructureId,
    pub block: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    #[default]
    Menu,
    Playing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKey {
    Permadeath,
    RespawnBlocked,
    DeathModeUnlocked,
}

/// Fire-and-forget requests from the core to the host.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostCommand {
    ForceRespawnTimer {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        value: f32,
    },
    ClearUnit {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
    },
    DestroyUnit {
        #[serde(rename = "unitId")]
        unit_id: UnitId,
    },
    NotifyPlayer {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        message: MessageKey,
    },
    ShowInfo {
        message: MessageKey,
    },
    ShowDeathScreen,
    ShowComplexityWarning,
    ShowDifficultyDialog,
    RequestGameState {
        state: GameState,
    },
    ClearAllUnlocks,
    ClearLoadoutInfo,
    DeleteCurrentSave,
    ClearSectorInfo {
        sector: SectorRef,
    },
}

/// Signals the host's simulation delivers to the core.
#[derive(Clone, Debug, PartialEq)]
pub enum WorldEvent {
    Tick,
    UnitChanged {
        player_id: PlayerId,
        unit: Option<UnitId>,
    },
    PlayerJoin {
        player_id: PlayerId,
    },
    PlayerLeave {
        player_id: PlayerId,
    },
    WorldLoad,
    StateChanged {
        state: GameState,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlayerRecordView {
    pub id: PlayerId,
    #[serde(rename = "wasAlive")]
    pub was_alive: bool,
    #[serde(rename = "respawnBlocked")]
    pub respawn_blocked: bool,
    #[serde(rename = "deathCount")]
    pub death_count: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TrackerSnapshot {
    pub players: Vec<PlayerRecordView>,
    #[serde(rename = "healthSamples")]
    pub health_samples: usize,
}

impl TrackerSnapshot {
    pub fn player(&self, id: &str) -> Option<&PlayerRecordView> {
        self.players.iter().find(|player| player.id.as_str() == id)
    }
}

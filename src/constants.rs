use crate::types::DifficultyMode;

pub const TICK_RATE: u32 = 60;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;

pub const KEY_DIFFICULTY_MODE: &str = "ot-difficulty-mode";
pub const KEY_DELETE_SAVES: &str = "ot-delete-saves";
pub const KEY_WARNING_SHOWN: &str = "ot-warning-shown";
pub const KEY_DEATH_UNLOCKED: &str = "ot-death-unlocked";

pub const SETTINGS_FILE_VERSION: u8 = 1;
pub const DEFAULT_SETTINGS_PATH: &str = ".data/onetry-settings.json";

/// Loss amplification applied to every observed health decrease in Ultra and Death.
pub const DAMAGE_AMPLIFICATION: f32 = 100.0;
/// Health and max-health ceiling enforced every tick in Death.
pub const DEATH_MODE_HEALTH_CAP: f32 = 1.0;
/// Structures whose block name contains this fragment are treated as cores.
pub const CORE_BLOCK_FRAGMENT: &str = "core";

pub const DEATH_UNLOCK_TAPS: u32 = 10;

pub const MENU_RETURN_DELAY_FRAMES: u64 = 5;
pub const DIFFICULTY_DIALOG_DELAY_FRAMES: u64 = 2;

pub fn default_mode() -> DifficultyMode {
    DifficultyMode::Normal
}

pub fn is_core_block(block_name: &str) -> bool {
    block_name.contains(CORE_BLOCK_FRAGMENT)
}

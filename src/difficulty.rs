use thiserror::Error;
use tracing::info;

use crate::constants::DEATH_UNLOCK_TAPS;
use crate::policy;
use crate::settings::{DifficultySettings, SettingsError, SettingsStore};
use crate::types::DifficultyMode;

#[derive(Debug, Error)]
pub enum DifficultyError {
    #[error("death mode has not been unlocked")]
    DeathLocked,
    #[error("delete-saves is forced on while {0} is active")]
    DeleteSavesForced(DifficultyMode),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TapOutcome {
    Counted(u32),
    DeathUnlocked,
    /// Death is already unlocked; taps no longer count.
    Ignored,
}

/// User-driven mode changes, including the hidden Death unlock.
#[derive(Clone, Debug, Default)]
pub struct DifficultySelector {
    ultra_taps: u32,
}

impl DifficultySelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ultra_taps(&self) -> u32 {
        self.ultra_taps
    }

    pub fn select<S: SettingsStore>(
        &mut self,
        settings: &mut DifficultySettings<S>,
        mode: DifficultyMode,
    ) -> Result<(), DifficultyError> {
        if mode == DifficultyMode::Death && !settings.death_unlocked() {
            return Err(DifficultyError::DeathLocked);
        }
        self.ultra_taps = 0;
        apply_mode(settings, mode);
        settings.flush()?;
        info!(%mode, delete_saves = settings.delete_saves(), "[difficulty] mode selected");
        Ok(())
    }

    /// One activation of the Ultra selector. The tenth consecutive one while
    /// Death is locked unlocks it and switches to it.
    pub fn tap_ultra<S: SettingsStore>(
        &mut self,
        settings: &mut DifficultySettings<S>,
    ) -> Result<TapOutcome, DifficultyError> {
        if settings.death_unlocked() {
            return Ok(TapOutcome::Ignored);
        }
        self.ultra_taps += 1;
        if self.ultra_taps < DEATH_UNLOCK_TAPS {
            return Ok(TapOutcome::Counted(self.ultra_taps));
        }

        self.ultra_taps = 0;
        settings.unlock_death_mode();
        apply_mode(settings, DifficultyMode::Death);
        settings.flush()?;
        info!("[difficulty] death mode unlocked");
        Ok(TapOutcome::DeathUnlocked)
    }

    /// The user toggle. Disabled while the mode forces deletion.
    pub fn set_delete_saves<S: SettingsStore>(
        &mut self,
        settings: &mut DifficultySettings<S>,
        value: bool,
    ) -> Result<(), DifficultyError> {
        let mode = settings.mode();
        if policy::flags(mode).forces_save_deletion {
            return Err(DifficultyError::DeleteSavesForced(mode));
        }
        settings.set_delete_saves(value);
        settings.flush()?;
        Ok(())
    }
}

fn apply_mode<S: SettingsStore>(settings: &mut DifficultySettings<S>, mode: DifficultyMode) {
    settings.set_mode(mode);
    if policy::flags(mode).forces_save_deletion {
        settings.set_delete_saves(true);
    } else if mode.is_normal() {
        settings.set_delete_saves(false);
    }
}

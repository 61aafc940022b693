use crate::constants::{DAMAGE_AMPLIFICATION, DEATH_MODE_HEALTH_CAP};
use crate::types::{DifficultyFlags, DifficultyMode};

pub fn flags(mode: DifficultyMode) -> DifficultyFlags {
    match mode {
        DifficultyMode::Normal => DifficultyFlags {
            respawn_blocked_on_death: false,
            health_multiplier: 1.0,
            forces_save_deletion: false,
            health_cap: None,
        },
        DifficultyMode::Hardcore => DifficultyFlags {
            respawn_blocked_on_death: true,
            health_multiplier: 1.0,
            forces_save_deletion: false,
            health_cap: None,
        },
        DifficultyMode::Ultra => DifficultyFlags {
            respawn_blocked_on_death: true,
            health_multiplier: DAMAGE_AMPLIFICATION,
            forces_save_deletion: true,
            health_cap: None,
        },
        DifficultyMode::Death => DifficultyFlags {
            respawn_blocked_on_death: true,
            health_multiplier: DAMAGE_AMPLIFICATION,
            forces_save_deletion: true,
            health_cap: Some(DEATH_MODE_HEALTH_CAP),
        },
    }
}

/// Resolves a persisted mode string. Only an exact mode name counts; anything
/// else, padded or re-cased names included, is Normal.
pub fn mode_from_persisted(raw: &str) -> DifficultyMode {
    DifficultyMode::parse(raw).unwrap_or(DifficultyMode::Normal)
}

/// Health after amplifying a drop from `previous` to `current`.
pub fn amplified_health(previous: f32, current: f32, multiplier: f32) -> f32 {
    if current >= previous {
        return current;
    }
    let loss = previous - current;
    previous - loss * multiplier
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_is_lenient() {
        let normal = flags(DifficultyMode::Normal);
        assert!(!normal.respawn_blocked_on_death);
        assert!(!normal.forces_save_deletion);
        assert!(!normal.amplifies_damage());
        assert_eq!(normal.health_cap, None);
    }

    #[test]
    fn every_non_normal_mode_blocks_respawn() {
        for mode in [
            DifficultyMode::Hardcore,
            DifficultyMode::Ultra,
            DifficultyMode::Death,
        ] {
            assert!(flags(mode).respawn_blocked_on_death, "{mode}");
        }
    }

    #[test]
    fn only_ultra_and_death_amplify_and_force_deletion() {
        assert_eq!(flags(DifficultyMode::Hardcore).health_multiplier, 1.0);
        assert!(!flags(DifficultyMode::Hardcore).forces_save_deletion);
        for mode in [DifficultyMode::Ultra, DifficultyMode::Death] {
            assert_eq!(flags(mode).health_multiplier, 100.0);
            assert!(flags(mode).forces_save_deletion);
        }
        assert_eq!(flags(DifficultyMode::Death).health_cap, Some(1.0));
        assert_eq!(flags(DifficultyMode::Ultra).health_cap, None);
    }

    #[test]
    fn corrupted_mode_fails_closed_as_normal() {
        assert_eq!(mode_from_persisted("ultra"), DifficultyMode::Ultra);
        assert_eq!(mode_from_persisted(" death "), DifficultyMode::Normal);
        assert_eq!(mode_from_persisted("death\n"), DifficultyMode::Normal);
        assert_eq!(mode_from_persisted("\tultra "), DifficultyMode::Normal);
        assert_eq!(mode_from_persisted("DEATH"), DifficultyMode::Normal);
        assert_eq!(mode_from_persisted(""), DifficultyMode::Normal);
        assert_eq!(mode_from_persisted("\u{0}garbage"), DifficultyMode::Normal);
    }

    #[test]
    fn amplified_health_subtracts_scaled_loss_from_previous() {
        assert_eq!(amplified_health(200.0, 199.0, 100.0), 100.0);
        assert_eq!(amplified_health(50.0, 49.0, 100.0), -50.0);
        assert_eq!(amplified_health(50.0, 60.0, 100.0), 60.0);
        assert_eq!(amplified_health(50.0, 50.0, 100.0), 50.0);
    }
}

use serde::Serialize;
use tracing::info;

use crate::host::ProgressView;
use crate::policy;
use crate::scheduler::Outbox;
use crate::types::{DifficultyMode, HostCommand, SectorRef};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WipeTrigger {
    Mode,
    DeleteSavesFlag,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WipeReport {
    pub trigger: WipeTrigger,
    pub mode: DifficultyMode,
    #[serde(rename = "loadoutCleared")]
    pub loadout_cleared: bool,
    #[serde(rename = "activeSector")]
    pub active_sector: Option<SectorRef>,
    #[serde(rename = "saveDeleted")]
    pub save_deleted: bool,
    #[serde(rename = "sectorsCleared")]
    pub sectors_cleared: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WipeResult {
    Skipped,
    Wiped(WipeReport),
}

impl WipeResult {
    pub fn occurred(&self) -> bool {
        matches!(self, Self::Wiped(_))
    }
}

pub fn wipe_trigger(mode: DifficultyMode, delete_saves: bool) -> Option<WipeTrigger> {
    if policy::flags(mode).forces_save_deletion {
        Some(WipeTrigger::Mode)
    } else if delete_saves {
        Some(WipeTrigger::DeleteSavesFlag)
    } else {
        None
    }
}

/// Irreversible progress wipe. Holds no state of its own and every clearing
/// command is idempotent on the host side, so wiping an already-empty profile
/// leaves everything as it was.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProgressWipeCoordinator;

impl ProgressWipeCoordinator {
    pub fn new() -> Self {
        Self
    }

    pub fn maybe_wipe(
        &self,
        mode: DifficultyMode,
        delete_saves: bool,
        progress: &dyn ProgressView,
        out: &mut Outbox,
    ) -> WipeResult {
        let Some(trigger) = wipe_trigger(mode, delete_saves) else {
            return WipeResult::Skipped;
        };

        out.post(HostCommand::ClearAllUnlocks);

        let loadout_cleared = progress.campaign_active();
        if loadout_cleared {
            out.post(HostCommand::ClearLoadoutInfo);
        }

        let active_sector = progress.active_sector();
        if let Some(sector) = active_sector.clone() {
            out.post(HostCommand::ClearSectorInfo { sector });
        }

        let save_deleted = progress.has_current_save();
        if save_deleted {
            out.post(HostCommand::DeleteCurrentSave);
        }

        let sectors = progress.known_sectors();
        let sectors_cleared = sectors.len();
        for sector in sectors {
            out.post(HostCommand::ClearSectorInfo { sector });
        }

        out.request_reset();

        info!(
            ?trigger,
            %mode,
            loadout_cleared,
            save_deleted,
            sectors_cleared,
            "[wipe] progress has been wiped"
        );
        WipeResult::Wiped(WipeReport {
            trigger,
            mode,
            loadout_cleared,
            active_sector,
            save_deleted,
            sectors_cleared,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::DeferredTask;

    struct Progress {
        campaign: bool,
        active: Option<SectorRef>,
        save: bool,
        sectors: Vec<SectorRef>,
    }

    impl ProgressView for Progress {
        fn campaign_active(&self) -> bool {
            self.campaign
        }

        fn active_sector(&self) -> Option<SectorRef> {
            self.active.clone()
        }

        fn has_current_save(&self) -> bool {
            self.save
        }

        fn known_sectors(&self) -> Vec<SectorRef> {
            self.sectors.clone()
        }
    }

    fn sector(planet: &str, id: u32) -> SectorRef {
        SectorRef {
            planet: planet.to_string(),
            sector: id,
        }
    }

    #[test]
    fn trigger_follows_mode_then_flag() {
        assert_eq!(wipe_trigger(DifficultyMode::Normal, false), None);
        assert_eq!(wipe_trigger(DifficultyMode::Hardcore, false), None);
        assert_eq!(
            wipe_trigger(DifficultyMode::Hardcore, true),
            Some(WipeTrigger::DeleteSavesFlag)
        );
        assert_eq!(
            wipe_trigger(DifficultyMode::Normal, true),
            Some(WipeTrigger::DeleteSavesFlag)
        );
        assert_eq!(
            wipe_trigger(DifficultyMode::Ultra, false),
            Some(WipeTrigger::Mode)
        );
        assert_eq!(
            wipe_trigger(DifficultyMode::Death, true),
            Some(WipeTrigger::Mode)
        );
    }

    #[test]
    fn skipped_wipe_posts_nothing() {
        let progress = Progress {
            campaign: true,
            active: Some(sector("serpulo", 15)),
            save: true,
            sectors: vec![sector("serpulo", 15)],
        };
        let coordinator = ProgressWipeCoordinator::new();
        let mut out = Outbox::new();
        let result = coordinator.maybe_wipe(DifficultyMode::Hardcore, false, &progress, &mut out);
        assert_eq!(result, WipeResult::Skipped);
        assert!(out.is_empty());
    }

    #[test]
    fn wipe_clears_everything_known_and_requests_reset() {
        let progress = Progress {
            campaign: true,
            active: Some(sector("serpulo", 15)),
            save: true,
            sectors: vec![sector("serpulo", 15), sector("erekir", 2)],
        };
        let coordinator = ProgressWipeCoordinator::new();
        let mut out = Outbox::new();
        let result = coordinator.maybe_wipe(DifficultyMode::Ultra, false, &progress, &mut out);

        let WipeResult::Wiped(report) = result else {
            panic!("expected a wipe");
        };
        assert_eq!(report.trigger, WipeTrigger::Mode);
        assert!(report.loadout_cleared);
        assert!(report.save_deleted);
        assert_eq!(report.sectors_cleared, 2);

        let deferred = out.deferred();
        assert!(out.immediate().is_empty());
        assert_eq!(
            deferred.first(),
            Some(&DeferredTask::Command(HostCommand::ClearAllUnlocks))
        );
        assert!(deferred.contains(&DeferredTask::Command(HostCommand::DeleteCurrentSave)));
        assert!(deferred.contains(&DeferredTask::Command(HostCommand::ClearLoadoutInfo)));
        assert_eq!(deferred.last(), Some(&DeferredTask::FullReset));
    }

    #[test]
    fn repeated_wipe_posts_the_same_commands() {
        let progress = Progress {
            campaign: true,
            active: Some(sector("serpulo", 15)),
            save: true,
            sectors: vec![sector("serpulo", 15)],
        };
        let coordinator = ProgressWipeCoordinator::new();
        let mut first = Outbox::new();
        let mut second = Outbox::new();
        let a = coordinator.maybe_wipe(DifficultyMode::Death, false, &progress, &mut first);
        let b = coordinator.maybe_wipe(DifficultyMode::Death, false, &progress, &mut second);
        assert_eq!(a, b);
        assert_eq!(first.deferred(), second.deferred());
    }

    #[test]
    fn wipe_of_empty_profile_is_not_an_error() {
        let progress = Progress {
            campaign: false,
            active: None,
            save: false,
            sectors: Vec::new(),
        };
        let coordinator = ProgressWipeCoordinator::new();
        let mut out = Outbox::new();
        let result = coordinator.maybe_wipe(DifficultyMode::Normal, true, &progress, &mut out);
        assert!(result.occurred());
        assert_eq!(
            out.deferred(),
            &[
                DeferredTask::Command(HostCommand::ClearAllUnlocks),
                DeferredTask::FullReset
            ]
        );
    }
}

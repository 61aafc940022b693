use thiserror::Error;
use tracing::warn;

use crate::types::{
    HealthPool, HostCommand, PlayerId, PlayerSample, SectorRef, StructureId, StructureSample,
    UnitId,
};

/// Transient integration failures. Logged and dropped; the next tick reconciles.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("player {0} is no longer connected")]
    PlayerGone(PlayerId),
    #[error("{0} no longer exists")]
    UnitGone(UnitId),
    #[error("structure {0:?} no longer exists")]
    StructureGone(StructureId),
}

/// Entity reads and the health writes the tick is allowed to make in place.
pub trait WorldAccess {
    fn players(&self) -> Vec<PlayerSample>;
    /// Every unit currently controlled by a player.
    fn player_units(&self) -> Vec<UnitId>;
    fn structures(&self) -> Vec<StructureSample>;
    fn unit_health(&self, unit: UnitId) -> Option<HealthPool>;
    fn set_unit_health(&mut self, unit: UnitId, pool: HealthPool) -> Result<(), HostError>;
    fn structure_health(&self, structure: StructureId) -> Option<HealthPool>;
    fn set_structure_health(
        &mut self,
        structure: StructureId,
        pool: HealthPool,
    ) -> Result<(), HostError>;
}

pub trait CommandSink {
    fn execute(&mut self, command: &HostCommand) -> Result<(), HostError>;
}

/// Read side of the host's progress persistence, consulted before a wipe.
pub trait ProgressView {
    fn campaign_active(&self) -> bool;
    fn active_sector(&self) -> Option<SectorRef>;
    fn has_current_save(&self) -> bool;
    fn known_sectors(&self) -> Vec<SectorRef>;
}

pub trait Host: WorldAccess + CommandSink + ProgressView {}

impl<T: WorldAccess + CommandSink + ProgressView> Host for T {}

/// Executes a command, logging and dropping any failure.
pub fn execute_logged(sink: &mut dyn CommandSink, command: &HostCommand) -> bool {
    match sink.execute(command) {
        Ok(()) => true,
        Err(error) => {
            warn!(%error, ?command, "[host] command dropped");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakySink {
        applied: Vec<HostCommand>,
    }

    impl CommandSink for FlakySink {
        fn execute(&mut self, command: &HostCommand) -> Result<(), HostError> {
            if let HostCommand::ClearUnit { player_id } = command {
                return Err(HostError::PlayerGone(player_id.clone()));
            }
            self.applied.push(command.clone());
            Ok(())
        }
    }

    #[test]
    fn failed_commands_are_dropped_without_panicking() {
        let mut sink = FlakySink {
            applied: Vec::new(),
        };
        assert!(!execute_logged(
            &mut sink,
            &HostCommand::ClearUnit {
                player_id: PlayerId::from("gone"),
            }
        ));
        assert!(execute_logged(&mut sink, &HostCommand::ShowDeathScreen));
        assert_eq!(sink.applied, vec![HostCommand::ShowDeathScreen]);
    }
}

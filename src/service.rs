use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::constants::TICK_MS;
use crate::host::Host;
use crate::runtime::PermadeathRuntime;
use crate::settings::SettingsStore;
use crate::types::WorldEvent;
use crate::wipe::WipeResult;

/// A runtime paired with the host it drives.
pub struct Session<S: SettingsStore, H: Host> {
    pub runtime: PermadeathRuntime<S>,
    pub host: H,
}

impl<S: SettingsStore, H: Host> Session<S, H> {
    pub fn new(runtime: PermadeathRuntime<S>, host: H) -> Self {
        Self { runtime, host }
    }

    pub fn handle(&mut self, event: WorldEvent) {
        self.runtime.handle(event, &mut self.host);
    }

    pub fn run_frame(&mut self) -> usize {
        self.runtime.run_frame(&mut self.host)
    }

    /// One frame: tasks posted last frame run first, then the tick.
    pub fn step(&mut self) {
        self.run_frame();
        self.runtime.handle(WorldEvent::Tick, &mut self.host);
    }

    pub fn confirm_death(&mut self) -> WipeResult {
        self.runtime.confirm_death(&mut self.host)
    }
}

/// Every event source and the tick loop go through this one lock.
pub type SharedSession<S, H> = Arc<Mutex<Session<S, H>>>;

pub fn shared<S: SettingsStore, H: Host>(session: Session<S, H>) -> SharedSession<S, H> {
    Arc::new(Mutex::new(session))
}

pub async fn dispatch<S: SettingsStore, H: Host>(state: &SharedSession<S, H>, event: WorldEvent) {
    let mut guard = state.lock().await;
    debug!(?event, "[session] event");
    guard.handle(event);
}

/// Steps the session once every `TICK_MS`.
pub fn start_tick_loop<S, H>(state: SharedSession<S, H>) -> JoinHandle<()>
where
    S: SettingsStore + Send + 'static,
    H: Host + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            guard.step();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeOptions;
    use crate::sandbox::SandboxHost;
    use crate::settings::MemorySettings;
    use crate::types::{DifficultyMode, PlayerId};

    #[tokio::test]
    async fn events_from_another_task_are_serialized_with_ticks() {
        let mut runtime = PermadeathRuntime::new(MemorySettings::new(), RuntimeOptions::default())
            .expect("memory settings");
        runtime
            .select_mode(DifficultyMode::Hardcore)
            .expect("select hardcore");
        let mut host = SandboxHost::new();
        let id = host.connect("p1", "P1");
        let state = shared(Session::new(runtime, host));

        dispatch(
            &state,
            WorldEvent::PlayerJoin {
                player_id: id.clone(),
            },
        )
        .await;
        {
            let mut guard = state.lock().await;
            guard.step();
            guard.host.spawn_unit(&id, 100.0).expect("player exists");
            guard.step();
            guard.host.kill_player(&id);
            guard.step();
        }

        let ticker = start_tick_loop(state.clone());
        tokio::time::sleep(Duration::from_millis(TICK_MS * 4)).await;
        ticker.abort();

        let guard = state.lock().await;
        let record = guard
            .runtime
            .tracker()
            .state(&PlayerId::from("p1"))
            .copied()
            .expect("record kept");
        assert!(record.respawn_blocked);
        assert_eq!(record.death_count, 1);
    }
}

use tracing::info;

use crate::constants::{DIFFICULTY_DIALOG_DELAY_FRAMES, MENU_RETURN_DELAY_FRAMES};
use crate::difficulty::{DifficultyError, DifficultySelector, TapOutcome};
use crate::host::{execute_logged, CommandSink, Host};
use crate::policy;
use crate::scheduler::{DeferredTask, FrameQueue, Outbox};
use crate::settings::{DifficultySettings, SettingsError, SettingsStore};
use crate::tracker::PlayerStateTracker;
use crate::types::{
    DifficultyFlags, DifficultyMode, GameState, HostCommand, MessageKey, WorldEvent,
};
use crate::wipe::{ProgressWipeCoordinator, WipeResult};

#[derive(Clone, Copy, Debug)]
pub struct RuntimeOptions {
    /// Frames between a confirmed death and the return to the main menu.
    pub menu_return_delay_frames: u64,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            menu_return_delay_frames: MENU_RETURN_DELAY_FRAMES,
        }
    }
}

/// Owns every piece of permadeath state for one game client and routes host
/// events into it.
///
/// Event handlers apply immediate commands before returning; everything else
/// lands in the frame queue and runs on the next [`PermadeathRuntime::run_frame`].
pub struct PermadeathRuntime<S: SettingsStore> {
    settings: DifficultySettings<S>,
    selector: DifficultySelector,
    tracker: PlayerStateTracker,
    wipe: ProgressWipeCoordinator,
    queue: FrameQueue,
    options: RuntimeOptions,
}

impl<S: SettingsStore> PermadeathRuntime<S> {
    pub fn new(store: S, options: RuntimeOptions) -> Result<Self, SettingsError> {
        let mut settings = DifficultySettings::new(store);
        settings.initialize_defaults()?;
        Ok(Self {
            settings,
            selector: DifficultySelector::new(),
            tracker: PlayerStateTracker::new(),
            wipe: ProgressWipeCoordinator::new(),
            queue: FrameQueue::new(),
            options,
        })
    }

    /// Client startup. Shows the complexity warning until it is acknowledged.
    pub fn start(&mut self) {
        let mode = self.settings.mode();
        info!(%mode, "[onetry] loaded - no respawn after death");
        if !self.settings.warning_shown() {
            self.queue
                .post(DeferredTask::Command(HostCommand::ShowComplexityWarning));
        }
    }

    pub fn acknowledge_warning(&mut self, open_settings: bool) {
        self.settings.set_warning_shown(true);
        self.settings.flush_logged();
        if open_settings {
            self.queue
                .post(DeferredTask::Command(HostCommand::ShowDifficultyDialog));
        }
    }

    pub fn handle<H: Host>(&mut self, event: WorldEvent, host: &mut H) {
        let mode = self.settings.mode();
        let mut out = Outbox::new();
        match event {
            WorldEvent::Tick => self.tracker.on_tick(mode, host, &mut out),
            WorldEvent::UnitChanged { player_id, unit } => {
                self.tracker
                    .on_unit_changed(mode, &player_id, unit, &mut out)
            }
            WorldEvent::PlayerJoin { player_id } => {
                self.tracker.on_player_join(&player_id, &mut out)
            }
            WorldEvent::PlayerLeave { player_id } => self.tracker.on_player_leave(&player_id),
            WorldEvent::WorldLoad => self.tracker.on_world_reload(&mut out),
            WorldEvent::StateChanged {
                state: GameState::Menu,
            } => self.tracker.on_return_to_menu(&mut out),
            WorldEvent::StateChanged { .. } => {}
        }
        self.dispatch(out, host);
    }

    /// Starts the next frame and runs every task that came due. Returns how many ran.
    pub fn run_frame<H: Host>(&mut self, host: &mut H) -> usize {
        let due = self.queue.advance();
        let ran = due.len();
        for task in due {
            match task {
                DeferredTask::Command(command) => {
                    execute_logged(host, &command);
                }
                DeferredTask::FullReset => {
                    let connected = host.players();
                    let mut out = Outbox::new();
                    self.tracker.reset_all(&connected, &mut out);
                    self.dispatch(out, host);
                }
                DeferredTask::ReturnToMenu => {
                    execute_logged(
                        host,
                        &HostCommand::RequestGameState {
                            state: GameState::Menu,
                        },
                    );
                    self.settings.flush_logged();
                    self.queue.post_after(
                        DIFFICULTY_DIALOG_DELAY_FRAMES,
                        DeferredTask::Command(HostCommand::ShowDifficultyDialog),
                    );
                }
            }
        }
        ran
    }

    /// Wipes progress if the active mode or the delete-saves flag calls for it.
    pub fn maybe_wipe<H: Host>(&mut self, host: &mut H) -> WipeResult {
        let mode = self.settings.mode();
        let delete_saves = self.settings.delete_saves();
        let mut out = Outbox::new();
        let result = self.wipe.maybe_wipe(mode, delete_saves, &*host, &mut out);
        if result.occurred() {
            self.settings.set_warning_shown(false);
            self.settings.flush_logged();
        }
        self.dispatch(out, host);
        result
    }

    /// The user acknowledged the death screen.
    pub fn confirm_death<H: Host>(&mut self, host: &mut H) -> WipeResult {
        let result = self.maybe_wipe(host);
        self.queue.post_after(
            self.options.menu_return_delay_frames,
            DeferredTask::ReturnToMenu,
        );
        result
    }

    pub fn select_mode(&mut self, mode: DifficultyMode) -> Result<(), DifficultyError> {
        self.selector.select(&mut self.settings, mode)
    }

    pub fn tap_ultra(&mut self) -> Result<TapOutcome, DifficultyError> {
        let outcome = self.selector.tap_ultra(&mut self.settings)?;
        if outcome == TapOutcome::DeathUnlocked {
            self.queue.post(DeferredTask::Command(HostCommand::ShowInfo {
                message: MessageKey::DeathModeUnlocked,
            }));
        }
        Ok(outcome)
    }

    pub fn set_delete_saves(&mut self, value: bool) -> Result<(), DifficultyError> {
        self.selector.set_delete_saves(&mut self.settings, value)
    }

    pub fn mode(&mut self) -> DifficultyMode {
        self.settings.mode()
    }

    pub fn flags(&mut self) -> DifficultyFlags {
        policy::flags(self.settings.mode())
    }

    pub fn tracker(&self) -> &PlayerStateTracker {
        &self.tracker
    }

    pub fn settings(&self) -> &DifficultySettings<S> {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut DifficultySettings<S> {
        &mut self.settings
    }

    pub fn frame(&self) -> u64 {
        self.queue.frame()
    }

    pub fn pending_tasks(&self) -> usize {
        self.queue.len()
    }

    pub fn reset_pending(&self) -> bool {
        self.queue.has_pending_reset()
    }

    fn dispatch(&mut self, out: Outbox, sink: &mut dyn CommandSink) {
        let (immediate, deferred) = out.into_parts();
        for command in &immediate {
            execute_logged(sink, command);
        }
        for task in deferred {
            self.queue.post(task);
        }
    }
}

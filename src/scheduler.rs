use std::collections::VecDeque;

use crate::types::HostCommand;

#[derive(Clone, Debug, PartialEq)]
pub enum DeferredTask {
    Command(HostCommand),
    /// Drop every player record and health sample.
    FullReset,
    /// Leave the match after a confirmed death.
    ReturnToMenu,
}

/// Side effects collected while handling one event.
///
/// `immediate` commands are applied as soon as the handler returns. `deferred`
/// tasks are queued for the next frame so the host never sees its own entity
/// state mutated from inside an event callback.
#[derive(Clone, Debug, Default)]
pub struct Outbox {
    immediate: Vec<HostCommand>,
    deferred: Vec<DeferredTask>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&mut self, command: HostCommand) {
        self.immediate.push(command);
    }

    pub fn post(&mut self, command: HostCommand) {
        self.deferred.push(DeferredTask::Command(command));
    }

    pub fn post_task(&mut self, task: DeferredTask) {
        self.deferred.push(task);
    }

    pub fn request_reset(&mut self) {
        self.post_task(DeferredTask::FullReset);
    }

    pub fn immediate(&self) -> &[HostCommand] {
        &self.immediate
    }

    pub fn deferred(&self) -> &[DeferredTask] {
        &self.deferred
    }

    pub fn is_empty(&self) -> bool {
        self.immediate.is_empty() && self.deferred.is_empty()
    }

    pub fn into_parts(self) -> (Vec<HostCommand>, Vec<DeferredTask>) {
        (self.immediate, self.deferred)
    }
}

#[derive(Clone, Debug)]
struct Scheduled {
    due_frame: u64,
    task: DeferredTask,
}

/// Post-to-next-frame task queue, drained once per scheduling quantum.
#[derive(Clone, Debug, Default)]
pub struct FrameQueue {
    frame: u64,
    pending: VecDeque<Scheduled>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&mut self, task: DeferredTask) -> bool {
        self.post_after(1, task)
    }

    /// Schedules `task` to run on the `frames`-th call to [`FrameQueue::advance`].
    /// A pending full reset is superseded by a newer one; returns `false` in that case.
    pub fn post_after(&mut self, frames: u64, task: DeferredTask) -> bool {
        let mut fresh = true;
        if task == DeferredTask::FullReset {
            let before = self.pending.len();
            self.pending
                .retain(|scheduled| scheduled.task != DeferredTask::FullReset);
            fresh = before == self.pending.len();
        }
        self.pending.push_back(Scheduled {
            due_frame: self.frame.saturating_add(frames.max(1)),
            task,
        });
        fresh
    }

    /// Starts the next frame and returns every task now due, in posting order.
    pub fn advance(&mut self) -> Vec<DeferredTask> {
        self.frame = self.frame.saturating_add(1);
        let mut due = Vec::new();
        let mut waiting = VecDeque::with_capacity(self.pending.len());
        for scheduled in self.pending.drain(..) {
            if scheduled.due_frame <= self.frame {
                due.push(scheduled.task);
            } else {
                waiting.push_back(scheduled);
            }
        }
        self.pending = waiting;
        due
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn has_pending_reset(&self) -> bool {
        self.pending
            .iter()
            .any(|scheduled| scheduled.task == DeferredTask::FullReset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlayerId;

    fn clear(id: &str) -> DeferredTask {
        DeferredTask::Command(HostCommand::ClearUnit {
            player_id: PlayerId::from(id),
        })
    }

    #[test]
    fn posted_tasks_run_on_the_next_frame_only() {
        let mut queue = FrameQueue::new();
        queue.post(clear("a"));
        queue.post(clear("b"));
        assert_eq!(queue.advance(), vec![clear("a"), clear("b")]);
        assert!(queue.advance().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn delayed_tasks_wait_their_frames() {
        let mut queue = FrameQueue::new();
        queue.post_after(3, DeferredTask::ReturnToMenu);
        queue.post(clear("a"));
        assert_eq!(queue.advance(), vec![clear("a")]);
        assert!(queue.advance().is_empty());
        assert_eq!(queue.advance(), vec![DeferredTask::ReturnToMenu]);
    }

    #[test]
    fn tasks_posted_while_draining_wait_for_a_later_frame() {
        let mut queue = FrameQueue::new();
        queue.post(clear("a"));
        let due = queue.advance();
        assert_eq!(due.len(), 1);
        queue.post(clear("b"));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.advance(), vec![clear("b")]);
    }

    #[test]
    fn pending_full_reset_is_superseded_not_duplicated() {
        let mut queue = FrameQueue::new();
        assert!(queue.post(DeferredTask::FullReset));
        queue.post(clear("a"));
        assert!(!queue.post(DeferredTask::FullReset));
        assert_eq!(queue.len(), 2);
        assert!(queue.has_pending_reset());

        let due = queue.advance();
        assert_eq!(due, vec![clear("a"), DeferredTask::FullReset]);
        assert!(!queue.has_pending_reset());
    }

    #[test]
    fn outbox_splits_lanes() {
        let mut outbox = Outbox::new();
        assert!(outbox.is_empty());
        outbox.now(HostCommand::ShowDeathScreen);
        outbox.request_reset();
        let (now, later) = outbox.into_parts();
        assert_eq!(now, vec![HostCommand::ShowDeathScreen]);
        assert_eq!(later, vec![DeferredTask::FullReset]);
    }
}

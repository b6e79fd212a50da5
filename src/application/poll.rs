use tokio::task::JoinHandle;

/// Owned handle to a running timer task.
///
/// Acquired when a loop starts and released exactly once: by [`PollHandle::cancel`],
/// by [`PollHandle::release`] from the task itself once it is about to finish, or
/// by `Drop` when the owner goes away. Cancel and drop abort the task, so the
/// timer can never outlive whoever holds the handle.
#[derive(Debug)]
pub struct PollHandle {
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn cancel(mut self) {
        self.abort();
    }

    /// Gives up the handle without aborting. Only meant for the task that is
    /// finishing on its own.
    pub fn release(mut self) {
        self.task.take();
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.abort();
    }
}

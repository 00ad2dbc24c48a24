use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::TutorError;
use crate::session::controller::{Collaborators, Input, SessionController, TutorState};
use crate::session::QUEUE_CAPACITY;

/// Host-facing side of a running controller.
///
/// Dropping the handle disposes the controller: a running session is torn
/// down exactly as if `stop` had been called.
pub struct SessionHandle {
    tx: mpsc::Sender<Input>,
    state: watch::Receiver<TutorState>,
    dispose: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Spawns the controller task. Must be called inside a tokio runtime.
    pub fn spawn(collaborators: Collaborators) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let (state_tx, state) = watch::channel(TutorState::default());
        let (dispose, disposed) = oneshot::channel();
        let controller = SessionController::new(collaborators, tx.clone(), state_tx);
        let task = tokio::spawn(controller.run(rx, disposed));
        Self {
            tx,
            state,
            dispose: Some(dispose),
            task: Some(task),
        }
    }

    /// Starts a session on `topic`, or the general-conversation fallback.
    /// Resolves once devices are acquired and the connection is under way.
    pub async fn start(&self, topic: Option<String>) -> Result<(), TutorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Input::Start {
                topic,
                reply: Some(reply),
            })
            .await
            .map_err(|_| TutorError::ControllerGone)?;
        rx.await.map_err(|_| TutorError::ControllerGone)?
    }

    /// Stops the running session, if any. The returned task writes the
    /// session record; await it to know the record is stored.
    pub async fn stop(&self) -> Result<Option<JoinHandle<()>>, TutorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Input::Stop { reply: Some(reply) })
            .await
            .map_err(|_| TutorError::ControllerGone)?;
        rx.await.map_err(|_| TutorError::ControllerGone)
    }

    pub fn state(&self) -> TutorState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TutorState> {
        self.state.clone()
    }

    /// Disposes the controller and waits for its teardown.
    pub async fn shutdown(mut self) {
        drop(self.dispose.take());
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("session controller task failed: {}", e);
            }
        }
    }
}

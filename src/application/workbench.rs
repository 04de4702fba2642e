//! Workbench facade hosting the controller's event loop
//!
//! The controller is single-threaded by design; this facade provides the
//! event loop that feeds it. Pump tasks push `(generation, signal)` pairs
//! into the inbox, and `translate` dispatches them to the controller in
//! delivery order, which preserves block reassembly order.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::application::controller::{StreamSignal, TranslationProgressController};
use crate::domain::events::JobUpdate;
use crate::domain::job::TranslationResult;
use crate::domain::TranslationBackend;

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// One controller plus the channels that connect it to its surroundings
pub struct Workbench {
    controller: TranslationProgressController,
    inbox: mpsc::UnboundedReceiver<(u64, StreamSignal)>,
    updates: broadcast::Sender<JobUpdate>,
}

impl Workbench {
    pub fn new(backend: Arc<dyn TranslationBackend>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let controller = TranslationProgressController::new(backend, updates.clone(), inbox_tx);

        Self { controller, inbox, updates }
    }

    /// New receiver for job updates; every observer gets every update.
    pub fn subscribe(&self) -> broadcast::Receiver<JobUpdate> {
        self.updates.subscribe()
    }

    pub fn controller(&self) -> &TranslationProgressController {
        &self.controller
    }

    /// Runs one translation to a terminal phase.
    ///
    /// Cancelling `cancel_token` stops the job the way a user pressing the
    /// stop button would. Returns the result when the job reaches `Done`,
    /// `None` when it ends in any other way; the distinction between
    /// stopped-by-you and failed is available from [`Self::controller`].
    pub async fn translate(
        &mut self,
        source_file_name: &str,
        actor: &str,
        cancel_token: CancellationToken,
    ) -> Option<TranslationResult> {
        if !self.controller.start(source_file_name, actor) {
            return None;
        }

        while !self.controller.is_terminal() {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    self.controller.cancel();
                }
                received = self.inbox.recv() => match received {
                    Some((generation, StreamSignal::Event(event))) => {
                        self.controller.on_event(generation, event);
                    }
                    Some((generation, StreamSignal::Failed(message))) => {
                        self.controller.on_stream_error(generation, &message);
                    }
                    // The controller holds a sender, so this only happens on
                    // teardown.
                    None => break,
                },
            }
        }

        self.controller.result().cloned()
    }
}

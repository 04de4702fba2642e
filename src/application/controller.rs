//! Translation progress controller
//!
//! Drives one translation job end to end: opens the event stream, folds
//! server-pushed events into the owned [`TranslationJob`], and handles
//! user-initiated cancellation. Failures never propagate to callers as
//! errors; observers see them as phase transitions plus log lines on the
//! update channel.
//!
//! Connections are generation-tagged. Starting a new job closes the previous
//! connection and bumps the generation, so a stale connection's late events
//! can never mutate a newer job's state.

use std::sync::Arc;

use chrono::Local;
use futures::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::events::{JobUpdate, TranslationStreamEvent};
use crate::domain::job::{TranslationJob, TranslationPhase, TranslationResult};
use crate::domain::naming;
use crate::domain::TranslationBackend;

/// Signal forwarded from a pump task into the controller's inbox, tagged
/// with the generation of the connection that produced it
#[derive(Debug)]
pub enum StreamSignal {
    /// A decoded server-pushed event
    Event(TranslationStreamEvent),
    /// The stream failed or closed before the job finished
    Failed(String),
}

/// Live streaming connection owned by the controller, at most one at a time
struct ConnectionHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    fn close(self) {
        self.token.cancel();
        self.task.abort();
    }
}

/// Owns the lifecycle of one translation request.
///
/// Single-threaded by construction: the host event loop delivers stream
/// signals and user commands one at a time, so no field needs a lock.
pub struct TranslationProgressController {
    backend: Arc<dyn TranslationBackend>,
    updates: broadcast::Sender<JobUpdate>,
    inbox_tx: mpsc::UnboundedSender<(u64, StreamSignal)>,
    job: Option<TranslationJob>,
    connection: Option<ConnectionHandle>,
    generation: u64,
}

impl TranslationProgressController {
    pub fn new(
        backend: Arc<dyn TranslationBackend>,
        updates: broadcast::Sender<JobUpdate>,
        inbox_tx: mpsc::UnboundedSender<(u64, StreamSignal)>,
    ) -> Self {
        Self {
            backend,
            updates,
            inbox_tx,
            job: None,
            connection: None,
            generation: 0,
        }
    }

    /// Starts a new translation job for `source_file_name`.
    ///
    /// Closes any previous connection first, resets job state, and opens a
    /// fresh stream under a new generation. Returns `false` without touching
    /// any state when no source file is given; the input error is only
    /// reported on the update channel.
    pub fn start(&mut self, source_file_name: &str, actor: &str) -> bool {
        if source_file_name.trim().is_empty() {
            Self::log(&self.updates, "no source file selected for translation".to_string());
            return false;
        }

        if let Some(previous) = self.connection.take() {
            debug!("closing superseded translation connection");
            previous.close();
        }

        self.generation += 1;
        let job = TranslationJob::new(source_file_name, actor);
        info!(job_id = %job.job_id, file = %source_file_name, "starting translation job");
        Self::log(&self.updates, format!("requesting translation of {source_file_name}"));
        let _ = self.updates.send(JobUpdate::Progress(job.progress("translation requested")));
        self.job = Some(job);

        let backend = Arc::clone(&self.backend);
        let inbox = self.inbox_tx.clone();
        let token = CancellationToken::new();
        let child = token.clone();
        let generation = self.generation;
        let file_name = source_file_name.to_string();

        let task = tokio::spawn(async move {
            let opened = tokio::select! {
                _ = child.cancelled() => return,
                opened = backend.translate_stream(&file_name) => opened,
            };

            let mut stream = match opened {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = inbox.send((generation, StreamSignal::Failed(e.to_string())));
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = child.cancelled() => return,
                    next = stream.next() => match next {
                        Some(Ok(event)) => {
                            if inbox.send((generation, StreamSignal::Event(event))).is_err() {
                                return;
                            }
                        }
                        Some(Err(e)) => {
                            let _ = inbox.send((generation, StreamSignal::Failed(e.to_string())));
                            return;
                        }
                        None => {
                            let _ = inbox.send((
                                generation,
                                StreamSignal::Failed(
                                    "event stream closed before the job finished".to_string(),
                                ),
                            ));
                            return;
                        }
                    },
                }
            }
        });

        self.connection = Some(ConnectionHandle { token, task });
        true
    }

    /// Consumes one server-pushed event from the connection `generation`.
    ///
    /// Events from superseded generations and events arriving after a
    /// terminal phase are dropped.
    pub fn on_event(&mut self, generation: u64, event: TranslationStreamEvent) {
        if generation != self.generation {
            debug!(generation, current = self.generation, "dropping event from stale connection");
            return;
        }
        let Some(job) = self.job.as_mut() else { return };
        if job.phase.is_terminal() {
            debug!(phase = %job.phase, "dropping stray event after terminal phase");
            return;
        }

        match event {
            TranslationStreamEvent::Start { total } => {
                job.total_units = total;
                Self::log(&self.updates, format!("server reported {total} blocks to translate"));
                let _ = self.updates.send(JobUpdate::Progress(job.progress("translation started")));
            }
            TranslationStreamEvent::Progress { block, current } => {
                job.blocks.push(block);
                job.completed_units = current;
                let message = format!("translated block {current}/{}", job.total_units);
                let _ = self.updates.send(JobUpdate::Progress(job.progress(message)));
            }
            TranslationStreamEvent::Complete => {
                if job.phase == TranslationPhase::Translating {
                    job.phase = TranslationPhase::CheckingSyntax;
                    Self::log(&self.updates, "all blocks translated, checking syntax".to_string());
                    let _ = self.updates.send(JobUpdate::Progress(job.progress("checking syntax")));
                } else {
                    warn!(phase = %job.phase, "ignoring repeated complete event");
                }
            }
            TranslationStreamEvent::Syntax { message } => {
                if job.phase == TranslationPhase::CheckingSyntax {
                    let result = TranslationResult {
                        file_name: naming::result_file_name(
                            &job.source_file_name,
                            &job.actor,
                            Local::now().naive_local(),
                        ),
                        text: job.blocks.join("\n\n"),
                    };
                    job.phase = TranslationPhase::Done;
                    job.result = Some(result.clone());
                    if let Some(connection) = self.connection.take() {
                        connection.close();
                    }
                    Self::log(&self.updates, format!("syntax check finished: {message}"));
                    Self::log(&self.updates, format!("translation done, result file: {}", result.file_name));
                    let _ = self.updates.send(JobUpdate::Progress(job.progress("translation done")));
                    let _ = self.updates.send(JobUpdate::Completed(result));
                } else {
                    // The backend must send complete before syntax; anything
                    // else means the stream and this client disagree.
                    self.fail("syntax result arrived before translation completed");
                }
            }
        }
    }

    /// Marks the job failed after a stream error on connection `generation`.
    ///
    /// Terminal phases are unaffected; otherwise the connection is closed and
    /// released and the phase becomes `Errored`.
    pub fn on_stream_error(&mut self, generation: u64, message: &str) {
        if generation != self.generation {
            debug!(generation, "dropping stream error from stale connection");
            return;
        }
        self.fail(message);
    }

    /// Stops the current job at the user's request.
    ///
    /// No-op when there is nothing to cancel (no job, or the job already
    /// reached a terminal phase). Otherwise the connection is closed, the
    /// phase flips to `Cancelled` immediately, and a best-effort stop
    /// notification is sent to the backend without blocking the caller.
    pub fn cancel(&mut self) {
        let Some(job) = self.job.as_mut() else {
            debug!("cancel requested with no job running");
            return;
        };
        if job.phase.is_terminal() {
            debug!(phase = %job.phase, "cancel requested after terminal phase, nothing to do");
            return;
        }

        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        job.phase = TranslationPhase::Cancelled;
        Self::log(&self.updates, format!("translation of {} stopped by user", job.source_file_name));
        let _ = self.updates.send(JobUpdate::Progress(job.progress("stopped by user")));

        let backend = Arc::clone(&self.backend);
        let file_name = job.source_file_name.clone();
        tokio::spawn(async move {
            if let Err(e) = backend.stop_translation(&file_name).await {
                warn!("stop notification for {file_name} was not delivered: {e:#}");
            }
        });
    }

    /// Current job, if one was ever started.
    pub fn job(&self) -> Option<&TranslationJob> {
        self.job.as_ref()
    }

    /// Current phase, if a job exists.
    pub fn phase(&self) -> Option<TranslationPhase> {
        self.job.as_ref().map(|job| job.phase)
    }

    /// True once the current job can make no further progress.
    pub fn is_terminal(&self) -> bool {
        self.phase().is_some_and(TranslationPhase::is_terminal)
    }

    /// Final result, available once the phase is `Done`.
    pub fn result(&self) -> Option<&TranslationResult> {
        self.job.as_ref().and_then(|job| job.result.as_ref())
    }

    /// Whether a streaming connection is currently held.
    pub fn has_open_connection(&self) -> bool {
        self.connection.is_some()
    }

    fn fail(&mut self, message: &str) {
        let Some(job) = self.job.as_mut() else { return };
        if job.phase.is_terminal() {
            return;
        }

        job.phase = TranslationPhase::Errored;
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        Self::log(
            &self.updates,
            format!("translation of {} failed: {message}", job.source_file_name),
        );
        let _ = self.updates.send(JobUpdate::Progress(job.progress(message.to_string())));
    }

    fn log(updates: &broadcast::Sender<JobUpdate>, line: String) {
        info!("{line}");
        let _ = updates.send(JobUpdate::Log(line));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::stream;
    use tokio::time::sleep;

    use super::*;
    use crate::domain::backend::{EventStream, StreamError};

    /// Backend stub: hands out either a scripted stream or a stream that
    /// stays open forever, records stop notifications, and flags when a
    /// handed-out stream is dropped.
    struct StubBackend {
        scripted: Mutex<Vec<Vec<TranslationStreamEvent>>>,
        stop_calls: Mutex<Vec<String>>,
        dropped: Mutex<Vec<Arc<AtomicBool>>>,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    impl StubBackend {
        fn pending() -> Self {
            Self {
                scripted: Mutex::new(Vec::new()),
                stop_calls: Mutex::new(Vec::new()),
                dropped: Mutex::new(Vec::new()),
            }
        }

        fn with_script(events: Vec<TranslationStreamEvent>) -> Self {
            let stub = Self::pending();
            stub.scripted.lock().unwrap().push(events);
            stub
        }

        fn stop_calls(&self) -> Vec<String> {
            self.stop_calls.lock().unwrap().clone()
        }

        fn dropped_streams(&self) -> Vec<bool> {
            self.dropped.lock().unwrap().iter().map(|flag| flag.load(Ordering::SeqCst)).collect()
        }
    }

    #[async_trait]
    impl TranslationBackend for StubBackend {
        async fn translate_stream(&self, _file_name: &str) -> Result<EventStream, StreamError> {
            let flag = Arc::new(AtomicBool::new(false));
            self.dropped.lock().unwrap().push(Arc::clone(&flag));
            let guard = DropFlag(flag);

            let script = self.scripted.lock().unwrap().pop();
            let events: Vec<Result<TranslationStreamEvent, StreamError>> =
                script.unwrap_or_default().into_iter().map(Ok).collect();
            // Scripted events followed by a stream that never ends; the drop
            // guard rides along in the inspect closure so tests can observe
            // the connection being released.
            let owned = stream::iter(events)
                .chain(stream::pending::<Result<TranslationStreamEvent, StreamError>>());
            Ok(Box::pin(owned.inspect(move |_| {
                let _ = &guard;
            })))
        }

        async fn stop_translation(&self, file_name: &str) -> anyhow::Result<()> {
            self.stop_calls.lock().unwrap().push(file_name.to_string());
            Ok(())
        }
    }

    struct Harness {
        controller: TranslationProgressController,
        inbox: mpsc::UnboundedReceiver<(u64, StreamSignal)>,
        backend: Arc<StubBackend>,
    }

    fn harness(backend: StubBackend) -> Harness {
        let backend = Arc::new(backend);
        let shared: Arc<dyn TranslationBackend> = backend.clone();
        let (updates, _) = broadcast::channel(64);
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = TranslationProgressController::new(shared, updates, tx);
        Harness { controller, inbox: rx, backend }
    }

    /// Drains the inbox into the controller until the phase is terminal.
    async fn drive(harness: &mut Harness) {
        while !harness.controller.is_terminal() {
            let (generation, signal) =
                harness.inbox.recv().await.expect("inbox closed unexpectedly");
            match signal {
                StreamSignal::Event(event) => harness.controller.on_event(generation, event),
                StreamSignal::Failed(message) => {
                    harness.controller.on_stream_error(generation, &message);
                }
            }
        }
    }

    fn full_run_events() -> Vec<TranslationStreamEvent> {
        vec![
            TranslationStreamEvent::Start { total: 3 },
            TranslationStreamEvent::Progress { block: "A".to_string(), current: 1 },
            TranslationStreamEvent::Progress { block: "B".to_string(), current: 2 },
            TranslationStreamEvent::Progress { block: "C".to_string(), current: 3 },
            TranslationStreamEvent::Complete,
            TranslationStreamEvent::Syntax { message: "ok".to_string() },
        ]
    }

    #[tokio::test]
    async fn full_run_reaches_done_with_blocks_in_order() {
        let mut h = harness(StubBackend::with_script(full_run_events()));

        assert!(h.controller.start("a.txt", "[email protected]"));
        drive(&mut h).await;

        assert_eq!(h.controller.phase(), Some(TranslationPhase::Done));
        let job = h.controller.job().unwrap();
        assert_eq!(job.blocks, vec!["A", "B", "C"]);
        assert_eq!(job.total_units, 3);
        assert_eq!(job.completed_units, 3);

        let result = h.controller.result().unwrap();
        assert_eq!(result.text, "A\n\nB\n\nC");
        assert!(result.file_name.starts_with("a - [email protected] ("));
        assert!(result.file_name.ends_with(").py"));
        assert!(!h.controller.has_open_connection());
    }

    #[tokio::test]
    async fn done_is_only_reachable_through_checking_syntax() {
        let mut h = harness(StubBackend::with_script(full_run_events()));
        let mut phases = Vec::new();

        assert!(h.controller.start("a.txt", "user@host"));
        while !h.controller.is_terminal() {
            let (generation, signal) = h.inbox.recv().await.unwrap();
            match signal {
                StreamSignal::Event(event) => h.controller.on_event(generation, event),
                StreamSignal::Failed(message) => h.controller.on_stream_error(generation, &message),
            }
            phases.push(h.controller.phase().unwrap());
        }

        let done_at = phases.iter().position(|p| *p == TranslationPhase::Done).unwrap();
        assert_eq!(phases[done_at - 1], TranslationPhase::CheckingSyntax);
    }

    #[tokio::test]
    async fn syntax_without_complete_is_a_protocol_error() {
        let mut h = harness(StubBackend::with_script(vec![
            TranslationStreamEvent::Start { total: 1 },
            TranslationStreamEvent::Progress { block: "A".to_string(), current: 1 },
            TranslationStreamEvent::Syntax { message: "ok".to_string() },
        ]));

        assert!(h.controller.start("a.txt", "user@host"));
        drive(&mut h).await;

        assert_eq!(h.controller.phase(), Some(TranslationPhase::Errored));
        assert!(!h.controller.has_open_connection());
        assert!(h.controller.result().is_none());
    }

    #[tokio::test]
    async fn empty_source_name_stays_idle_and_opens_nothing() {
        let mut h = harness(StubBackend::pending());
        let mut updates = h.controller.updates.subscribe();

        assert!(!h.controller.start("  ", "user@host"));

        assert!(h.controller.job().is_none());
        assert!(!h.controller.has_open_connection());
        assert!(matches!(updates.recv().await, Ok(JobUpdate::Log(_))));
        assert!(h.backend.dropped_streams().is_empty());
    }

    #[tokio::test]
    async fn second_start_closes_the_first_connection() {
        let mut h = harness(StubBackend::pending());

        assert!(h.controller.start("first.txt", "user@host"));
        sleep(Duration::from_millis(20)).await;
        assert!(h.controller.start("second.txt", "user@host"));
        sleep(Duration::from_millis(20)).await;

        let dropped = h.backend.dropped_streams();
        assert_eq!(dropped.len(), 2);
        assert!(dropped[0], "first connection must be closed by the second start");
        assert!(!dropped[1], "second connection must stay open");
        assert!(h.controller.has_open_connection());
    }

    #[tokio::test]
    async fn events_from_a_superseded_generation_are_dropped() {
        let mut h = harness(StubBackend::pending());

        assert!(h.controller.start("first.txt", "user@host"));
        let stale_generation = 1;
        assert!(h.controller.start("second.txt", "user@host"));

        h.controller.on_event(
            stale_generation,
            TranslationStreamEvent::Progress { block: "stale".to_string(), current: 7 },
        );

        let job = h.controller.job().unwrap();
        assert_eq!(job.source_file_name, "second.txt");
        assert!(job.blocks.is_empty());
        assert_eq!(job.completed_units, 0);
    }

    #[tokio::test]
    async fn cancel_mid_translation_notifies_the_backend() {
        let mut h = harness(StubBackend::with_script(vec![
            TranslationStreamEvent::Start { total: 5 },
            TranslationStreamEvent::Progress { block: "A".to_string(), current: 1 },
        ]));

        assert!(h.controller.start("b.txt", "user@host"));
        for _ in 0..2 {
            let (generation, signal) = h.inbox.recv().await.unwrap();
            if let StreamSignal::Event(event) = signal {
                h.controller.on_event(generation, event);
            }
        }
        h.controller.cancel();

        assert_eq!(h.controller.phase(), Some(TranslationPhase::Cancelled));
        assert!(!h.controller.has_open_connection());

        sleep(Duration::from_millis(50)).await;
        assert_eq!(h.backend.stop_calls(), vec!["b.txt".to_string()]);
    }

    #[tokio::test]
    async fn cancel_after_done_is_a_no_op() {
        let mut h = harness(StubBackend::with_script(full_run_events()));

        assert!(h.controller.start("a.txt", "user@host"));
        drive(&mut h).await;
        let result_before = h.controller.result().cloned();

        h.controller.cancel();
        sleep(Duration::from_millis(50)).await;

        assert_eq!(h.controller.phase(), Some(TranslationPhase::Done));
        assert_eq!(h.controller.result().cloned(), result_before);
        assert!(h.backend.stop_calls().is_empty(), "no stop notification after done");
    }

    #[tokio::test]
    async fn stream_error_is_terminal_from_any_active_phase() {
        // From Translating.
        let mut h = harness(StubBackend::with_script(vec![TranslationStreamEvent::Start {
            total: 2,
        }]));
        assert!(h.controller.start("a.txt", "user@host"));
        let (generation, signal) = h.inbox.recv().await.unwrap();
        if let StreamSignal::Event(event) = signal {
            h.controller.on_event(generation, event);
        }
        h.controller.on_stream_error(generation, "connection reset");
        assert_eq!(h.controller.phase(), Some(TranslationPhase::Errored));
        assert!(!h.controller.has_open_connection());

        // From CheckingSyntax.
        let mut h = harness(StubBackend::with_script(vec![
            TranslationStreamEvent::Start { total: 1 },
            TranslationStreamEvent::Progress { block: "A".to_string(), current: 1 },
            TranslationStreamEvent::Complete,
        ]));
        assert!(h.controller.start("a.txt", "user@host"));
        for _ in 0..3 {
            let (generation, signal) = h.inbox.recv().await.unwrap();
            if let StreamSignal::Event(event) = signal {
                h.controller.on_event(generation, event);
            }
        }
        assert_eq!(h.controller.phase(), Some(TranslationPhase::CheckingSyntax));
        h.controller.on_stream_error(1, "connection reset");
        assert_eq!(h.controller.phase(), Some(TranslationPhase::Errored));
        assert!(!h.controller.has_open_connection());
    }

    #[tokio::test]
    async fn blocks_keep_receipt_order_regardless_of_current_values() {
        let mut h = harness(StubBackend::with_script(vec![
            TranslationStreamEvent::Start { total: 3 },
            TranslationStreamEvent::Progress { block: "first".to_string(), current: 3 },
            TranslationStreamEvent::Progress { block: "second".to_string(), current: 1 },
            TranslationStreamEvent::Progress { block: "third".to_string(), current: 2 },
            TranslationStreamEvent::Complete,
            TranslationStreamEvent::Syntax { message: "ok".to_string() },
        ]));

        assert!(h.controller.start("a.txt", "user@host"));
        drive(&mut h).await;

        let job = h.controller.job().unwrap();
        assert_eq!(job.blocks, vec!["first", "second", "third"]);
    }
}

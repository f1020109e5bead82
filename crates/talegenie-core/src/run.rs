use futures::StreamExt as _;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::errors::TaleError;
use crate::sink::StoryBuffer;
use crate::stream::{StoryEvent, TextStream};

/// Handle used to request cancellation of a running story.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// Cancellation becomes visible as a terminal `StoryEvent::Failed` with
    /// `TaleError::Cancelled`. The underlying connection is dropped with it.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Behavior options for a story run.
#[derive(Clone, Debug)]
pub struct StoryRunOptions {
    /// Bounded event buffer size between the drain task and the consumer.
    pub stream_buffer_capacity: usize,
}

impl Default for StoryRunOptions {
    fn default() -> Self {
        Self {
            stream_buffer_capacity: 128,
        }
    }
}

/// A story being drained on a background task.
///
/// Consumers either follow `next_event()` or watch `progress()` for the text
/// accumulated so far; `finish()` returns the final story.
pub struct StoryRun {
    run_id: uuid::Uuid,
    rx: mpsc::Receiver<StoryEvent>,
    final_rx: oneshot::Receiver<Result<String, TaleError>>,
    progress: watch::Receiver<String>,
    abort_handle: AbortHandle,
    saw_terminal: bool,
}

impl StoryRun {
    /// Spawns a task that drains `stream` and reports progress.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn spawn(stream: TextStream, options: StoryRunOptions) -> Result<Self, TaleError> {
        if options.stream_buffer_capacity == 0 {
            return Err(TaleError::Validation(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        let run_id = uuid::Uuid::new_v4();
        let (tx, rx) = mpsc::channel(options.stream_buffer_capacity);
        let (final_tx, final_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = watch::channel(false);
        let (progress_tx, progress_rx) = watch::channel(String::new());

        tokio::spawn(drain_task(
            run_id,
            stream,
            tx,
            final_tx,
            progress_tx,
            abort_rx,
        ));

        Ok(Self {
            run_id,
            rx,
            final_rx,
            progress: progress_rx,
            abort_handle: AbortHandle { tx: abort_tx },
            saw_terminal: false,
        })
    }

    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    /// Returns a handle that can cancel the run.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Live view of the text accumulated so far.
    pub fn progress(&self) -> watch::Receiver<String> {
        self.progress.clone()
    }

    /// Waits for and returns the next story event.
    ///
    /// Returns `None` after the event channel is closed.
    pub async fn next_event(&mut self) -> Option<StoryEvent> {
        let event = self.rx.recv().await;
        if event.as_ref().is_some_and(StoryEvent::is_terminal) {
            self.saw_terminal = true;
        }
        event
    }

    /// Drains remaining events (if any) and returns the terminal result.
    pub async fn finish(mut self) -> Result<String, TaleError> {
        while !self.saw_terminal {
            match self.rx.recv().await {
                Some(event) if event.is_terminal() => self.saw_terminal = true,
                Some(_) => {}
                None => break,
            }
        }

        match self.final_rx.await {
            Ok(result) => result,
            Err(_) => Err(TaleError::protocol_msg(format!(
                "story task ended without final result (run={})",
                self.run_id
            ))),
        }
    }
}

async fn drain_task(
    run_id: uuid::Uuid,
    mut stream: TextStream,
    tx: mpsc::Sender<StoryEvent>,
    final_tx: oneshot::Sender<Result<String, TaleError>>,
    progress_tx: watch::Sender<String>,
    mut abort_rx: watch::Receiver<bool>,
) {
    let mut story = StoryBuffer::default();
    let mut seq = 0_u64;
    let mut abort_open = true;
    loop {
        tokio::select! {
            changed = abort_rx.changed(), if abort_open => {
                match changed {
                    Ok(()) if *abort_rx.borrow() => {
                        debug!(run_id = %run_id, chars = story.len(), "story run cancelled");
                        fail(&tx, final_tx, run_id, TaleError::Cancelled, story.into_string()).await;
                        return;
                    }
                    Ok(()) => {}
                    Err(_) => abort_open = false,
                }
            }
            next = stream.next() => {
                match next {
                    Some(Ok(event)) => {
                        story.push(&event);
                        progress_tx.send_replace(story.as_str().to_string());
                        let sent = tx.send(StoryEvent::Delta { run_id, seq, text: event.text }).await.is_ok();
                        seq = seq.saturating_add(1);
                        if !sent {
                            let _ = final_tx.send(Err(TaleError::protocol_msg("story receiver dropped during output")));
                            return;
                        }
                    }
                    Some(Err(error)) => {
                        debug!(run_id = %run_id, %error, "story stream failed");
                        fail(&tx, final_tx, run_id, error, story.into_string()).await;
                        return;
                    }
                    None => {
                        let text = story.into_string();
                        debug!(run_id = %run_id, deltas = seq, chars = text.len(), "story completed");
                        let sent = tx.send(StoryEvent::Completed { run_id, text: text.clone() }).await.is_ok();
                        let _ = final_tx.send(if sent { Ok(text) } else { Err(TaleError::protocol_msg("story receiver dropped before completion")) });
                        return;
                    }
                }
            }
        }
    }
}

async fn fail(
    tx: &mpsc::Sender<StoryEvent>,
    final_tx: oneshot::Sender<Result<String, TaleError>>,
    run_id: uuid::Uuid,
    error: TaleError,
    partial: String,
) {
    let _ = tx
        .send(StoryEvent::Failed {
            run_id,
            error: error.clone(),
            partial,
        })
        .await;
    let _ = final_tx.send(Err(error));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::TextEvent;
    use futures::StreamExt as _;
    use futures::stream;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Flips its flag when dropped.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn events(items: Vec<Result<TextEvent, TaleError>>) -> TextStream {
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn emits_monotonic_deltas_and_aggregates() {
        let mut run = StoryRun::spawn(
            events(vec![Ok(TextEvent::new("Once")), Ok(TextEvent::new(" upon"))]),
            StoryRunOptions::default(),
        )
        .expect("spawn");

        let mut seqs = Vec::new();
        let mut completed = None;
        while let Some(event) = run.next_event().await {
            match event {
                StoryEvent::Delta { seq, .. } => seqs.push(seq),
                StoryEvent::Completed { text, .. } => {
                    completed = Some(text);
                    break;
                }
                StoryEvent::Failed { .. } => panic!("unexpected failure"),
            }
        }
        assert_eq!(seqs, vec![0, 1]);
        assert_eq!(completed.as_deref(), Some("Once upon"));
        assert_eq!(*run.progress().borrow(), "Once upon");
        assert_eq!(run.finish().await.expect("finish"), "Once upon");
    }

    #[tokio::test]
    async fn failure_keeps_partial_text() {
        let mut run = StoryRun::spawn(
            events(vec![
                Ok(TextEvent::new("Once")),
                Err(TaleError::FailedToGenerateText("reset".into())),
            ]),
            StoryRunOptions::default(),
        )
        .expect("spawn");

        let mut partial = None;
        while let Some(event) = run.next_event().await {
            if let StoryEvent::Failed { partial: p, .. } = event {
                partial = Some(p);
                break;
            }
        }
        assert_eq!(partial.as_deref(), Some("Once"));
        assert!(matches!(
            run.finish().await,
            Err(TaleError::FailedToGenerateText(_))
        ));
    }

    #[tokio::test]
    async fn cancellation_emits_terminal_failure() {
        let mut run = StoryRun::spawn(
            Box::pin(stream::pending::<Result<TextEvent, TaleError>>()),
            StoryRunOptions::default(),
        )
        .expect("spawn");
        run.abort_handle().abort();

        let mut saw_cancel = false;
        while let Some(event) = run.next_event().await {
            if let StoryEvent::Failed {
                error: TaleError::Cancelled,
                ..
            } = event
            {
                saw_cancel = true;
                break;
            }
        }
        assert!(saw_cancel);
        assert!(matches!(run.finish().await, Err(TaleError::Cancelled)));
    }

    #[tokio::test]
    async fn cancellation_releases_the_text_stream() {
        let released = Arc::new(AtomicBool::new(false));
        let guard = DropFlag(Arc::clone(&released));
        let stream: TextStream = Box::pin(
            stream::iter(vec![Ok::<_, TaleError>(TextEvent::new("Once"))])
                .chain(stream::pending())
                .map(move |item| {
                    let _held = &guard;
                    item
                }),
        );
        let mut run = StoryRun::spawn(stream, StoryRunOptions::default()).expect("spawn");

        assert!(matches!(
            run.next_event().await,
            Some(StoryEvent::Delta { .. })
        ));
        assert!(!released.load(Ordering::SeqCst));

        run.abort_handle().abort();
        match run.next_event().await {
            Some(StoryEvent::Failed {
                error: TaleError::Cancelled,
                partial,
                ..
            }) => assert_eq!(partial, "Once"),
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert!(matches!(run.finish().await, Err(TaleError::Cancelled)));
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn zero_capacity_is_rejected() {
        let result = StoryRun::spawn(
            events(Vec::new()),
            StoryRunOptions {
                stream_buffer_capacity: 0,
            },
        );
        assert!(matches!(result, Err(TaleError::Validation(_))));
    }

    #[tokio::test]
    async fn finish_without_reading_events_returns_story() {
        let run = StoryRun::spawn(
            events(vec![Ok(TextEvent::new("a")), Ok(TextEvent::new("b"))]),
            StoryRunOptions {
                stream_buffer_capacity: 1,
            },
        )
        .expect("spawn");
        assert_eq!(run.finish().await.expect("finish"), "ab");
    }
}

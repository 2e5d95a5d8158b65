use crate::application_port::{ClientError, JudgeService};
use crate::domain_model::{SubmissionId, Verdict};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    /// Queries allowed while the verdict stays `PENDING`.
    pub max_polls: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(3000),
            max_polls: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackFailure {
    #[error("status query failed: {0}")]
    Query(String),
    #[error("session expired while tracking")]
    SessionExpired,
    #[error("still pending after {polls} polls")]
    TimedOut { polls: u32 },
}

impl From<ClientError> for TrackFailure {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::SessionExpired => TrackFailure::SessionExpired,
            other => TrackFailure::Query(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerState {
    Created,
    Polling,
    Resolved(Verdict),
    Cancelled,
    Failed(TrackFailure),
}

impl TrackerState {
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            TrackerState::Resolved(_) | TrackerState::Cancelled | TrackerState::Failed(_)
        )
    }
}

/// Starts verdict polling for submissions.
pub struct SubmissionTracker {
    judge: Arc<dyn JudgeService>,
    config: TrackerConfig,
}

impl SubmissionTracker {
    pub fn new(judge: Arc<dyn JudgeService>, config: TrackerConfig) -> Self {
        Self { judge, config }
    }

    pub fn config(&self) -> TrackerConfig {
        self.config
    }

    /// Nothing is queried until the returned stream is polled. Each call
    /// starts an independent tracking of `id`.
    pub fn track(&self, id: SubmissionId) -> Tracking {
        let cancel = CancellationToken::new();
        let poll_loop = PollLoop {
            judge: self.judge.clone(),
            id,
            config: self.config,
            cancel: cancel.clone(),
            step: Step::Created,
        };

        let inner = stream::unfold(poll_loop, |mut poll_loop| async move {
            let state = poll_loop.advance().await?;
            Some((state, poll_loop))
        })
        .boxed();

        Tracking { id, cancel, inner }
    }
}

/// Cancels a `Tracking` from elsewhere, e.g. a ctrl-c handler.
#[derive(Debug, Clone)]
pub struct CancelHandle(CancellationToken);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Stream of state changes for one submission.
///
/// Yields `Created`, `Polling` and then exactly one final state before ending.
/// Dropping it stops polling.
pub struct Tracking {
    id: SubmissionId,
    cancel: CancellationToken,
    inner: BoxStream<'static, TrackerState>,
}

impl Tracking {
    pub fn submission_id(&self) -> SubmissionId {
        self.id
    }

    /// Takes effect before the next scheduled query. A response still in
    /// flight is discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    /// Drive the stream to its end and return the final state.
    pub async fn outcome(mut self) -> TrackerState {
        let mut last = TrackerState::Cancelled;
        while let Some(state) = self.next().await {
            last = state;
        }
        last
    }
}

impl Stream for Tracking {
    type Item = TrackerState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for Tracking {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Created,
    Started,
    Polling { polls: u32 },
    Done,
}

struct PollLoop {
    judge: Arc<dyn JudgeService>,
    id: SubmissionId,
    config: TrackerConfig,
    cancel: CancellationToken,
    step: Step,
}

impl PollLoop {
    async fn advance(&mut self) -> Option<TrackerState> {
        match self.step {
            Step::Created => {
                self.step = Step::Started;
                Some(TrackerState::Created)
            }
            Step::Started => {
                if self.cancel.is_cancelled() {
                    self.step = Step::Done;
                    return Some(TrackerState::Cancelled);
                }
                self.step = Step::Polling { polls: 0 };
                debug!(submission_id = %self.id, "polling for verdict");
                Some(TrackerState::Polling)
            }
            Step::Polling { polls } => {
                let state = self.poll_until_final(polls).await;
                self.step = Step::Done;
                Some(state)
            }
            Step::Done => None,
        }
    }

    async fn poll_until_final(&self, mut polls: u32) -> TrackerState {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break self.cancelled(polls),
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break self.cancelled(polls),
                result = self.judge.submission_status(self.id) => result,
            };
            polls += 1;

            if self.cancel.is_cancelled() {
                break self.cancelled(polls);
            }

            match result {
                Ok(status) if status.verdict.is_terminal() => {
                    info!(submission_id = %self.id, verdict = %status.verdict, polls, "verdict ready");
                    break TrackerState::Resolved(status.verdict);
                }
                Ok(_) if polls >= self.config.max_polls => {
                    warn!(submission_id = %self.id, polls, "gave up waiting for verdict");
                    break TrackerState::Failed(TrackFailure::TimedOut { polls });
                }
                Ok(_) => debug!(submission_id = %self.id, polls, "still pending"),
                Err(e) => {
                    warn!(submission_id = %self.id, error = %e, "status query failed");
                    break TrackerState::Failed(e.into());
                }
            }
        }
    }

    fn cancelled(&self, polls: u32) -> TrackerState {
        debug!(submission_id = %self.id, polls, "tracking cancelled");
        TrackerState::Cancelled
    }
}

//! Two-session orchestration with a synchronization barrier.
//!
//! Each session runs its own subsequence of the plan on its own task.
//! Sides signal progress over watch channels; the barrier is the plan
//! position of the verification step, and neither side runs its
//! post-barrier steps until the peer has reached it too.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use events::{Event, EventBus};
use interop_core::{ExecutionPlan, SessionRole, Step, StepOutcome, StepStatus};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::session::Session;
use crate::step_executor::StepExecutor;

/// Progress of one side, published over its watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SideProgress {
    Running,
    ReachedBarrier,
    Ready,
    Failed,
}

/// What one side produced: its outcomes tagged with plan positions,
/// the session (still open on the success path) and whether the side
/// stopped on a failure of its own.
struct SideReport {
    outcomes: Vec<(usize, StepOutcome)>,
    session: Session,
    failed: bool,
    ready: bool,
}

/// Merged result of orchestrating both sessions through a plan.
pub struct OrchestrationReport {
    /// All per-session outcomes in plan order.
    pub outcomes: Vec<StepOutcome>,
    /// Both sides completed their subsequences and are awaiting
    /// verification.
    pub both_ready: bool,
    /// At least one side stopped on a step failure.
    pub failed: bool,
    /// The run was cancelled while sides were executing.
    pub cancelled: bool,
    /// Sessions are handed back so the caller controls when they
    /// close; on the success path they stay open for verification.
    pub publisher: Session,
    pub subscriber: Session,
}

/// Runs the publisher and subscriber subsequences of a plan
/// concurrently, joined at the verification barrier.
pub struct SessionOrchestrator {
    config: EngineConfig,
    events: EventBus,
    cancel: CancellationToken,
}

impl SessionOrchestrator {
    pub fn new(config: EngineConfig, events: EventBus, cancel: CancellationToken) -> Self {
        Self {
            config,
            events,
            cancel,
        }
    }

    /// Drive both sessions through the plan. The plan must already be
    /// validated; a panicked or aborted side task is the only error.
    pub async fn run(
        &self,
        plan: Arc<ExecutionPlan>,
        publisher: Session,
        subscriber: Session,
    ) -> Result<OrchestrationReport> {
        let barrier = plan.barrier_position();
        let (pub_tx, pub_rx) = watch::channel(SideProgress::Running);
        let (sub_tx, sub_rx) = watch::channel(SideProgress::Running);

        let pub_task = tokio::spawn(
            self.side_runner(SessionRole::Publisher, plan.clone(), barrier, pub_tx, sub_rx)
                .run(publisher),
        );
        let sub_task = tokio::spawn(
            self.side_runner(SessionRole::Subscriber, plan.clone(), barrier, sub_tx, pub_rx)
                .run(subscriber),
        );

        let (pub_side, sub_side) = tokio::join!(pub_task, sub_task);
        let pub_side = pub_side.map_err(|_| EngineError::SessionTaskAborted {
            role: SessionRole::Publisher,
        })?;
        let sub_side = sub_side.map_err(|_| EngineError::SessionTaskAborted {
            role: SessionRole::Subscriber,
        })?;

        let mut tagged: Vec<(usize, StepOutcome)> = pub_side.outcomes;
        tagged.extend(sub_side.outcomes);
        tagged.sort_by_key(|(position, _)| *position);

        Ok(OrchestrationReport {
            outcomes: tagged.into_iter().map(|(_, o)| o).collect(),
            both_ready: pub_side.ready && sub_side.ready,
            failed: pub_side.failed || sub_side.failed,
            cancelled: self.cancel.is_cancelled(),
            publisher: pub_side.session,
            subscriber: sub_side.session,
        })
    }

    fn side_runner(
        &self,
        role: SessionRole,
        plan: Arc<ExecutionPlan>,
        barrier: Option<usize>,
        progress: watch::Sender<SideProgress>,
        peer: watch::Receiver<SideProgress>,
    ) -> SideRunner {
        SideRunner {
            role,
            steps: plan
                .steps_for(role)
                .into_iter()
                .map(|(position, step)| (position, step.clone()))
                .collect(),
            has_verification: plan.verification_step().is_some(),
            barrier,
            executor: StepExecutor::new(role, &self.config, self.events.clone(), self.cancel.clone()),
            progress,
            peer,
            cancel: self.cancel.clone(),
            events: self.events.clone(),
            close_grace: self.config.close_grace,
        }
    }
}

struct SideRunner {
    role: SessionRole,
    steps: Vec<(usize, Step)>,
    has_verification: bool,
    barrier: Option<usize>,
    executor: StepExecutor,
    progress: watch::Sender<SideProgress>,
    peer: watch::Receiver<SideProgress>,
    cancel: CancellationToken,
    events: EventBus,
    close_grace: Duration,
}

impl SideRunner {
    async fn run(mut self, mut session: Session) -> SideReport {
        let (pre, post): (Vec<_>, Vec<_>) = match self.barrier {
            Some(barrier) => self
                .steps
                .iter()
                .cloned()
                .partition(|(position, _)| *position < barrier),
            None => (self.steps.clone(), Vec::new()),
        };

        let mut outcomes = Vec::new();

        if let Some(stopped) = self.run_sequence(&pre, &mut outcomes, &mut session).await {
            return self.stop(session, outcomes, post, stopped).await;
        }

        if self.barrier.is_some() {
            info!(role = %self.role.as_str(), "Reached synchronization barrier");
            let _ = self.progress.send(SideProgress::ReachedBarrier);
            self.events.publish(Event::BarrierReached { role: self.role });

            let wait = tokio::select! {
                _ = self.cancel.cancelled() => Some(Stop::Cancelled),
                peer = self.peer.wait_for(|p| *p != SideProgress::Running) => {
                    match peer {
                        Ok(progress) if *progress == SideProgress::Failed => Some(Stop::PeerFailed),
                        Ok(_) => None,
                        // Peer task gone; treat like a peer failure.
                        Err(_) => Some(Stop::PeerFailed),
                    }
                }
            };
            if let Some(stop) = wait {
                if stop == Stop::PeerFailed {
                    warn!(role = %self.role.as_str(), "Peer session failed, skipping post-barrier steps");
                }
                return self.stop(session, outcomes, post, stop).await;
            }
        }

        if let Some(stopped) = self.run_sequence(&post, &mut outcomes, &mut session).await {
            return self.stop(session, outcomes, Vec::new(), stopped).await;
        }

        if self.has_verification
            && session.state() == interop_core::SessionState::StreamActive
        {
            if let Err(e) = session.mark_ready() {
                warn!(role = %self.role.as_str(), error = %e, "Could not mark session ready");
            }
        }

        let _ = self.progress.send(SideProgress::Ready);
        SideReport {
            outcomes,
            session,
            failed: false,
            ready: true,
        }
    }

    /// Execute steps in order; `Some(stop)` means the sequence did not
    /// complete and the remaining steps were already recorded.
    async fn run_sequence(
        &mut self,
        steps: &[(usize, Step)],
        outcomes: &mut Vec<(usize, StepOutcome)>,
        session: &mut Session,
    ) -> Option<Stop> {
        for (i, (position, step)) in steps.iter().enumerate() {
            // A failed peer can never reach the barrier; stop spending
            // steps on a run that is already lost.
            if *self.peer.borrow() == SideProgress::Failed {
                warn!(role = %self.role.as_str(), "Peer session failed, halting remaining steps");
                for (position, step) in &steps[i..] {
                    outcomes.push((*position, StepOutcome::skipped(step.id.clone(), Some(self.role))));
                }
                return Some(Stop::PeerFailed);
            }

            let outcome = self.executor.execute(step, session).await;
            let stopped = match outcome.status {
                StepStatus::Succeeded => None,
                StepStatus::Failed => Some(Stop::StepFailed),
                StepStatus::Skipped => Some(Stop::Cancelled),
            };
            outcomes.push((*position, outcome));

            if let Some(stop) = stopped {
                for (position, step) in &steps[i + 1..] {
                    outcomes.push((*position, StepOutcome::skipped(step.id.clone(), Some(self.role))));
                }
                return Some(stop);
            }
        }
        None
    }

    /// Terminal path for a side that cannot reach verification: record
    /// the untouched steps as skipped, signal the peer and close.
    async fn stop(
        self,
        mut session: Session,
        mut outcomes: Vec<(usize, StepOutcome)>,
        remaining: Vec<(usize, Step)>,
        stop: Stop,
    ) -> SideReport {
        for (position, step) in remaining {
            outcomes.push((position, StepOutcome::skipped(step.id, Some(self.role))));
        }
        let _ = self.progress.send(SideProgress::Failed);
        if stop == Stop::StepFailed {
            session.mark_failed();
        }
        session.close(self.close_grace).await;
        SideReport {
            outcomes,
            session,
            failed: stop == Stop::StepFailed,
            ready: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    StepFailed,
    PeerFailed,
    Cancelled,
}

//! Async driver - one task per session owning its state machine

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::machine::{Outcome, SessionEvent, SessionState, SessionStateMachine};
use super::SessionEngine;
use crate::exercises::ClassifiedExercise;

const COMMAND_BUFFER: usize = 32;

/// Messages accepted by the runner task
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Event(SessionEvent),
    Classified(ClassifiedExercise),
}

/// Wall clock anchored to tokio's clock, so paused test time moves it too
#[derive(Debug, Clone, Copy)]
struct Clock {
    origin: Instant,
    origin_utc: DateTime<Utc>,
}

impl Clock {
    fn start() -> Self {
        Self { origin: Instant::now(), origin_utc: Utc::now() }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().saturating_duration_since(self.origin);
        self.origin_utc
            + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

/// Owner side of a running session
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<SessionEngine>,
}

impl SessionHandle {
    pub async fn send(&self, event: SessionEvent) -> Result<()> {
        self.commands
            .send(SessionCommand::Event(event))
            .await
            .context("session task has stopped")
    }

    pub async fn classified(&self, exercise: ClassifiedExercise) -> Result<()> {
        self.commands
            .send(SessionCommand::Classified(exercise))
            .await
            .context("session task has stopped")
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Ends the session and returns its engine for persisting
    pub async fn finish(self) -> Result<SessionEngine> {
        // the task may already be idle and gone; the join below still succeeds
        let _ = self.commands.send(SessionCommand::Event(SessionEvent::End)).await;
        drop(self.commands);
        self.task.await.context("session task panicked")
    }
}

/// Spawns session tasks
pub struct SessionRunner;

impl SessionRunner {
    pub fn spawn(machine: SessionStateMachine) -> SessionHandle {
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let (publisher, state) = watch::channel(machine.state().clone());
        let task = tokio::spawn(run(machine, receiver, publisher, Clock::start()));
        SessionHandle { commands, state, task }
    }
}

/// When a countdown of `secs` runs out; unusable values fire at once
fn deadline(secs: f64) -> Instant {
    let now = Instant::now();
    match Duration::try_from_secs_f64(secs) {
        Ok(delay) => now.checked_add(delay).unwrap_or_else(|| {
            warn!("Countdown of {}s is out of range; firing now", secs);
            now
        }),
        Err(e) => {
            warn!("Invalid countdown of {}s ({}); firing now", secs, e);
            now
        }
    }
}

async fn run(
    mut machine: SessionStateMachine,
    mut commands: mpsc::Receiver<SessionCommand>,
    publisher: watch::Sender<SessionState>,
    clock: Clock,
) -> SessionEngine {
    let timer = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(timer);
    let mut armed: Option<u64> = None;

    info!("Session {} running", machine.engine().session().id);
    loop {
        let outcome = tokio::select! {
            command = commands.recv() => match command {
                Some(SessionCommand::Event(event)) => machine.handle(event, clock.now()),
                Some(SessionCommand::Classified(exercise)) => {
                    machine.engine_mut().record_classified(exercise);
                    Outcome::default()
                }
                None => {
                    debug!("All session handles dropped; ending");
                    machine.handle(SessionEvent::End, clock.now())
                }
            },
            () = &mut timer, if armed.is_some() => {
                let generation = armed.take().unwrap_or_default();
                machine.handle(SessionEvent::TimerElapsed { generation }, clock.now())
            }
        };

        if let Some(countdown) = outcome.countdown {
            timer.as_mut().reset(deadline(countdown.secs));
            armed = Some(countdown.generation);
        } else if outcome.changed {
            // states without a countdown cancel the pending one
            armed = None;
        }
        if outcome.changed {
            publisher.send_replace(machine.state().clone());
        }
        if machine.state().is_idle() {
            break;
        }
    }

    // in-flight commands are dropped with the receiver
    commands.close();
    info!("Session {} stopped", machine.engine().session().id);
    machine.into_engine()
}

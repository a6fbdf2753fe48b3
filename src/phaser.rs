//! The phase clock driving protocol transitions.
//!
//! A phaser emits the ordered sequence Deal, Response, Justification,
//! Finish exactly once each. The driver treats the phaser as the sole
//! authority on time in classic mode; in fast-sync mode it may run ahead of
//! it but never behind.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// A phase of the DKG protocol. Phases are totally ordered and the driver's
/// current phase only ever increases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    Init,
    Deal,
    Response,
    Justification,
    Finish,
}

impl Phase {
    /// The phase following this one in protocol order, if any.
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Init => Some(Phase::Deal),
            Phase::Deal => Some(Phase::Response),
            Phase::Response => Some(Phase::Justification),
            Phase::Justification => Some(Phase::Finish),
            Phase::Finish => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Phase::Init => "init",
            Phase::Deal => "deal",
            Phase::Response => "response",
            Phase::Justification => "justification",
            Phase::Finish => "finish",
        };
        write!(f, "{}", s)
    }
}

/// Capacity of the phase channel: a producer can enqueue the full sequence
/// without ever blocking on the consumer.
pub const PHASE_BUFFER: usize = 4;

/// Source of phase transitions.
pub trait Phaser {
    /// Consumes the phaser and returns the stream of phase transitions in
    /// protocol order. The channel is buffered to at least [`PHASE_BUFFER`]
    /// entries and is closed once Finish has been emitted.
    fn next_phase(self) -> mpsc::Receiver<Phase>;
}

type Sleeper = Box<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send>;

/// A phaser that emits Deal immediately and each subsequent phase after a
/// fixed period. The sleep primitive is injectable so tests can run on a
/// virtual clock.
pub struct TimePhaser {
    period: Duration,
    sleeper: Sleeper,
}

fn tokio_sleeper(duration: Duration) -> BoxFuture<'static, ()> {
    Box::pin(tokio::time::sleep(duration))
}

impl TimePhaser {
    /// A phaser sleeping `period` between transitions on the tokio clock.
    pub fn new(period: Duration) -> Self {
        Self::with_sleeper(period, tokio_sleeper)
    }

    /// A phaser with a custom sleep primitive.
    pub fn with_sleeper<F>(period: Duration, sleeper: F) -> Self
    where
        F: Fn(Duration) -> BoxFuture<'static, ()> + Send + 'static,
    {
        Self {
            period,
            sleeper: Box::new(sleeper),
        }
    }
}

impl Phaser for TimePhaser {
    fn next_phase(self) -> mpsc::Receiver<Phase> {
        let (tx, rx) = mpsc::channel(PHASE_BUFFER);
        let Self { period, sleeper } = self;

        tokio::spawn(async move {
            if tx.send(Phase::Deal).await.is_err() {
                return;
            }
            for phase in [Phase::Response, Phase::Justification, Phase::Finish] {
                sleeper(period).await;
                if tx.send(phase).await.is_err() {
                    return;
                }
            }
        });

        rx
    }
}

/// A phaser advanced by an outside coordinator, e.g. a watcher keyed to
/// block heights. Construct it together with its [`PhaserHandle`] and hand
/// the phaser to the protocol.
pub struct ExternalPhaser {
    rx: mpsc::Receiver<Phase>,
}

/// The coordinator's side of an [`ExternalPhaser`].
pub struct PhaserHandle {
    tx: mpsc::Sender<Phase>,
    current: Phase,
}

impl ExternalPhaser {
    pub fn new() -> (PhaserHandle, ExternalPhaser) {
        let (tx, rx) = mpsc::channel(PHASE_BUFFER);
        (
            PhaserHandle {
                tx,
                current: Phase::Init,
            },
            ExternalPhaser { rx },
        )
    }
}

impl Phaser for ExternalPhaser {
    fn next_phase(self) -> mpsc::Receiver<Phase> {
        self.rx
    }
}

impl PhaserHandle {
    /// Enqueues the next phase in protocol order and returns it. Returns
    /// `None` once Finish has been emitted or when the phaser was dropped.
    /// Never blocks: the channel holds the full sequence.
    pub fn advance(&mut self) -> Option<Phase> {
        let next = self.current.next()?;
        self.tx.try_send(next).ok()?;
        self.current = next;
        Some(next)
    }
}

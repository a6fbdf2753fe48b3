//! The protocol driver: a single cooperative task that reacts to phase
//! transitions and incoming bundles, feeds the cryptographic engine, and
//! delivers exactly one terminal outcome.
//!
//! Two operating modes share the same transitions. The classic driver moves
//! only on phaser ticks and buffers bundles in arrival order. The fast-sync
//! driver additionally moves as soon as a phase's buffer holds a bundle from
//! every expected sender, whichever comes first; it buffers by sender index
//! and keeps the first bundle per sender. Fast-sync requires authentication,
//! since an unauthenticated peer could otherwise spam the buffers to force
//! an early transition.

use crate::auth::{Authenticator, SignatureScheme};
use crate::board::Board;
use crate::bundles::{
    AuthDealBundle, AuthJustificationBundle, AuthResponseBundle, Authenticated, Bundle, DKGOutput,
    DealBundle, JustificationBundle, ResponseBundle,
};
use crate::engine::{DKGEngine, ResponseOutcome};
use crate::group::{Curve, Group, Idx};
use crate::phaser::{Phase, Phaser};

use std::collections::{hash_map::Entry, HashMap};
use thiserror::Error;
use tokio::sync::mpsc::{Receiver, UnboundedReceiver};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Runtime options of a protocol instance. Engine-specific cryptographic
/// configuration stays with the engine, which arrives pre-constructed.
#[derive(Debug)]
pub struct Config<C: Curve, S> {
    /// The dealers. In a fresh DKG this list equals `new_nodes`.
    pub old_nodes: Group<C>,
    /// The share holders.
    pub new_nodes: Group<C>,
    /// This participant's long-term private signing key.
    pub longterm: C::Scalar,
    /// Advance phases on buffer completeness in addition to phaser ticks.
    /// Requires `auth` to be set.
    pub fast_sync: bool,
    /// The signature scheme authenticating bundles. `None` disables
    /// authentication entirely, e.g. when the board authenticates senders
    /// out of band.
    pub auth: Option<S>,
}

/// Errors rejecting a configuration at construction time. No task is
/// spawned when construction fails.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Fast-sync advances on message counts, which only an authenticated
    /// channel makes trustworthy.
    #[error("fast sync requires an authentication scheme")]
    FastSyncWithoutAuth,

    /// A protocol without dealers or without share holders is vacuous.
    #[error("{0} node list is empty")]
    EmptyNodeList(&'static str),
}

/// The terminal error of a protocol run. Only fatal failures surface here;
/// recoverable ones (bad inbound signatures, duplicates, late ticks) are
/// absorbed by the driver.
#[derive(Debug, Error)]
pub enum ProtocolError<E: std::error::Error + 'static> {
    /// The engine failed a phase computation.
    #[error("dkg engine: {0}")]
    Engine(#[source] E),
}

/// What the driver delivers on the result channel: the final output, or the
/// error that aborted the run.
pub type ProtocolOutcome<C, E> = Result<DKGOutput<C>, ProtocolError<E>>;

/// Drives one participant through a DKG round.
///
/// The protocol owns its engine and board exclusively and mutates all of its
/// state from a single task: callers create it, grab the outcome channel
/// with [`wait_end`](Protocol::wait_end), and then await
/// [`run`](Protocol::run) with the phaser of their choice.
pub struct Protocol<C, S, E, B>
where
    C: Curve,
    S: SignatureScheme<C>,
    E: DKGEngine<C>,
    B: Board<C>,
{
    engine: E,
    board: B,
    auth: Authenticator<C, S>,
    fast_sync: bool,
    old_n: usize,
    new_n: usize,
    n_idx: Idx,
    result_tx: Option<oneshot::Sender<ProtocolOutcome<C, E::Error>>>,
    result_rx: Option<oneshot::Receiver<ProtocolOutcome<C, E::Error>>>,
}

impl<C, S, E, B> Protocol<C, S, E, B>
where
    C: Curve,
    S: SignatureScheme<C>,
    E: DKGEngine<C>,
    B: Board<C>,
{
    /// Validates the configuration and assembles a driver around the given
    /// engine and board.
    pub fn new(config: Config<C, S>, engine: E, board: B) -> Result<Self, ConfigError> {
        if config.old_nodes.is_empty() {
            return Err(ConfigError::EmptyNodeList("old"));
        }
        if config.new_nodes.is_empty() {
            return Err(ConfigError::EmptyNodeList("new"));
        }

        let old_n = config.old_nodes.len();
        let new_n = config.new_nodes.len();
        let fast_sync = config.fast_sync;
        let auth = Authenticator::new(
            config.auth,
            config.longterm,
            config.old_nodes,
            config.new_nodes,
        );
        if fast_sync && !auth.enabled() {
            return Err(ConfigError::FastSyncWithoutAuth);
        }

        let n_idx = engine.node_index();
        let (result_tx, result_rx) = oneshot::channel();

        Ok(Self {
            engine,
            board,
            auth,
            fast_sync,
            old_n,
            new_n,
            n_idx,
            result_tx: Some(result_tx),
            result_rx: Some(result_rx),
        })
    }

    /// Returns the channel carrying the terminal outcome. The outcome is
    /// delivered at most once over the protocol's lifetime; if the driver is
    /// cancelled or stops silently, the channel closes without a value. A
    /// second call returns an already-closed channel.
    pub fn wait_end(&mut self) -> oneshot::Receiver<ProtocolOutcome<C, E::Error>> {
        self.result_rx
            .take()
            .unwrap_or_else(|| oneshot::channel().1)
    }

    /// Runs the protocol to termination, driven by the given phaser.
    pub async fn run<P: Phaser>(mut self, phaser: P) {
        let phases = phaser.next_phase();
        let deals_rx = self.board.incoming_deals();
        let resps_rx = self.board.incoming_responses();
        let justifs_rx = self.board.incoming_justifications();

        if self.fast_sync {
            self.run_fast_sync(phases, deals_rx, resps_rx, justifs_rx)
                .await
        } else {
            self.run_classic(phases, deals_rx, resps_rx, justifs_rx)
                .await
        }
    }

    /// The classic loop: transitions fire on phaser ticks only, buffers keep
    /// every accepted bundle in arrival order, duplicates included.
    async fn run_classic(
        mut self,
        mut phases: Receiver<Phase>,
        mut deals_rx: UnboundedReceiver<AuthDealBundle<C>>,
        mut resps_rx: UnboundedReceiver<AuthResponseBundle>,
        mut justifs_rx: UnboundedReceiver<AuthJustificationBundle<C>>,
    ) {
        let mut deals: Vec<DealBundle<C>> = Vec::new();
        let mut resps: Vec<ResponseBundle> = Vec::new();
        let mut justifs: Vec<JustificationBundle<C>> = Vec::new();

        loop {
            tokio::select! {
                tick = phases.recv() => {
                    let phase = match tick {
                        Some(phase) => phase,
                        None => {
                            debug!(idx = self.n_idx, "phaser closed before finish");
                            return;
                        }
                    };
                    info!(idx = self.n_idx, %phase, "phase transition");
                    let done = match phase {
                        Phase::Init => false,
                        Phase::Deal => self.send_deals().await,
                        Phase::Response => self.send_responses(&deals).await,
                        Phase::Justification => self.send_justifications(&resps).await,
                        Phase::Finish => {
                            self.finish(&justifs);
                            true
                        }
                    };
                    if done {
                        return;
                    }
                }
                Some(env) = deals_rx.recv() => {
                    if let Some(bundle) = self.accept_deal(env) {
                        deals.push(bundle);
                    }
                }
                Some(env) = resps_rx.recv() => {
                    if let Some(bundle) = self.accept_response(env) {
                        resps.push(bundle);
                    }
                }
                Some(env) = justifs_rx.recv() => {
                    if let Some(bundle) = self.accept_justification(env) {
                        justifs.push(bundle);
                    }
                }
            }
        }
    }

    /// The fast-sync loop: identical transitions, but buffers are keyed by
    /// sender and a phase also fires as soon as its buffer is complete.
    async fn run_fast_sync(
        mut self,
        mut phases: Receiver<Phase>,
        mut deals_rx: UnboundedReceiver<AuthDealBundle<C>>,
        mut resps_rx: UnboundedReceiver<AuthResponseBundle>,
        mut justifs_rx: UnboundedReceiver<AuthJustificationBundle<C>>,
    ) {
        let mut phase = Phase::Init;
        let mut deals: HashMap<Idx, DealBundle<C>> = HashMap::new();
        let mut resps: HashMap<Idx, ResponseBundle> = HashMap::new();
        let mut justifs: HashMap<Idx, JustificationBundle<C>> = HashMap::new();

        loop {
            tokio::select! {
                tick = phases.recv() => {
                    let target = match tick {
                        Some(target) => target,
                        None => {
                            debug!(idx = self.n_idx, "phaser closed before finish");
                            return;
                        }
                    };
                    if self.advance(target, &mut phase, &deals, &resps, &justifs).await {
                        return;
                    }
                }
                Some(env) = deals_rx.recv() => {
                    if self.buffer(&mut deals, self.accept_deal(env))
                        && deals.len() == self.old_n
                        && self.advance(Phase::Response, &mut phase, &deals, &resps, &justifs).await
                    {
                        return;
                    }
                }
                Some(env) = resps_rx.recv() => {
                    if self.buffer(&mut resps, self.accept_response(env))
                        && resps.len() == self.new_n
                        && self
                            .advance(Phase::Justification, &mut phase, &deals, &resps, &justifs)
                            .await
                    {
                        return;
                    }
                }
                Some(env) = justifs_rx.recv() => {
                    if self.buffer(&mut justifs, self.accept_justification(env))
                        && justifs.len() == self.old_n
                        && self.advance(Phase::Finish, &mut phase, &deals, &resps, &justifs).await
                    {
                        return;
                    }
                }
            }
        }
    }

    /// Moves the state machine forward to `target`, executing every
    /// transition in between exactly once. Stale triggers for an already
    /// reached phase are ignored. Returns whether the protocol terminated.
    async fn advance(
        &mut self,
        target: Phase,
        current: &mut Phase,
        deals: &HashMap<Idx, DealBundle<C>>,
        resps: &HashMap<Idx, ResponseBundle>,
        justifs: &HashMap<Idx, JustificationBundle<C>>,
    ) -> bool {
        if *current >= target {
            debug!(idx = self.n_idx, phase = %*current, %target, "ignoring stale transition");
            return false;
        }

        while *current < target {
            let next = match current.next() {
                Some(next) => next,
                None => return false,
            };
            *current = next;
            info!(idx = self.n_idx, phase = %next, "phase transition");

            let done = match next {
                Phase::Init => false,
                Phase::Deal => self.send_deals().await,
                Phase::Response => self.send_responses(&sorted_values(deals)).await,
                Phase::Justification => self.send_justifications(&sorted_values(resps)).await,
                Phase::Finish => {
                    self.finish(&sorted_values(justifs));
                    true
                }
            };
            if done {
                return true;
            }
        }

        false
    }

    /// Keeps the first bundle per sender; later ones are dropped. Returns
    /// whether the buffer grew.
    fn buffer<T: Bundle>(&self, buffer: &mut HashMap<Idx, T>, bundle: Option<T>) -> bool {
        let bundle = match bundle {
            Some(bundle) => bundle,
            None => return false,
        };
        match buffer.entry(bundle.index()) {
            Entry::Vacant(slot) => {
                slot.insert(bundle);
                true
            }
            Entry::Occupied(slot) => {
                debug!(idx = self.n_idx, sender = slot.key(), "dropping duplicate bundle");
                false
            }
        }
    }

    fn accept_deal(&self, mut env: AuthDealBundle<C>) -> Option<DealBundle<C>> {
        match self.auth.verify_deal(&mut env) {
            Ok(()) => Some(env.bundle),
            Err(err) => {
                debug!(idx = self.n_idx, dealer = env.bundle.index(), %err, "dropping deal bundle");
                None
            }
        }
    }

    fn accept_response(&self, mut env: AuthResponseBundle) -> Option<ResponseBundle> {
        match self.auth.verify_response(&mut env) {
            Ok(()) => Some(env.bundle),
            Err(err) => {
                debug!(idx = self.n_idx, holder = env.bundle.index(), %err, "dropping response bundle");
                None
            }
        }
    }

    fn accept_justification(
        &self,
        mut env: AuthJustificationBundle<C>,
    ) -> Option<JustificationBundle<C>> {
        match self.auth.verify_justification(&mut env) {
            Ok(()) => Some(env.bundle),
            Err(err) => {
                debug!(idx = self.n_idx, dealer = env.bundle.index(), %err, "dropping justification bundle");
                None
            }
        }
    }

    /// Deal transition: emit our encrypted shares, unless we have none to
    /// give. Returns whether the protocol terminated.
    async fn send_deals(&mut self) -> bool {
        if !self.engine.can_issue() {
            debug!(idx = self.n_idx, "not a dealer, nothing to deal");
            return false;
        }

        let bundle = match self.engine.deals() {
            Ok(bundle) => bundle,
            Err(err) => return self.fatal(err),
        };

        match self.sign(bundle) {
            Some(env) => {
                if let Err(err) = self.board.push_deals(env).await {
                    warn!(idx = self.n_idx, ?err, "pushing deal bundle failed");
                }
                false
            }
            None => true,
        }
    }

    /// Response transition: hand the accumulated deals to the engine and
    /// publish its verdicts, if it has any.
    async fn send_responses(&mut self, deals: &[DealBundle<C>]) -> bool {
        let bundle = match self.engine.process_deals(deals) {
            Ok(Some(bundle)) => bundle,
            Ok(None) => {
                debug!(idx = self.n_idx, "no responses to publish");
                return false;
            }
            Err(err) => return self.fatal(err),
        };

        match self.sign(bundle) {
            Some(env) => {
                if let Err(err) = self.board.push_responses(env).await {
                    warn!(idx = self.n_idx, ?err, "pushing response bundle failed");
                }
                false
            }
            None => true,
        }
    }

    /// Justification transition: the engine either concludes the protocol
    /// early, or tells us which complaints to answer.
    async fn send_justifications(&mut self, resps: &[ResponseBundle]) -> bool {
        match self.engine.process_responses(resps) {
            Ok(ResponseOutcome::Output(output)) => {
                info!(idx = self.n_idx, "every deal accepted, finishing early");
                self.deliver(Ok(output));
                true
            }
            Ok(ResponseOutcome::GoToJustifications(None)) => false,
            Ok(ResponseOutcome::GoToJustifications(Some(bundle))) => match self.sign(bundle) {
                Some(env) => {
                    if let Err(err) = self.board.push_justifications(env).await {
                        warn!(idx = self.n_idx, ?err, "pushing justification bundle failed");
                    }
                    false
                }
                None => true,
            },
            Err(err) => self.fatal(err),
        }
    }

    /// Finish transition: the engine assembles the final share from the
    /// accumulated justifications, or fails the run.
    fn finish(&mut self, justifs: &[JustificationBundle<C>]) {
        match self.engine.process_justifications(justifs) {
            Ok(output) => self.deliver(Ok(output)),
            Err(err) => {
                self.fatal(err);
            }
        }
    }

    /// Signs an outgoing bundle. A signing failure stops the driver without
    /// emitting a partial bundle or an outcome.
    fn sign<T: Bundle>(&self, mut bundle: T) -> Option<Authenticated<T>> {
        match self.auth.sign(&mut bundle) {
            Ok(signature) => Some(Authenticated::new(bundle, signature)),
            Err(err) => {
                error!(idx = self.n_idx, %err, "stopping: could not sign outgoing bundle");
                None
            }
        }
    }

    fn fatal(&mut self, err: E::Error) -> bool {
        error!(idx = self.n_idx, %err, "dkg engine failed, aborting");
        self.deliver(Err(ProtocolError::Engine(err)));
        true
    }

    fn deliver(&mut self, outcome: ProtocolOutcome<C, E::Error>) {
        if let Some(tx) = self.result_tx.take() {
            if tx.send(outcome).is_err() {
                debug!(idx = self.n_idx, "result receiver dropped before delivery");
            }
        }
    }
}

/// Snapshot of a keyed buffer in sender order, for a deterministic hand-off
/// to the engine.
fn sorted_values<T: Bundle>(buffer: &HashMap<Idx, T>) -> Vec<T> {
    let mut values: Vec<T> = buffer.values().cloned().collect();
    values.sort_by_key(|bundle| bundle.index());
    values
}

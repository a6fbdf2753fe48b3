//! Shared fixtures: a toy curve whose elements are plain integers, a
//! hash-binding signature scheme, an in-memory broadcast board, and a
//! scripted engine whose behavior each scenario can tweak.

use crate::auth::SignatureScheme;
use crate::board::Board;
use crate::bundles::{
    AuthDealBundle, AuthJustificationBundle, AuthResponseBundle, DKGOutput, Deal, DealBundle,
    DistKeyShare, Justification, JustificationBundle, Response, ResponseBundle, Share, Status,
};
use crate::engine::{DKGEngine, ResponseOutcome};
use crate::group::{Curve, Element, Group, Idx, Node};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

/// A scalar of the toy curve: a bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestScalar(pub u64);

/// A point of the toy curve. "Exponentiation" of the generator is the
/// identity, so the public key of `TestScalar(x)` is `TestPoint(x)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPoint(pub u64);

impl Element for TestScalar {
    fn marshal(&self) -> Vec<u8> {
        self.0.to_be_bytes().to_vec()
    }
}

impl Element for TestPoint {
    fn marshal(&self) -> Vec<u8> {
        self.0.to_be_bytes().to_vec()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestCurve;

impl Curve for TestCurve {
    type Scalar = TestScalar;
    type Point = TestPoint;
}

/// Deterministic keypair for participant `i`.
pub fn test_keypair(i: Idx) -> (TestScalar, TestPoint) {
    (TestScalar(i as u64 + 1), TestPoint(i as u64 + 1))
}

/// A group of `n` participants with the default threshold.
pub fn test_group(n: usize) -> Group<TestCurve> {
    Group::from_list(
        (0..n as Idx)
            .map(|i| Node::new(i, test_keypair(i).1))
            .collect(),
    )
}

/// A group of `n` participants with an explicit threshold.
pub fn test_group_t(n: usize, t: usize) -> Group<TestCurve> {
    Group::new(
        (0..n as Idx)
            .map(|i| Node::new(i, test_keypair(i).1))
            .collect(),
        t,
    )
    .unwrap()
}

/// The deterministic deal bundle dealer `dealer` would produce for `n`
/// share holders.
pub fn test_deal_bundle(dealer: Idx, n: usize) -> DealBundle<TestCurve> {
    DealBundle {
        dealer_idx: dealer,
        deals: (0..n as Idx)
            .map(|holder| Deal {
                share_idx: holder,
                encrypted_share: vec![dealer as u8, holder as u8],
            })
            .collect(),
        public: vec![
            TestPoint(1_000 + dealer as u64),
            TestPoint(2_000 + dealer as u64),
        ],
    }
}

#[derive(Debug, Error)]
#[error("signature mismatch")]
pub struct TestSchemeError;

/// A scheme binding the signature to the signer's public key and the
/// message: `sig = H(tag || pubkey || msg)`. No security, full determinism.
#[derive(Debug, Clone, Copy)]
pub struct TestScheme;

const SCHEME_TAG: &[u8] = b"dkg-driver-test-scheme";

fn tag_sig(public: &TestPoint, msg: &[u8]) -> Vec<u8> {
    let mut h = Sha256::new();
    h.update(SCHEME_TAG);
    h.update(public.marshal());
    h.update(msg);
    h.finalize().to_vec()
}

impl SignatureScheme<TestCurve> for TestScheme {
    type Error = TestSchemeError;

    fn sign(&self, private: &TestScalar, msg: &[u8]) -> Result<Vec<u8>, TestSchemeError> {
        Ok(tag_sig(&TestPoint(private.0), msg))
    }

    fn verify(&self, public: &TestPoint, msg: &[u8], sig: &[u8]) -> Result<(), TestSchemeError> {
        if sig == tag_sig(public, msg).as_slice() {
            Ok(())
        } else {
            Err(TestSchemeError)
        }
    }
}

struct NetInner<C: Curve> {
    deals: Vec<UnboundedSender<AuthDealBundle<C>>>,
    resps: Vec<UnboundedSender<AuthResponseBundle>>,
    justifs: Vec<UnboundedSender<AuthJustificationBundle<C>>>,
    deal_pushes: usize,
    resp_pushes: usize,
    justif_pushes: usize,
}

/// An in-memory broadcast network. Every pushed envelope is echoed to all
/// joined boards, the pusher included.
pub struct TestNet<C: Curve> {
    inner: Rc<RefCell<NetInner<C>>>,
}

impl<C: Curve> TestNet<C> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(NetInner {
                deals: Vec::new(),
                resps: Vec::new(),
                justifs: Vec::new(),
                deal_pushes: 0,
                resp_pushes: 0,
                justif_pushes: 0,
            })),
        }
    }

    /// Registers a new participant and returns its board.
    pub fn join(&self) -> TestBoard<C> {
        let (deal_tx, deal_rx) = unbounded_channel();
        let (resp_tx, resp_rx) = unbounded_channel();
        let (justif_tx, justif_rx) = unbounded_channel();

        let mut inner = self.inner.borrow_mut();
        inner.deals.push(deal_tx);
        inner.resps.push(resp_tx);
        inner.justifs.push(justif_tx);

        TestBoard {
            net: Rc::clone(&self.inner),
            deals: Some(deal_rx),
            resps: Some(resp_rx),
            justifs: Some(justif_rx),
        }
    }

    /// Delivers an envelope to everyone without it counting as a push, the
    /// way an attacker outside the node lists would.
    pub fn inject_deal(&self, env: AuthDealBundle<C>) {
        for tx in &self.inner.borrow().deals {
            let _ = tx.send(env.clone());
        }
    }

    pub fn deal_pushes(&self) -> usize {
        self.inner.borrow().deal_pushes
    }

    pub fn response_pushes(&self) -> usize {
        self.inner.borrow().resp_pushes
    }

    pub fn justification_pushes(&self) -> usize {
        self.inner.borrow().justif_pushes
    }
}

/// One participant's view of the [`TestNet`].
pub struct TestBoard<C: Curve> {
    net: Rc<RefCell<NetInner<C>>>,
    deals: Option<UnboundedReceiver<AuthDealBundle<C>>>,
    resps: Option<UnboundedReceiver<AuthResponseBundle>>,
    justifs: Option<UnboundedReceiver<AuthJustificationBundle<C>>>,
}

#[async_trait(?Send)]
impl<C: Curve> Board<C> for TestBoard<C> {
    type Error = ();

    async fn push_deals(&mut self, bundle: AuthDealBundle<C>) -> Result<(), Self::Error> {
        let mut net = self.net.borrow_mut();
        net.deal_pushes += 1;
        for tx in &net.deals {
            let _ = tx.send(bundle.clone());
        }
        Ok(())
    }

    async fn push_responses(&mut self, bundle: AuthResponseBundle) -> Result<(), Self::Error> {
        let mut net = self.net.borrow_mut();
        net.resp_pushes += 1;
        for tx in &net.resps {
            let _ = tx.send(bundle.clone());
        }
        Ok(())
    }

    async fn push_justifications(
        &mut self,
        bundle: AuthJustificationBundle<C>,
    ) -> Result<(), Self::Error> {
        let mut net = self.net.borrow_mut();
        net.justif_pushes += 1;
        for tx in &net.justifs {
            let _ = tx.send(bundle.clone());
        }
        Ok(())
    }

    fn incoming_deals(&mut self) -> UnboundedReceiver<AuthDealBundle<C>> {
        self.deals.take().expect("deal ingress already taken")
    }

    fn incoming_responses(&mut self) -> UnboundedReceiver<AuthResponseBundle> {
        self.resps.take().expect("response ingress already taken")
    }

    fn incoming_justifications(&mut self) -> UnboundedReceiver<AuthJustificationBundle<C>> {
        self.justifs
            .take()
            .expect("justification ingress already taken")
    }
}

/// What a scripted engine observed during a run, for assertions after the
/// fact. Each `*_in` field records how many bundles the corresponding phase
/// received, or `None` if the phase never ran.
#[derive(Debug, Default)]
pub struct CallLog {
    pub deals_in: Option<usize>,
    pub resps_in: Option<usize>,
    pub justifs_in: Option<usize>,
    pub deals_at: Option<Instant>,
}

#[derive(Debug, Error)]
#[error("scripted engine failure")]
pub struct TestEngineError;

/// A deterministic engine faking the cryptography: deals carry predictable
/// payloads, responses succeed unless scripted to complain, and the final
/// key commitments are the coefficient-wise sum of every dealer's public
/// polynomial, so honest participants end up with identical commitments.
pub struct TestEngine {
    index: Idx,
    n: usize,
    threshold: usize,
    pub can_issue: bool,
    /// Converge at response processing when nobody complained.
    pub early_convergence: bool,
    /// Dealers this participant files complaints against.
    pub complain_against: Vec<Idx>,
    /// Fail the run at `process_deals`.
    pub fail_deal_processing: bool,
    publics: BTreeMap<Idx, Vec<TestPoint>>,
    log: Rc<RefCell<CallLog>>,
}

impl TestEngine {
    pub fn new(index: Idx, n: usize, threshold: usize) -> Self {
        Self {
            index,
            n,
            threshold,
            can_issue: true,
            early_convergence: false,
            complain_against: Vec::new(),
            fail_deal_processing: false,
            publics: BTreeMap::new(),
            log: Rc::new(RefCell::new(CallLog::default())),
        }
    }

    /// Handle onto the engine's observations, usable after the protocol has
    /// consumed the engine itself.
    pub fn log(&self) -> Rc<RefCell<CallLog>> {
        Rc::clone(&self.log)
    }

    fn output(&self) -> DKGOutput<TestCurve> {
        let mut commits = vec![TestPoint(0), TestPoint(0)];
        for public in self.publics.values() {
            for (i, coeff) in public.iter().enumerate() {
                commits[i].0 = commits[i].0.wrapping_add(coeff.0);
            }
        }

        DKGOutput {
            qual: test_group_t(self.n, self.threshold),
            key: DistKeyShare {
                commits,
                share: Share {
                    index: self.index,
                    private: TestScalar(7_000 + self.index as u64),
                },
            },
        }
    }
}

impl DKGEngine<TestCurve> for TestEngine {
    type Error = TestEngineError;

    fn can_issue(&self) -> bool {
        self.can_issue
    }

    fn node_index(&self) -> Idx {
        self.index
    }

    fn deals(&mut self) -> Result<DealBundle<TestCurve>, TestEngineError> {
        Ok(test_deal_bundle(self.index, self.n))
    }

    fn process_deals(
        &mut self,
        bundles: &[DealBundle<TestCurve>],
    ) -> Result<Option<ResponseBundle>, TestEngineError> {
        {
            let mut log = self.log.borrow_mut();
            log.deals_in = Some(bundles.len());
            log.deals_at = Some(Instant::now());
        }

        if self.fail_deal_processing {
            return Err(TestEngineError);
        }

        for bundle in bundles {
            self.publics.insert(bundle.dealer_idx, bundle.public.clone());
        }

        let responses = (0..self.n as Idx)
            .map(|dealer| Response {
                dealer_idx: dealer,
                status: if self.complain_against.contains(&dealer) {
                    Status::Complaint
                } else {
                    Status::Success
                },
            })
            .collect();

        Ok(Some(ResponseBundle {
            share_idx: self.index,
            responses,
        }))
    }

    fn process_responses(
        &mut self,
        bundles: &[ResponseBundle],
    ) -> Result<ResponseOutcome<TestCurve>, TestEngineError> {
        self.log.borrow_mut().resps_in = Some(bundles.len());

        let complaints: Vec<(Idx, Idx)> = bundles
            .iter()
            .flat_map(|bundle| {
                bundle
                    .responses
                    .iter()
                    .filter(|resp| !resp.status.is_success())
                    .map(move |resp| (bundle.share_idx, resp.dealer_idx))
            })
            .collect();

        if complaints.is_empty() {
            if self.early_convergence {
                return Ok(ResponseOutcome::Output(self.output()));
            }
            return Ok(ResponseOutcome::GoToJustifications(None));
        }

        let mine: Vec<Justification<TestCurve>> = complaints
            .iter()
            .filter(|&&(_, dealer)| dealer == self.index)
            .map(|&(holder, _)| Justification {
                share_idx: holder,
                share: TestScalar(9_000 + holder as u64),
            })
            .collect();

        if mine.is_empty() {
            Ok(ResponseOutcome::GoToJustifications(None))
        } else {
            Ok(ResponseOutcome::GoToJustifications(Some(
                JustificationBundle {
                    dealer_idx: self.index,
                    justifications: mine,
                },
            )))
        }
    }

    fn process_justifications(
        &mut self,
        bundles: &[JustificationBundle<TestCurve>],
    ) -> Result<DKGOutput<TestCurve>, TestEngineError> {
        self.log.borrow_mut().justifs_in = Some(bundles.len());
        Ok(self.output())
    }
}

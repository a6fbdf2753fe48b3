//! The contract with the cryptographic engine.
//!
//! The engine owns every piece of actual cryptography: creating and
//! encrypting deals, validating them, turning complaints into
//! justifications and assembling the final share. The driver only decides
//! *when* each of these happens and with which accumulated input.

use crate::bundles::{DealBundle, DKGOutput, JustificationBundle, ResponseBundle};
use crate::group::{Curve, Idx};

/// What the engine decided after processing the responses of a round.
#[derive(Debug, Clone)]
pub enum ResponseOutcome<C: Curve> {
    /// Every deal was accepted: the protocol converged early and this is the
    /// final output.
    Output(DKGOutput<C>),

    /// Complaints were filed. The protocol continues into the justification
    /// phase; the bundle is present if complaints were filed against this
    /// participant's deals.
    GoToJustifications(Option<JustificationBundle<C>>),
}

/// The phased cryptographic engine consumed by the driver. Each `process_*`
/// method is invoked exactly once per protocol run, with every bundle
/// buffered for that phase.
pub trait DKGEngine<C: Curve> {
    /// Error raised by a phase computation. Any such error is fatal for the
    /// whole protocol run.
    type Error: std::error::Error + 'static;

    /// Whether this participant contributes deals. False for a new joiner in
    /// a resharing, which only receives shares.
    fn can_issue(&self) -> bool;

    /// This participant's index in the share holder list, for logging.
    fn node_index(&self) -> Idx;

    /// Creates this dealer's bundle of encrypted shares.
    fn deals(&mut self) -> Result<DealBundle<C>, Self::Error>;

    /// Processes the accumulated deal bundles. Returns the responses to
    /// broadcast, or `None` when this participant has nothing to say (e.g.
    /// it is not a share holder).
    fn process_deals(
        &mut self,
        bundles: &[DealBundle<C>],
    ) -> Result<Option<ResponseBundle>, Self::Error>;

    /// Processes the accumulated response bundles, either concluding the
    /// protocol early or moving it to the justification phase.
    fn process_responses(
        &mut self,
        bundles: &[ResponseBundle],
    ) -> Result<ResponseOutcome<C>, Self::Error>;

    /// Processes the accumulated justification bundles and produces the
    /// final output, or fails the protocol.
    fn process_justifications(
        &mut self,
        bundles: &[JustificationBundle<C>],
    ) -> Result<DKGOutput<C>, Self::Error>;
}

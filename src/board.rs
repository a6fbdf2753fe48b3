//! # Board
//!
//! A board is where DKG participants publish their signed bundles for the
//! corresponding phase, and where the bundles of the other participants
//! arrive from.

use crate::bundles::{AuthDealBundle, AuthJustificationBundle, AuthResponseBundle};
use crate::group::Curve;

use async_trait::async_trait;
use std::fmt::Debug;
use tokio::sync::mpsc::UnboundedReceiver;

/// Trait which must be implemented by the transport carrying the protocol.
///
/// Pushes broadcast an already-signed envelope to the appropriate recipient
/// set, *including the sender itself*: the driver relies on its own bundle
/// being echoed back through the ingress streams to land in its local
/// buffer. Pushes are fire-and-forget from the driver's point of view; a
/// failed push is logged and the protocol continues.
///
/// Ingress streams are of indefinite length. The driver takes each receiver
/// exactly once, at startup, and stops consuming them once it terminates.
#[async_trait(?Send)]
pub trait Board<C>
where
    C: Curve,
{
    /// Error raised when trying to publish data to the board
    type Error: Debug;

    /// Broadcasts a signed deal bundle to all share holders
    async fn push_deals(&mut self, bundle: AuthDealBundle<C>) -> Result<(), Self::Error>;

    /// Broadcasts a signed response bundle to all participants
    async fn push_responses(&mut self, bundle: AuthResponseBundle) -> Result<(), Self::Error>;

    /// Broadcasts a signed justification bundle to all share holders
    async fn push_justifications(
        &mut self,
        bundle: AuthJustificationBundle<C>,
    ) -> Result<(), Self::Error>;

    /// The stream of deal envelopes arriving from the dealers
    fn incoming_deals(&mut self) -> UnboundedReceiver<AuthDealBundle<C>>;

    /// The stream of response envelopes arriving from the share holders
    fn incoming_responses(&mut self) -> UnboundedReceiver<AuthResponseBundle>;

    /// The stream of justification envelopes arriving from the dealers
    fn incoming_justifications(&mut self) -> UnboundedReceiver<AuthJustificationBundle<C>>;
}

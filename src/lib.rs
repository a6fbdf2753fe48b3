//! # DKG Driver
//!
//! The orchestration core of a distributed key generation protocol: a
//! finite-state driver that coordinates the phased exchange of deals,
//! responses and justifications among participants, authenticates every
//! bundle, feeds the accumulated bundles to a cryptographic engine at each
//! transition, and delivers either a final share with the qualified set or a
//! terminal error.
//!
//! The driver runs in one of two modes. The classic driver advances only on
//! the ticks of a [`Phaser`]; the fast-sync driver also advances as soon as
//! a phase has received a bundle from every expected sender, which requires
//! authentication to be safe. The cryptography itself ([`DKGEngine`]), the
//! transport ([`Board`]), the clock ([`Phaser`]) and the signature scheme
//! are external collaborators consumed through traits.

/// Verification and production of bundle signatures
mod auth;
pub use auth::{AuthError, Authenticator, SignatureScheme};

/// Trait implemented by the transport carrying signed bundles
mod board;
pub use board::Board;

/// Message bundles, their signed envelopes and canonical hashing
mod bundles;
pub use bundles::{
    AuthDealBundle, AuthJustificationBundle, AuthResponseBundle, Authenticated, Bundle, DKGOutput,
    Deal, DealBundle, DistKeyShare, Justification, JustificationBundle, Packet, Response,
    ResponseBundle, Share, Status,
};

/// The contract with the cryptographic engine
mod engine;
pub use engine::{DKGEngine, ResponseOutcome};

/// Participant identities and the seam to the curve primitives
mod group;
pub use group::{default_threshold, minimum_threshold, Curve, Element, Group, GroupError, Idx, Node};

/// The phase clock
mod phaser;
pub use phaser::{ExternalPhaser, Phase, Phaser, PhaserHandle, TimePhaser, PHASE_BUFFER};

/// The protocol state machine in its two operating modes
mod protocol;
pub use protocol::{Config, ConfigError, Protocol, ProtocolError, ProtocolOutcome};

#[cfg(test)]
mod test_helpers;

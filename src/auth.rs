//! Verification and production of bundle signatures.
//!
//! Every bundle travels with a signature over its canonical hash. The
//! authenticator knows both node lists and resolves the signing key from the
//! sender's index: deals and justifications are signed by dealers (old
//! nodes), responses by share holders (new nodes). Authentication is
//! optional; a board with out-of-band authentication (e.g. a smart contract
//! checking transaction senders) can run the protocol without a scheme.

use crate::bundles::{
    AuthDealBundle, AuthJustificationBundle, AuthResponseBundle, Authenticated, Bundle, Packet,
};
use crate::group::{Curve, Group, Idx};

use std::fmt::Debug;
use thiserror::Error;
use tracing::debug;

/// The signature scheme used to authenticate bundles. Signatures are opaque
/// byte strings; the scheme decides their format.
pub trait SignatureScheme<C: Curve>: Debug {
    /// Error produced when signing or verifying a message
    type Error: std::error::Error + Send + Sync + 'static;

    /// Signs the message with the provided private key
    fn sign(&self, private: &C::Scalar, msg: &[u8]) -> Result<Vec<u8>, Self::Error>;

    /// Verifies that the signature on the provided message was produced by
    /// the public key
    fn verify(&self, public: &C::Point, msg: &[u8], sig: &[u8]) -> Result<(), Self::Error>;
}

/// Errors raised while authenticating bundles. Inbound failures are absorbed
/// by the driver; only signing failures stop it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The sender's index does not appear in the node list it claims to
    /// belong to.
    #[error("sender index {0} is not in the expected node list")]
    UnknownSender(Idx),

    /// The signature does not verify under the sender's registered key.
    #[error("signature does not verify under the sender's public key")]
    BadSignature,

    /// The outgoing bundle could not be signed with the long-term key.
    #[error("could not sign outgoing bundle")]
    SignatureFailed,
}

/// Verifies incoming envelopes and signs outgoing bundles, keyed by the
/// sender's index into the appropriate node list. With no scheme configured,
/// verification always succeeds and outgoing signatures are empty.
#[derive(Debug)]
pub struct Authenticator<C: Curve, S> {
    scheme: Option<S>,
    longterm: C::Scalar,
    old_nodes: Group<C>,
    new_nodes: Group<C>,
}

impl<C, S> Authenticator<C, S>
where
    C: Curve,
    S: SignatureScheme<C>,
{
    pub fn new(
        scheme: Option<S>,
        longterm: C::Scalar,
        old_nodes: Group<C>,
        new_nodes: Group<C>,
    ) -> Self {
        Self {
            scheme,
            longterm,
            old_nodes,
            new_nodes,
        }
    }

    /// Whether a signature scheme is configured.
    pub fn enabled(&self) -> bool {
        self.scheme.is_some()
    }

    /// Verifies a deal envelope against the dealer's key in the old nodes.
    pub fn verify_deal(&self, env: &mut AuthDealBundle<C>) -> Result<(), AuthError> {
        self.check(&self.old_nodes, env)
    }

    /// Verifies a response envelope against the share holder's key in the
    /// new nodes.
    pub fn verify_response(&self, env: &mut AuthResponseBundle) -> Result<(), AuthError> {
        self.check(&self.new_nodes, env)
    }

    /// Verifies a justification envelope against the dealer's key in the old
    /// nodes.
    pub fn verify_justification(
        &self,
        env: &mut AuthJustificationBundle<C>,
    ) -> Result<(), AuthError> {
        self.check(&self.old_nodes, env)
    }

    /// Verifies any envelope kind, dispatching on the packet tag. Hashing
    /// canonicalizes the carried bundle in place.
    pub fn verify_packet(&self, packet: &mut Packet<C>) -> Result<(), AuthError> {
        match packet {
            Packet::Deal(env) => self.check(&self.old_nodes, env),
            Packet::Response(env) => self.check(&self.new_nodes, env),
            Packet::Justification(env) => self.check(&self.old_nodes, env),
        }
    }

    /// Signs the bundle's canonical hash with the long-term key. Returns the
    /// empty signature when authentication is disabled.
    pub fn sign<B: Bundle>(&self, bundle: &mut B) -> Result<Vec<u8>, AuthError> {
        let scheme = match &self.scheme {
            Some(scheme) => scheme,
            None => return Ok(Vec::new()),
        };

        let hash = bundle.hash();
        scheme.sign(&self.longterm, &hash).map_err(|err| {
            debug!(%err, "signing bundle hash failed");
            AuthError::SignatureFailed
        })
    }

    fn check<B: Bundle>(
        &self,
        list: &Group<C>,
        env: &mut Authenticated<B>,
    ) -> Result<(), AuthError> {
        let scheme = match &self.scheme {
            Some(scheme) => scheme,
            None => return Ok(()),
        };

        let idx = env.bundle.index();
        let node = list.node(idx).ok_or(AuthError::UnknownSender(idx))?;

        let hash = env.bundle.hash();
        scheme
            .verify(node.key(), &hash, &env.signature)
            .map_err(|err| {
                debug!(sender = idx, %err, "bundle signature rejected");
                AuthError::BadSignature
            })
    }
}

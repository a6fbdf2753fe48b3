//! The typed message bundles exchanged during a DKG round, their signed
//! envelopes, and the canonical hash each signature covers.
//!
//! The hash layout is fixed by the protocol and must be byte-identical
//! across implementations: indices are serialized as big-endian `u32`,
//! group elements through [`Element::marshal`], and sub-entries are sorted
//! by their index key before digesting. The sort is performed in place, so
//! hashing a bundle canonicalizes it.

use crate::group::{Curve, Element, Group, Idx};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Debug;

/// One encrypted share directed at a specific share holder. The ciphertext
/// is opaque to the driver; only the engine can open it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    /// The index of the share holder this share is destined to
    pub share_idx: Idx,
    /// The encrypted evaluation of the dealer's secret polynomial
    pub encrypted_share: Vec<u8>,
}

/// All deals a dealer creates during the first phase of the protocol,
/// together with the commitment to its secret polynomial. `public[0]` is the
/// dealer's contribution to the group key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "C::Point: DeserializeOwned")]
pub struct DealBundle<C: Curve> {
    /// The dealer's index
    pub dealer_idx: Idx,
    /// The encrypted shares created by the dealer, one per share holder
    pub deals: Vec<Deal>,
    /// The coefficients of the dealer's public polynomial. The order is the
    /// polynomial index and is never sorted.
    pub public: Vec<C::Point>,
}

/// A `Status` holds the claim of validity or not of a share from the point
/// of view of the share holder. It is sent inside a `Response` during the
/// second phase of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Success,
    Complaint,
}

impl From<bool> for Status {
    fn from(b: bool) -> Self {
        if b {
            Status::Success
        } else {
            Status::Complaint
        }
    }
}

impl Status {
    pub fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }

    /// The single-byte wire form used in the canonical hash.
    fn to_byte(self) -> u8 {
        match self {
            Status::Success => 0x01,
            Status::Complaint => 0x00,
        }
    }
}

/// A share holder's accept or complain verdict for a single dealer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// The index of the dealer that created the share
    pub dealer_idx: Idx,
    /// Whether the share verified against the dealer's public polynomial
    pub status: Status,
}

/// All responses from one share holder, covering every dealer it received a
/// deal from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBundle {
    /// The index of the share holder that issued these responses
    pub share_idx: Idx,
    /// A response per dealer
    pub responses: Vec<Response>,
}

/// A `Justification` reveals, in plaintext, the share of a holder that
/// complained about its deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "C::Scalar: DeserializeOwned")]
pub struct Justification<C: Curve> {
    /// The complaining share holder's index
    pub share_idx: Idx,
    /// The plaintext share
    pub share: C::Scalar,
}

/// All justifications a dealer issues in answer to the complaints filed
/// against its deals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "C::Scalar: DeserializeOwned")]
pub struct JustificationBundle<C: Curve> {
    /// The dealer's index
    pub dealer_idx: Idx,
    /// One justification per complaining share holder
    pub justifications: Vec<Justification<C>>,
}

/// Common surface of the three bundle kinds: the sender's index in its node
/// list, and the canonical hash that gets signed.
pub trait Bundle: Clone + Debug + Serialize + DeserializeOwned {
    /// The index of the sender of this bundle. Dealer bundles index into the
    /// old nodes, response bundles into the new nodes.
    fn index(&self) -> Idx;

    /// Sorts the bundle's sub-entries into canonical order, then returns the
    /// SHA-256 digest of the canonical byte layout. The reordering is
    /// observable on the bundle.
    fn hash(&mut self) -> [u8; 32];
}

impl<C: Curve> Bundle for DealBundle<C> {
    fn index(&self) -> Idx {
        self.dealer_idx
    }

    fn hash(&mut self) -> [u8; 32] {
        self.deals.sort_by_key(|d| d.share_idx);

        let mut h = Sha256::new();
        h.update(self.dealer_idx.to_be_bytes());
        for coeff in &self.public {
            h.update(coeff.marshal());
        }
        for deal in &self.deals {
            h.update(deal.share_idx.to_be_bytes());
            h.update(&deal.encrypted_share);
        }
        h.finalize().into()
    }
}

impl Bundle for ResponseBundle {
    fn index(&self) -> Idx {
        self.share_idx
    }

    fn hash(&mut self) -> [u8; 32] {
        self.responses.sort_by_key(|r| r.dealer_idx);

        let mut h = Sha256::new();
        h.update(self.share_idx.to_be_bytes());
        for resp in &self.responses {
            h.update(resp.dealer_idx.to_be_bytes());
            h.update([resp.status.to_byte()]);
        }
        h.finalize().into()
    }
}

impl<C: Curve> Bundle for JustificationBundle<C> {
    fn index(&self) -> Idx {
        self.dealer_idx
    }

    fn hash(&mut self) -> [u8; 32] {
        self.justifications.sort_by_key(|j| j.share_idx);

        let mut h = Sha256::new();
        h.update(self.dealer_idx.to_be_bytes());
        for just in &self.justifications {
            h.update(just.share_idx.to_be_bytes());
            h.update(just.share.marshal());
        }
        h.finalize().into()
    }
}

/// A bundle wrapped with the signature of its sender over the bundle hash.
/// The signature field is empty only when authentication is disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "B: Serialize + DeserializeOwned")]
pub struct Authenticated<B> {
    pub bundle: B,
    pub signature: Vec<u8>,
}

impl<B: Bundle> Authenticated<B> {
    pub fn new(bundle: B, signature: Vec<u8>) -> Self {
        Self { bundle, signature }
    }
}

/// A deal bundle with its dealer's signature.
pub type AuthDealBundle<C> = Authenticated<DealBundle<C>>;
/// A response bundle with its share holder's signature.
pub type AuthResponseBundle = Authenticated<ResponseBundle>;
/// A justification bundle with its dealer's signature.
pub type AuthJustificationBundle<C> = Authenticated<JustificationBundle<C>>;

/// The tagged sum over the three signed envelope kinds, for transports that
/// carry all protocol traffic on a single wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "C::Scalar: DeserializeOwned, C::Point: DeserializeOwned")]
pub enum Packet<C: Curve> {
    Deal(AuthDealBundle<C>),
    Response(AuthResponseBundle),
    Justification(AuthJustificationBundle<C>),
}

impl<C: Curve> Packet<C> {
    /// The sender's index in its node list.
    pub fn index(&self) -> Idx {
        match self {
            Packet::Deal(env) => env.bundle.index(),
            Packet::Response(env) => env.bundle.index(),
            Packet::Justification(env) => env.bundle.index(),
        }
    }

    /// The canonical hash of the carried bundle. Sorts it in place.
    pub fn hash(&mut self) -> [u8; 32] {
        match self {
            Packet::Deal(env) => env.bundle.hash(),
            Packet::Response(env) => env.bundle.hash(),
            Packet::Justification(env) => env.bundle.hash(),
        }
    }

    pub fn signature(&self) -> &[u8] {
        match self {
            Packet::Deal(env) => &env.signature,
            Packet::Response(env) => &env.signature,
            Packet::Justification(env) => &env.signature,
        }
    }

    /// Encodes the packet with the reference byte codec. Boards are free to
    /// use any serialization as long as the canonical hash is preserved;
    /// this is the one used by the bundled tooling.
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Decodes a packet produced by [`Packet::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// The private share a participant holds at the end of the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share<S> {
    /// The index of the share holder
    pub index: Idx,
    /// The share itself
    pub private: S,
}

/// A share of the distributed key together with the commitments to the
/// group polynomial. The group public key is `commits[0]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "C::Scalar: DeserializeOwned, C::Point: DeserializeOwned")]
pub struct DistKeyShare<C: Curve> {
    /// Coefficient commitments of the distributed public polynomial
    pub commits: Vec<C::Point>,
    /// This participant's private share
    pub share: Share<C::Scalar>,
}

impl<C: Curve> DistKeyShare<C> {
    /// The distributed public key, i.e. the free coefficient commitment.
    pub fn public_key(&self) -> Option<&C::Point> {
        self.commits.first()
    }
}

/// The final output of the protocol when it terminates successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "C::Scalar: DeserializeOwned, C::Point: DeserializeOwned")]
pub struct DKGOutput<C: Curve> {
    /// The nodes that successfully ran the protocol until the end
    pub qual: Group<C>,
    /// The distributed key material held by this participant
    pub key: DistKeyShare<C>,
}

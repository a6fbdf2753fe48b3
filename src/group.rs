//! Participant identities and the typed seam to the curve primitives.
//!
//! The driver never performs group arithmetic: scalars and points flow
//! through it opaquely, between the board and the cryptographic engine. The
//! only operation it needs from an element is a deterministic binary
//! encoding, which feeds the canonical bundle hash.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// The index of a participant within its node list.
pub type Idx = u32;

/// An opaque group element (scalar or point) as seen by the driver.
///
/// `marshal` must be the exact-byte encoding agreed upon by all
/// implementations of the protocol: it is the form in which the element
/// enters the signed bundle hash.
pub trait Element:
    Clone + Debug + PartialEq + Eq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Returns the canonical binary encoding of the element.
    fn marshal(&self) -> Vec<u8>;
}

/// Binds together the scalar field and the point group the protocol runs
/// over. Mirrors the engine's curve choice without importing its arithmetic.
pub trait Curve: Clone + Debug + Send + Sync + 'static {
    /// The curve's scalar
    type Scalar: Element;

    /// The curve's point
    type Point: Element;
}

/// Node is a participant in the DKG protocol. Each participant is identified
/// both by an index and a public key. The index is stable across protocol
/// rounds and is used to look up the node's key when authenticating its
/// bundles.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Debug)]
#[serde(bound = "C::Point: DeserializeOwned")]
pub struct Node<C: Curve>(Idx, C::Point);

impl<C: Curve> Node<C> {
    pub fn new(index: Idx, public: C::Point) -> Self {
        Self(index, public)
    }

    /// Returns the node's index
    pub fn id(&self) -> Idx {
        self.0
    }

    /// Returns the node's public key
    pub fn key(&self) -> &C::Point {
        &self.1
    }
}

/// The minimum allowed threshold is 51%
pub fn minimum_threshold(n: usize) -> usize {
    (((n as f64) / 2.0) + 1.0) as usize
}

/// The default threshold is 66%
pub fn default_threshold(n: usize) -> usize {
    (((n as f64) * 2.0 / 3.0) + 1.0) as usize
}

/// Error raised when assembling a group from a node list.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupError {
    /// The threshold is out of the valid range for the list size.
    #[error("threshold {0} is not in range [{1},{2}]")]
    InvalidThreshold(usize, usize, usize),
}

/// A Group is an ordered collection of Nodes with an associated threshold.
/// The driver holds two of them: the dealers (old nodes) and the share
/// holders (new nodes). In a fresh DKG both lists are equal; in a resharing
/// they may differ.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Debug)]
#[serde(bound = "C::Point: DeserializeOwned")]
pub struct Group<C: Curve> {
    /// The vector of nodes in the group
    pub nodes: Vec<Node<C>>,
    /// The minimum number of nodes required to reconstruct the secret
    pub threshold: usize,
}

impl<C: Curve> Group<C> {
    /// Creates a new group from the provided vector of nodes and threshold.
    ///
    /// Valid thresholds are `>= 51% * nodes.len()` and `<= 100% * nodes.len()`
    pub fn new(nodes: Vec<Node<C>>, threshold: usize) -> Result<Self, GroupError> {
        let minimum = minimum_threshold(nodes.len());
        let maximum = nodes.len();

        if threshold < minimum || threshold > maximum {
            return Err(GroupError::InvalidThreshold(threshold, minimum, maximum));
        }

        Ok(Self { nodes, threshold })
    }

    /// Converts a vector of nodes to a group with the default threshold (66%)
    pub fn from_list(nodes: Vec<Node<C>>) -> Self {
        let l = nodes.len();
        Self {
            nodes,
            threshold: default_threshold(l),
        }
    }

    /// Returns the number of nodes in the group
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Checks if the group is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Gets the node registered under the provided index
    pub fn node(&self, idx: Idx) -> Option<&Node<C>> {
        self.nodes.iter().find(|n| n.0 == idx)
    }
}

impl<C: Curve> From<Vec<C::Point>> for Group<C> {
    fn from(list: Vec<C::Point>) -> Self {
        let nodes = list
            .into_iter()
            .enumerate()
            .map(|(i, public)| Node::new(i as Idx, public))
            .collect();

        Self::from_list(nodes)
    }
}

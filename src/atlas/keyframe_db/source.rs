//! Where the database resolves KeyFrame ids during a query.
//!
//! The inverted file only stores ids. Scoring a candidate needs its BoW
//! vector and re-ranking needs its covisibility neighbors; both are looked
//! up through a [`KeyFrameSource`]. The in-process [`Map`] (borrowed, or
//! behind the [`RwLock`] threads share it through) and a remote [`TopoMap`]
//! are the sources, and the ranking pipeline is written once over the trait.

use std::borrow::Cow;
use std::collections::HashSet;
use std::convert::Infallible;

use parking_lot::RwLock;

use crate::atlas::map::{KeyFrameId, Map};
use crate::atlas::topo_map::{TopoMap, TopoMapError};
use crate::vocabulary::BowVector;

/// Id-addressed access to KeyFrames for the ranking pipeline.
pub trait KeyFrameSource {
    /// Failure of a lookup. `Infallible` for in-process sources.
    type Error;

    /// Whether the KeyFrame can still be dereferenced.
    ///
    /// Called after the database lock has been released.
    fn is_resident(&self, id: KeyFrameId) -> bool;

    /// BoW vector of `id`, or `None` if the KeyFrame no longer exists.
    fn bow_vector(&self, id: KeyFrameId) -> Result<Option<Cow<'_, BowVector>>, Self::Error>;

    /// Direct covisibility neighbors of `id`.
    fn connected_keyframes(&self, id: KeyFrameId) -> Result<HashSet<KeyFrameId>, Self::Error>;

    /// Up to `n` most strongly connected neighbors of `id`, best first.
    fn best_covisibles(&self, id: KeyFrameId, n: usize) -> Result<Vec<KeyFrameId>, Self::Error>;
}

impl KeyFrameSource for Map {
    type Error = Infallible;

    fn is_resident(&self, id: KeyFrameId) -> bool {
        self.contains_keyframe(id)
    }

    fn bow_vector(&self, id: KeyFrameId) -> Result<Option<Cow<'_, BowVector>>, Infallible> {
        Ok(self.get_keyframe(id).map(|kf| Cow::Borrowed(kf.bow_vector())))
    }

    fn connected_keyframes(&self, id: KeyFrameId) -> Result<HashSet<KeyFrameId>, Infallible> {
        Ok(self.get_connected_keyframes(id))
    }

    fn best_covisibles(&self, id: KeyFrameId, n: usize) -> Result<Vec<KeyFrameId>, Infallible> {
        Ok(self.get_local_keyframes(id, n))
    }
}

/// Shared map: every lookup takes the read lock for its own duration only,
/// so writers are never held up by a whole query.
impl KeyFrameSource for RwLock<Map> {
    type Error = Infallible;

    fn is_resident(&self, id: KeyFrameId) -> bool {
        self.read().contains_keyframe(id)
    }

    fn bow_vector(&self, id: KeyFrameId) -> Result<Option<Cow<'_, BowVector>>, Infallible> {
        let map = self.read();
        Ok(map.get_keyframe(id).map(|kf| Cow::Owned(kf.bow_vector().clone())))
    }

    fn connected_keyframes(&self, id: KeyFrameId) -> Result<HashSet<KeyFrameId>, Infallible> {
        Ok(self.read().get_connected_keyframes(id))
    }

    fn best_covisibles(&self, id: KeyFrameId, n: usize) -> Result<Vec<KeyFrameId>, Infallible> {
        Ok(self.read().get_local_keyframes(id, n))
    }
}

/// Adapter resolving ids through a [`TopoMap`].
///
/// Every id in the inverted file is considered resident; whether the
/// KeyFrame still exists is only discovered when its BoW vector is fetched.
pub struct TopoSource<'a, T: ?Sized> {
    topo: &'a T,
}

impl<'a, T: TopoMap + ?Sized> TopoSource<'a, T> {
    pub fn new(topo: &'a T) -> Self {
        Self { topo }
    }
}

impl<T: TopoMap + ?Sized> KeyFrameSource for TopoSource<'_, T> {
    type Error = TopoMapError;

    fn is_resident(&self, _id: KeyFrameId) -> bool {
        true
    }

    fn bow_vector(&self, id: KeyFrameId) -> Result<Option<Cow<'_, BowVector>>, TopoMapError> {
        match self.topo.bow_vector(id) {
            Ok(bow) => Ok(Some(Cow::Owned(bow))),
            Err(TopoMapError::UnknownKeyFrame(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn connected_keyframes(&self, id: KeyFrameId) -> Result<HashSet<KeyFrameId>, TopoMapError> {
        self.topo.connected_keyframes(id)
    }

    fn best_covisibles(&self, id: KeyFrameId, n: usize) -> Result<Vec<KeyFrameId>, TopoMapError> {
        self.topo.best_covisibles(id, n)
    }
}

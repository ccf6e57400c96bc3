use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Address of an actor within a [`Group`](crate::group::Group).
///
/// An `ActorId` is a back-reference into the group's registry, it does not own
/// the actor it names. Two ids are equal exactly when they name the same
/// registry slot. Ids are only minted by the group when an actor is
/// registered, so every id handed out by a group resolves within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(usize);

impl ActorId {
    /// Sender id used for messages posted from outside of any actor.
    ///
    /// Never assigned to a registered actor and never resolves.
    pub const EXTERNAL: ActorId = ActorId(usize::MAX);

    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    pub(crate) fn index(&self) -> usize {
        self.0
    }

    pub fn is_external(&self) -> bool {
        *self == Self::EXTERNAL
    }
}

impl Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_external() {
            write!(f, "actor#external")
        } else {
            write!(f, "actor#{}", self.0)
        }
    }
}

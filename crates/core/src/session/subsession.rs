use std::fmt;

use crate::protocol::{MediaDescription, TransportPreference};

/// Typed handle to a subsession: its index in the owning session's list.
///
/// Protocol callbacks identify subsessions by this handle instead of holding
/// a reference back into the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubsessionId(pub usize);

impl SubsessionId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SubsessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Progress of one subsession within an attempt.
///
/// ```text
/// Pending -> Attached -> Released
///    \
///     `---> Skipped        (initiate, SETUP or sink creation failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsessionState {
    /// Not yet set up.
    Pending,
    /// Set up failed; not part of playback.
    Skipped,
    /// Set up with a sink attached to its source.
    Attached,
    /// Its sink has been released (stream ended or session torn down).
    Released,
}

/// One negotiated sub-stream of a session.
#[derive(Debug, Clone)]
pub struct Subsession {
    id: SubsessionId,
    description: MediaDescription,
    transport: Option<TransportPreference>,
    state: SubsessionState,
}

impl Subsession {
    pub fn new(id: SubsessionId, description: MediaDescription) -> Self {
        Self {
            id,
            description,
            transport: None,
            state: SubsessionState::Pending,
        }
    }

    pub fn id(&self) -> SubsessionId {
        self.id
    }

    pub fn description(&self) -> &MediaDescription {
        &self.description
    }

    /// Transport the subsession was set up with.
    pub fn transport(&self) -> Option<TransportPreference> {
        self.transport
    }

    pub fn state(&self) -> SubsessionState {
        self.state
    }

    /// Whether a sink is currently attached.
    pub fn has_sink(&self) -> bool {
        self.state == SubsessionState::Attached
    }

    pub(crate) fn set_transport(&mut self, transport: TransportPreference) {
        self.transport = Some(transport);
    }

    pub(crate) fn set_state(&mut self, state: SubsessionState) {
        self.state = state;
    }
}

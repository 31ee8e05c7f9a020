//! Controller boundaries.
//!
//! A boundary node's content is owned by an opaque native composite that manages its own internal
//! state. Its content is never patched in place: the composite is fully detached from its host,
//! its panes are replaced, and it is attached again, all within one commit.
//!
//! ```text
//! Empty --attach--> Attached --begin_detach--> Detaching --finish_detach--> Empty
//! ```

use crate::backend::Handle;
use core::fmt;
use thiserror::Error;

/// Attachment phase of a boundary's composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryPhase {
    /// No composite attached to a host.
    Empty,
    /// The composite is attached to `host`.
    Attached,
    /// The composite is being detached; its content must not change yet.
    Detaching,
}

impl fmt::Display for BoundaryPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BoundaryPhase::Empty => write!(f, "empty"),
            BoundaryPhase::Attached => write!(f, "attached"),
            BoundaryPhase::Detaching => write!(f, "detaching"),
        }
    }
}

/// A transition the state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid boundary transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: BoundaryPhase,
    pub to: BoundaryPhase,
}

/// Per-node boundary state. Carried from the previous node when a boundary is reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryState {
    phase: BoundaryPhase,
    host: Option<Handle>,
    /// Number of panes the descriptor declared.
    panes: usize,
    /// False if a pane failed the arity check; such a boundary yields no composite.
    valid: bool,
    attaches: u64,
    detaches: u64,
}

impl BoundaryState {
    pub(crate) fn new(panes: usize, valid: bool) -> BoundaryState {
        BoundaryState {
            phase: BoundaryPhase::Empty,
            host: None,
            panes,
            valid,
            attaches: 0,
            detaches: 0,
        }
    }

    pub fn phase(&self) -> BoundaryPhase {
        self.phase
    }

    /// The host widget while attached.
    pub fn host(&self) -> Option<Handle> {
        self.host
    }

    pub fn panes(&self) -> usize {
        self.panes
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// How many times the composite was attached over the node's lifetime.
    pub fn attaches(&self) -> u64 {
        self.attaches
    }

    /// How many times the composite was detached over the node's lifetime.
    pub fn detaches(&self) -> u64 {
        self.detaches
    }

    /// Takes over the attachment state of the previous node for the same boundary.
    pub(crate) fn inherit(&mut self, previous: &BoundaryState) {
        self.phase = previous.phase;
        self.host = previous.host;
        self.attaches = previous.attaches;
        self.detaches = previous.detaches;
    }

    /// `Empty -> Attached`
    pub(crate) fn attach(&mut self, host: Handle) -> Result<(), InvalidTransition> {
        self.transition(BoundaryPhase::Empty, BoundaryPhase::Attached)?;
        self.host = Some(host);
        self.attaches += 1;
        Ok(())
    }

    /// `Attached -> Detaching`
    pub(crate) fn begin_detach(&mut self) -> Result<(), InvalidTransition> {
        self.transition(BoundaryPhase::Attached, BoundaryPhase::Detaching)
    }

    /// `Detaching -> Empty`
    pub(crate) fn finish_detach(&mut self) -> Result<(), InvalidTransition> {
        self.transition(BoundaryPhase::Detaching, BoundaryPhase::Empty)?;
        self.host = None;
        self.detaches += 1;
        Ok(())
    }

    fn transition(&mut self, from: BoundaryPhase, to: BoundaryPhase) -> Result<(), InvalidTransition> {
        if self.phase != from {
            return Err(InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle() {
        let host = Handle::from_raw(1);
        let mut state = BoundaryState::new(2, true);
        assert_eq!(state.phase(), BoundaryPhase::Empty);

        state.attach(host).unwrap();
        assert_eq!(state.phase(), BoundaryPhase::Attached);
        assert_eq!(state.host(), Some(host));

        state.begin_detach().unwrap();
        assert_eq!(state.phase(), BoundaryPhase::Detaching);
        state.finish_detach().unwrap();
        assert_eq!(state.phase(), BoundaryPhase::Empty);
        assert_eq!(state.host(), None);

        state.attach(host).unwrap();
        assert_eq!((state.attaches(), state.detaches()), (2, 1));
    }

    #[test]
    fn never_attached_twice() {
        let mut state = BoundaryState::new(1, true);
        state.attach(Handle::from_raw(1)).unwrap();
        assert_eq!(
            state.attach(Handle::from_raw(2)),
            Err(InvalidTransition {
                from: BoundaryPhase::Attached,
                to: BoundaryPhase::Attached,
            })
        );
        assert_eq!(state.host(), Some(Handle::from_raw(1)));
    }

    #[test]
    fn cannot_finish_detach_without_beginning() {
        let mut state = BoundaryState::new(1, true);
        state.attach(Handle::from_raw(1)).unwrap();
        assert!(state.finish_detach().is_err());
        assert_eq!(state.phase(), BoundaryPhase::Attached);
    }
}

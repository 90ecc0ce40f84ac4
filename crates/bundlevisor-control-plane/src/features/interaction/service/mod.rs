use bundlevisor_core::{InteractionState, OwnerId, PendingText};
use std::collections::HashMap;
use tracing::debug;

/// Interaction State Machine: one pending slot per owner.
///
/// Starting a new flow overwrites whatever the owner had pending; taking a
/// pending action clears the slot whether or not the follow-up succeeds.
#[derive(Debug, Default)]
pub struct InteractionMachine {
    states: HashMap<OwnerId, InteractionState>,
}

impl InteractionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, owner_id: OwnerId) -> InteractionState {
        self.states.get(&owner_id).copied().unwrap_or_default()
    }

    pub fn begin_upload(&mut self, owner_id: OwnerId) {
        self.set(owner_id, InteractionState::AwaitingUpload);
    }

    pub fn begin_text(&mut self, owner_id: OwnerId, pending: PendingText) {
        self.set(owner_id, InteractionState::AwaitingText(pending));
    }

    /// Consume an awaited upload. `false` leaves the state untouched.
    pub fn take_upload(&mut self, owner_id: OwnerId) -> bool {
        if self.state(owner_id) == InteractionState::AwaitingUpload {
            self.states.remove(&owner_id);
            true
        } else {
            false
        }
    }

    /// Consume an awaited text action, if any.
    pub fn take_pending_text(&mut self, owner_id: OwnerId) -> Option<PendingText> {
        match self.state(owner_id) {
            InteractionState::AwaitingText(pending) => {
                self.states.remove(&owner_id);
                Some(pending)
            }
            _ => None,
        }
    }

    /// Owners with a pending interaction.
    pub fn pending_count(&self) -> usize {
        self.states.len()
    }

    fn set(&mut self, owner_id: OwnerId, state: InteractionState) {
        if let Some(previous) = self.states.insert(owner_id, state) {
            debug!(owner_id, ?previous, next = ?state, "Replaced pending interaction");
        }
    }
}

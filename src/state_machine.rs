//! Uplink state machine
//!
//! Tracks WiFi association and the outcome of the latest upload. The Uplink
//! Session is the only writer; the status indicator reads it.

/// WiFi association state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Outcome of the most recent upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Uploading,
    Succeeded,
    Failed,
}

/// Events fed into the state machine by the Uplink Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    // Link events
    ConnectRequested,
    AssociationUp,
    AssociationFailed,
    AssociationLost,

    // Upload events
    UploadStarted,
    UploadSucceeded,
    UploadFailed,
}

/// State transition result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransition {
    /// Keep the current link state
    Stay,
    /// Move to a new link state
    Transition(LinkState),
    /// Move to a new link state and reset the retry count
    TransitionWithReset(LinkState),
}

/// Link/upload state machine with bounded connect retries
pub struct LinkStateMachine {
    current_state: LinkState,
    previous_state: Option<LinkState>,
    upload_state: UploadState,
    retry_count: u32,
    max_retries: u32,
    backoff_base_ms: u64,
    backoff_max_ms: u64,
}

impl LinkStateMachine {
    /// Create a state machine allowing `max_retries` attempts per connect round.
    /// Backoff starts at `backoff_base_ms` and doubles up to `backoff_max_ms`.
    pub fn new(max_retries: u32, backoff_base_ms: u64, backoff_max_ms: u64) -> Self {
        Self {
            current_state: LinkState::Disconnected,
            previous_state: None,
            upload_state: UploadState::Idle,
            retry_count: 0,
            max_retries: max_retries.max(1),
            backoff_base_ms,
            backoff_max_ms,
        }
    }

    pub fn get_current_state(&self) -> LinkState {
        self.current_state
    }

    pub fn get_previous_state(&self) -> Option<LinkState> {
        self.previous_state
    }

    pub fn get_upload_state(&self) -> UploadState {
        self.upload_state
    }

    pub fn get_retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn is_connected(&self) -> bool {
        self.current_state == LinkState::Connected
    }

    /// Whether another attempt is allowed in the current connect round
    pub fn should_retry(&self) -> bool {
        self.current_state == LinkState::Connecting && self.retry_count < self.max_retries
    }

    /// Delay before the next connect attempt: base, 2×base, 4×base, … capped
    pub fn backoff_ms(&self) -> u64 {
        let shift = self.retry_count.saturating_sub(1).min(16);
        (self.backoff_base_ms << shift).min(self.backoff_max_ms)
    }

    /// Handle an event
    pub fn handle_event(&mut self, event: LinkEvent) -> StateTransition {
        match event {
            LinkEvent::UploadStarted | LinkEvent::UploadSucceeded | LinkEvent::UploadFailed => {
                self.handle_upload_event(event);
                return StateTransition::Stay;
            }
            LinkEvent::AssociationFailed if self.current_state == LinkState::Connecting => {
                self.retry_count += 1;
            }
            _ => {}
        }

        let transition = self.get_state_transition(self.current_state, event);

        match transition {
            StateTransition::Transition(new_state) => {
                self.transition_to_state(new_state);
            }
            StateTransition::TransitionWithReset(new_state) => {
                self.retry_count = 0;
                self.transition_to_state(new_state);
            }
            StateTransition::Stay => {}
        }

        transition
    }

    fn handle_upload_event(&mut self, event: LinkEvent) {
        // Uploads are only attempted on an associated link
        if self.current_state != LinkState::Connected {
            return;
        }
        self.upload_state = match event {
            LinkEvent::UploadStarted => UploadState::Uploading,
            LinkEvent::UploadSucceeded => UploadState::Succeeded,
            LinkEvent::UploadFailed => UploadState::Failed,
            _ => self.upload_state,
        };
    }

    fn transition_to_state(&mut self, new_state: LinkState) {
        if new_state == self.current_state {
            return;
        }

        match new_state {
            LinkState::Connected => log::info!("[STATE] Link connected"),
            LinkState::Disconnected => {
                log::warn!("[STATE] Link disconnected (from {:?})", self.current_state)
            }
            LinkState::Connecting => {}
        }

        self.previous_state = Some(self.current_state);
        self.current_state = new_state;
        self.upload_state = UploadState::Idle;
    }

    fn get_state_transition(&self, current_state: LinkState, event: LinkEvent) -> StateTransition {
        match (current_state, event) {
            // A connect round always starts from a fresh retry budget
            (LinkState::Disconnected, LinkEvent::ConnectRequested) => {
                StateTransition::TransitionWithReset(LinkState::Connecting)
            }

            (LinkState::Connecting, LinkEvent::AssociationUp) => {
                StateTransition::TransitionWithReset(LinkState::Connected)
            }
            (LinkState::Connecting, LinkEvent::AssociationFailed) => {
                if self.retry_count < self.max_retries {
                    StateTransition::Stay
                } else {
                    StateTransition::Transition(LinkState::Disconnected)
                }
            }

            // The platform stack may re-associate on its own
            (LinkState::Disconnected, LinkEvent::AssociationUp) => {
                StateTransition::TransitionWithReset(LinkState::Connected)
            }

            (LinkState::Connected | LinkState::Connecting, LinkEvent::AssociationLost) => {
                StateTransition::Transition(LinkState::Disconnected)
            }

            _ => StateTransition::Stay,
        }
    }
}

impl Default for LinkStateMachine {
    fn default() -> Self {
        use crate::config;
        Self::new(
            config::WIFI_MAX_RETRIES,
            config::WIFI_BACKOFF_BASE_MS,
            config::WIFI_BACKOFF_MAX_MS,
        )
    }
}

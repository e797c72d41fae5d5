//! Decides when the pull transport steps in for the push channel.

use crate::state::Connectivity;

/// Push channel transitions the controller reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSignal {
    /// The channel came up.
    Connected,
    /// An established channel dropped.
    Disconnected,
    /// A connect attempt failed.
    ConnectError,
}

/// Why a pull was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullReason {
    /// First paint, issued once at start.
    Initial,
    /// The push channel dropped.
    Disconnected,
    /// The push channel failed to connect.
    ConnectError,
}

/// Action the driver must carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackAction {
    /// Emit `request_update` over the push channel.
    RequestUpdate,
    /// Issue a one-shot pull of the current leaderboard.
    Pull(PullReason),
}

/// Tracks connectivity and pull bookkeeping for one client.
#[derive(Debug, Default)]
pub struct TransportFallbackController {
    connectivity: Connectivity,
    initial_pull_issued: bool,
    pulls_in_flight: usize,
}

impl TransportFallbackController {
    /// Controller in the `connecting` state with no pull issued yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current connectivity.
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    /// Start sequence: the initial pull, returned exactly once per controller.
    pub fn start(&mut self) -> Option<FallbackAction> {
        if self.initial_pull_issued {
            return None;
        }
        self.initial_pull_issued = true;
        self.pulls_in_flight += 1;
        Some(FallbackAction::Pull(PullReason::Initial))
    }

    /// React to a push channel transition.
    pub fn on_signal(&mut self, signal: TransportSignal) -> Option<FallbackAction> {
        match signal {
            TransportSignal::Connected => {
                self.connectivity = Connectivity::Connected;
                Some(FallbackAction::RequestUpdate)
            }
            TransportSignal::Disconnected => self.fall_back(PullReason::Disconnected),
            TransportSignal::ConnectError => self.fall_back(PullReason::ConnectError),
        }
    }

    /// Record that a pull issued by this controller has completed.
    pub fn on_pull_finished(&mut self) {
        self.pulls_in_flight = self.pulls_in_flight.saturating_sub(1);
    }

    /// Whether a pull is still outstanding.
    pub fn pull_in_flight(&self) -> bool {
        self.pulls_in_flight > 0
    }

    /// Mark the channel down and pull, unless a pull is already outstanding.
    ///
    /// A disconnect or connect error arriving while a pull is in flight gets no
    /// pull of its own: the outstanding pull is the fallback for it. If that pull
    /// fails, the client keeps its last snapshot until the next transition.
    fn fall_back(&mut self, reason: PullReason) -> Option<FallbackAction> {
        self.connectivity = Connectivity::Disconnected;
        if self.pull_in_flight() {
            return None;
        }
        self.pulls_in_flight += 1;
        Some(FallbackAction::Pull(reason))
    }
}

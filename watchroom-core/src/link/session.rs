use std::time::{Duration, Instant};

use log::{info, warn};

use crate::{Config, Timers, TransportId};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    #[default]
    Idle,
    /// Waiting for the transport to hand out an identity.
    Opening,
    Open(TransportId),
    /// The session was lost and another attempt is scheduled.
    Reconnecting { attempt: u32 },
    /// Every attempt failed. Only a manual retry leaves this state.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionTimer {
    Retry,
}

/// Keeps the local transport session alive.
///
/// Retries with a fixed backoff, up to a bounded number of attempts. The caller
/// is told when to open the transport, and reports back what happened.
#[derive(Debug, Clone)]
pub struct TransportSession {
    max_attempts: u32,
    backoff: Duration,
    status: SessionStatus,
    attempts: u32,
    timers: Timers<SessionTimer>,
}

impl TransportSession {
    pub fn new(config: &Config) -> Self {
        Self {
            max_attempts: config.transport_retry_attempts.max(1),
            backoff: config.transport_retry_backoff(),
            status: SessionStatus::Idle,
            attempts: 0,
            timers: Timers::new(),
        }
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn transport_id(&self) -> Option<&TransportId> {
        match &self.status {
            SessionStatus::Open(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status, SessionStatus::Open(_))
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Starts the first attempt. Returns true if the transport should be opened now.
    pub fn begin(&mut self) -> bool {
        match self.status {
            SessionStatus::Idle | SessionStatus::Failed => {
                self.attempts = 1;
                self.status = SessionStatus::Opening;
                true
            }
            _ => false,
        }
    }

    /// The transport handed out an identity.
    pub fn opened(&mut self, transport_id: TransportId) {
        info!("Transport session open as {}", transport_id);

        self.timers.clear();
        self.attempts = 0;
        self.status = SessionStatus::Open(transport_id);
    }

    /// The session was lost. An open session starts a fresh round of attempts,
    /// while a loss during an attempt counts against the current round.
    pub fn lost(&mut self, reason: &str, now: Instant) {
        match self.status {
            SessionStatus::Open(_) => {
                warn!("Transport session lost: {}", reason);

                self.attempts = 0;
                self.schedule_retry(now);
            }
            SessionStatus::Opening | SessionStatus::Reconnecting { .. } => {
                self.open_failed(reason, now)
            }
            SessionStatus::Idle | SessionStatus::Failed => {}
        }
    }

    /// An attempt to open the session failed.
    pub fn open_failed(&mut self, reason: &str, now: Instant) {
        warn!(
            "Opening the transport session failed (attempt {}/{}): {}",
            self.attempts, self.max_attempts, reason
        );

        self.schedule_retry(now);
    }

    /// Returns true if the transport should be opened now.
    pub fn poll_timers(&mut self, now: Instant) -> bool {
        let due = self.timers.expire(now).contains(&SessionTimer::Retry);

        if due {
            if let SessionStatus::Reconnecting { attempt } = self.status {
                self.attempts = attempt;
                self.status = SessionStatus::Opening;
                return true;
            }
        }

        false
    }

    /// Starts over after the automatic attempts were used up.
    pub fn retry_manually(&mut self) -> bool {
        if self.status == SessionStatus::Failed {
            return self.begin();
        }

        false
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    fn schedule_retry(&mut self, now: Instant) {
        if self.attempts >= self.max_attempts {
            warn!(
                "Giving up on the transport session after {} attempts",
                self.attempts
            );

            self.timers.clear();
            self.status = SessionStatus::Failed;
            return;
        }

        let attempt = self.attempts + 1;

        self.status = SessionStatus::Reconnecting { attempt };
        self.timers.arm(SessionTimer::Retry, now + self.backoff);
    }
}

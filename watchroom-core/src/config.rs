use std::time::Duration;

/// The configuration of a room session
#[derive(Debug, Clone)]
pub struct Config {
    /// How often the host re-evaluates and possibly re-broadcasts its playback state
    pub resync_interval_in_seconds: f32,
    /// How far the position may drift from the last broadcast state before an update is sent
    pub drift_tolerance_in_seconds: f64,
    /// A position jump larger than this is announced as a seek operation
    pub seek_threshold_in_seconds: f64,
    /// How long viewers show the "syncing" indicator after an update
    pub syncing_indicator_in_seconds: f32,
    /// How long the host waits for a link to start streaming
    pub link_timeout_in_seconds: f32,
    /// How long a viewer waits in the connecting state before offering diagnostics
    pub connecting_timeout_in_seconds: f32,
    /// How many times the host dials the same viewer during one streaming session
    pub max_link_attempts: u32,
    /// How many times a lost transport session is reinitialized before giving up
    pub transport_retry_attempts: u32,
    /// The fixed delay between transport session reinitializations
    pub transport_retry_backoff_in_seconds: f32,
    /// How often a liveness heartbeat is sent on the signaling channel
    pub heartbeat_interval_in_seconds: f32,
}

impl Config {
    pub fn resync_interval(&self) -> Duration {
        seconds(self.resync_interval_in_seconds)
    }

    pub fn syncing_indicator(&self) -> Duration {
        seconds(self.syncing_indicator_in_seconds)
    }

    pub fn link_timeout(&self) -> Duration {
        seconds(self.link_timeout_in_seconds)
    }

    pub fn connecting_timeout(&self) -> Duration {
        seconds(self.connecting_timeout_in_seconds)
    }

    pub fn transport_retry_backoff(&self) -> Duration {
        seconds(self.transport_retry_backoff_in_seconds)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        seconds(self.heartbeat_interval_in_seconds)
    }

    /// Members that stay silent for this long are considered gone by a relay
    pub fn member_expiry(&self) -> Duration {
        self.heartbeat_interval() * 3
    }
}

/// Negative or non-finite values are treated as zero
fn seconds(value: f32) -> Duration {
    Duration::try_from_secs_f32(value).unwrap_or_default()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resync_interval_in_seconds: 10.,
            drift_tolerance_in_seconds: 5.,
            seek_threshold_in_seconds: 10.,
            syncing_indicator_in_seconds: 2.,
            link_timeout_in_seconds: 30.,
            connecting_timeout_in_seconds: 15.,
            max_link_attempts: 5,
            transport_retry_attempts: 5,
            transport_retry_backoff_in_seconds: 3.,
            heartbeat_interval_in_seconds: 30.,
        }
    }
}

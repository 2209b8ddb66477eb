use std::time::Duration;

use hopper::{SEND_RATE_LIMIT, TICK_PERIOD};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server tick length; one interpolation step spans this long.
    pub tick_period: Duration,
    pub send_rate_limit: Duration,
    pub frame_rate: u32,
    /// How long to wait for the welcome before complaining.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tick_period: TICK_PERIOD,
            send_rate_limit: SEND_RATE_LIMIT,
            frame_rate: 60,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1) as f64)
    }
}

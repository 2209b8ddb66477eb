use std::time::Duration;

use hopper::{MAX_ENTITIES, TICK_PERIOD, ValidationLimits};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("tick period must be non-zero")]
    ZeroTick,
    #[error("at least one entity slot is required")]
    NoEntities,
    #[error("{requested} entities requested, at most {max} are addressable")]
    TooManyEntities { requested: usize, max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub tick_period: Duration,
    pub max_entities: usize,
    #[serde(skip)]
    pub limits: ValidationLimits,
}

impl ServerConfig {
    /// Config for a non-default tick; the movement tolerance follows it.
    pub fn new(tick_period: Duration, max_entities: usize) -> Self {
        Self {
            tick_period,
            max_entities,
            limits: ValidationLimits {
                tick_period,
                ..Default::default()
            },
        }
    }

    /// Rejects settings clients cannot follow. Clients interpolate over
    /// their own `--tick-ms`, so both sides must be started with the same
    /// value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_period.is_zero() {
            return Err(ConfigError::ZeroTick);
        }
        if self.max_entities == 0 {
            return Err(ConfigError::NoEntities);
        }
        if self.max_entities > MAX_ENTITIES {
            return Err(ConfigError::TooManyEntities {
                requested: self.max_entities,
                max: MAX_ENTITIES,
            });
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(TICK_PERIOD, MAX_ENTITIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_tracks_tick_period() {
        let config = ServerConfig::new(Duration::from_millis(200), 8);
        assert_eq!(config.limits.tick_period, Duration::from_millis(200));
        assert!((config.limits.distance_tolerance(Duration::ZERO) - 2.5).abs() < 1e-5);
    }

    #[test]
    fn out_of_range_settings_are_refused() {
        assert_eq!(ServerConfig::default().validate(), Ok(()));
        assert_eq!(
            ServerConfig::new(Duration::ZERO, 8).validate(),
            Err(ConfigError::ZeroTick)
        );
        assert_eq!(
            ServerConfig::new(TICK_PERIOD, 0).validate(),
            Err(ConfigError::NoEntities)
        );
        assert_eq!(
            ServerConfig::new(TICK_PERIOD, MAX_ENTITIES + 1).validate(),
            Err(ConfigError::TooManyEntities {
                requested: MAX_ENTITIES + 1,
                max: MAX_ENTITIES,
            })
        );
    }

    #[test]
    fn default_matches_shared_constants() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_period, TICK_PERIOD);
        assert_eq!(config.max_entities, MAX_ENTITIES);
        assert_eq!(config.limits, ValidationLimits::default());
    }
}

use std::time::Duration;

use crate::config::SurrogateConfig;

/// What a session should do after an idle interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idle {
    /// Send a probe and keep going.
    Probe,
    /// Too many unanswered probes; close the session.
    Expired,
    /// Keep-alive is off; only liveness checks apply.
    Disabled,
}

/// Counter of idle intervals without an answer from the peer.
#[derive(Debug, Clone)]
pub struct KeepAlive {
    interval: Duration,
    fail_limit: u32,
    enabled: bool,
    missed: u32,
}

impl KeepAlive {
    pub fn new(interval: Duration, fail_limit: u32, enabled: bool) -> Self {
        Self {
            interval,
            fail_limit,
            enabled: enabled && !interval.is_zero(),
            missed: 0,
        }
    }

    pub fn from_config(config: &SurrogateConfig) -> Self {
        Self::new(config.check_interval, config.fail_limit, config.keepalive)
    }

    /// Poll timeout for the session loop.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    /// Record an idle interval.
    pub fn on_idle(&mut self) -> Idle {
        if !self.enabled {
            return Idle::Disabled;
        }
        self.missed += 1;
        if self.missed > self.fail_limit {
            Idle::Expired
        } else {
            Idle::Probe
        }
    }

    /// The peer answered; start counting again.
    pub fn on_reply(&mut self) {
        self.missed = 0;
    }

    /// Total silence tolerated before expiry.
    pub fn window(&self) -> Duration {
        self.interval * (self.fail_limit + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expires_after_limit_plus_one_idle_ticks() {
        let mut ka = KeepAlive::new(Duration::from_secs(1), 3, true);
        let outcomes: Vec<Idle> = (0..4).map(|_| ka.on_idle()).collect();
        assert_eq!(outcomes, vec![Idle::Probe, Idle::Probe, Idle::Probe, Idle::Expired]);
        assert_eq!(ka.window(), Duration::from_secs(4));
    }

    #[test]
    fn test_reply_resets_counter() {
        let mut ka = KeepAlive::new(Duration::from_secs(1), 1, true);
        assert_eq!(ka.on_idle(), Idle::Probe);
        ka.on_reply();
        assert_eq!(ka.missed(), 0);
        assert_eq!(ka.on_idle(), Idle::Probe);
        assert_eq!(ka.on_idle(), Idle::Expired);
    }

    #[test]
    fn test_disabled_never_expires() {
        let mut ka = KeepAlive::new(Duration::from_secs(1), 0, false);
        for _ in 0..10 {
            assert_eq!(ka.on_idle(), Idle::Disabled);
        }
        assert!(!KeepAlive::new(Duration::ZERO, 3, true).is_enabled());
    }
}

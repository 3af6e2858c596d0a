//! Tuning for the adaptive flow controller.

use std::time::Duration;

use bon::Builder;

use crate::Error;

/// Default length of the completion window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15);
/// Default admission horizon: how many seconds of throughput may be outstanding.
pub const DEFAULT_HORIZON: Duration = Duration::from_secs(2);
/// Default period between rate refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// Options for an [OutstandingCountFlowController](crate::OutstandingCountFlowController).
///
/// ```
/// use std::time::Duration;
/// use outstanding_flow_control::Options;
///
/// let options = Options::builder()
///     .window(Duration::from_secs(30))
///     .horizon(Duration::from_secs(1))
///     .build();
///
/// assert_eq!(options.first_refresh(), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct Options {
    /// Trailing interval over which successful completions are counted.
    #[builder(default = DEFAULT_WINDOW)]
    window: Duration,
    /// How much estimated throughput may be outstanding at once.
    #[builder(default = DEFAULT_HORIZON)]
    horizon: Duration,
    /// Period between rate refreshes, after the first.
    #[builder(default = DEFAULT_REFRESH_INTERVAL)]
    refresh_interval: Duration,
    /// Delay before the first refresh. Defaults to the window length, so the seed rate stays
    /// live until the window holds meaningful data.
    first_refresh: Option<Duration>,
}

impl Options {
    /// The completion window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// The admission horizon.
    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    /// The period between rate refreshes.
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// The delay before the first rate refresh.
    pub fn first_refresh(&self) -> Duration {
        self.first_refresh.unwrap_or(self.window)
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.window.is_zero() {
            return Err(Error::InvalidOptions("window must be non-zero"));
        }
        if self.horizon.is_zero() {
            return Err(Error::InvalidOptions("horizon must be non-zero"));
        }
        if self.refresh_interval.is_zero() {
            return Err(Error::InvalidOptions("refresh interval must be non-zero"));
        }
        Ok(())
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults() {
        let options = Options::default();

        assert_eq!(options.window(), Duration::from_secs(15));
        assert_eq!(options.horizon(), Duration::from_secs(2));
        assert_eq!(options.refresh_interval(), Duration::from_millis(100));
        assert_eq!(options.first_refresh(), options.window());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn explicit_first_refresh() {
        let options = Options::builder()
            .first_refresh(Duration::from_secs(1))
            .build();

        assert_eq!(options.first_refresh(), Duration::from_secs(1));
    }

    #[test]
    fn rejects_zero_durations() {
        let zero_window = Options::builder().window(Duration::ZERO).build();
        assert_matches!(zero_window.validate(), Err(Error::InvalidOptions(_)));

        let zero_horizon = Options::builder().horizon(Duration::ZERO).build();
        assert_matches!(zero_horizon.validate(), Err(Error::InvalidOptions(_)));

        let zero_interval = Options::builder().refresh_interval(Duration::ZERO).build();
        assert_matches!(zero_interval.validate(), Err(Error::InvalidOptions(_)));
    }
}

// src/backoff.rs
//! Monotonic attempt counter yielding bounded exponential delay with jitter.

mod private
{
  use std::time::Duration;
  use rand::Rng;

  /// `(base, multiplier, max, jitter)` configuration for an `ExponentialBackoff`.
  #[ derive( Debug, Clone, Copy ) ]
  pub struct BackoffConfig
  {
    /// Delay for attempt zero, before the multiplier is applied.
    pub base : Duration,
    /// Growth factor applied per attempt.
    pub multiplier : f64,
    /// Ceiling the computed delay is clamped to, before jitter.
    pub max : Duration,
    /// Jitter fraction; the final delay is scaled uniformly in
    /// `[1 - jitter, 1 + jitter]`.
    pub jitter : f64,
  }

  impl Default for BackoffConfig
  {
    fn default() -> Self
    {
      Self { base : Duration::from_millis( 500 ), multiplier : 2.0, max : Duration::from_secs( 30 ), jitter : 0.2 }
    }
  }

  /// Monotonic per-`ProviderInstance` attempt counter.
  ///
  /// Not internally synchronized; callers hold it behind the owning
  /// provider instance's mutex.
  #[ derive( Debug, Clone ) ]
  pub struct ExponentialBackoff
  {
    config : BackoffConfig,
    attempt : u32,
  }

  impl ExponentialBackoff
  {
    /// Build a fresh backoff at attempt zero.
    #[ must_use ]
    pub fn new( config : BackoffConfig ) -> Self
    {
      Self { config, attempt : 0 }
    }

    /// Current attempt counter.
    #[ must_use ]
    #[ inline ]
    pub fn attempt( &self ) -> u32
    {
      self.attempt
    }

    /// `min(base * multiplier ^ attempt, max)`, scaled by a uniform jitter
    /// factor in `[1 - jitter, 1 + jitter]`.
    #[ must_use ]
    pub fn get_delay( &self ) -> Duration
    {
      let base_ms = self.config.base.as_secs_f64() * 1000.0;
      let max_ms = self.config.max.as_secs_f64() * 1000.0;
      let raw_ms = base_ms * self.config.multiplier.powi( self.attempt as i32 );
      let clamped_ms = raw_ms.min( max_ms );

      let jitter_factor = if self.config.jitter > 0.0
      {
        rand::rng().random_range( 1.0 - self.config.jitter ..= 1.0 + self.config.jitter )
      }
      else
      {
        1.0
      };

      Duration::from_secs_f64( ( clamped_ms * jitter_factor ).max( 0.0 ) / 1000.0 )
    }

    /// Advance the attempt counter.
    pub fn record_attempt( &mut self )
    {
      self.attempt += 1;
    }

    /// Reset the attempt counter to zero.
    pub fn reset( &mut self )
    {
      self.attempt = 0;
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ test ]
    fn delay_grows_and_clamps_to_max()
    {
      let config = BackoffConfig { base : Duration::from_millis( 100 ), multiplier : 2.0, max : Duration::from_millis( 500 ), jitter : 0.0 };
      let mut backoff = ExponentialBackoff::new( config );
      assert_eq!( backoff.get_delay(), Duration::from_millis( 100 ) );
      backoff.record_attempt();
      assert_eq!( backoff.get_delay(), Duration::from_millis( 200 ) );
      backoff.record_attempt();
      assert_eq!( backoff.get_delay(), Duration::from_millis( 400 ) );
      backoff.record_attempt();
      assert_eq!( backoff.get_delay(), Duration::from_millis( 500 ) );
    }

    #[ test ]
    fn reset_zeroes_attempt()
    {
      let mut backoff = ExponentialBackoff::new( BackoffConfig::default() );
      backoff.record_attempt();
      backoff.record_attempt();
      assert_eq!( backoff.attempt(), 2 );
      backoff.reset();
      assert_eq!( backoff.attempt(), 0 );
    }

    #[ test ]
    fn jitter_stays_within_bounds()
    {
      let config = BackoffConfig { base : Duration::from_millis( 1000 ), multiplier : 1.0, max : Duration::from_millis( 1000 ), jitter : 0.5 };
      let backoff = ExponentialBackoff::new( config );
      for _ in 0 .. 50
      {
        let delay = backoff.get_delay();
        assert!( delay >= Duration::from_millis( 500 ) );
        assert!( delay <= Duration::from_millis( 1500 ) );
      }
    }
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::BackoffConfig;
  exposed use private::ExponentialBackoff;
}

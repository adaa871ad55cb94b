// src/circuit_breaker.rs
//! Three-state health gate protecting a single provider instance.

mod private
{
  use std::time::{ Duration, Instant };

  /// Health state of a `CircuitBreaker`.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize ) ]
  #[ serde( rename_all = "snake_case" ) ]
  pub enum CircuitState
  {
    /// Requests are attempted normally.
    Closed,
    /// Requests are refused until `timeout` elapses since `last_failure`.
    Open,
    /// A single probing window: attempts are allowed, but any failure
    /// reopens the circuit immediately.
    HalfOpen,
  }

  impl core::fmt::Display for CircuitState
  {
    fn fmt( &self, f : &mut core::fmt::Formatter< '_ > ) -> core::fmt::Result
    {
      let s = match self
      {
        CircuitState::Closed => "closed",
        CircuitState::Open => "open",
        CircuitState::HalfOpen => "half_open",
      };
      write!( f, "{s}" )
    }
  }

  /// Configuration thresholds for a `CircuitBreaker`.
  #[ derive( Debug, Clone, Copy ) ]
  pub struct CircuitBreakerConfig
  {
    /// Consecutive failures (while closed) before tripping open.
    pub failure_threshold : u32,
    /// Consecutive successes (while half-open) before closing again.
    pub success_threshold : u32,
    /// Time an open circuit must wait before allowing a probe attempt.
    pub timeout : Duration,
  }

  impl Default for CircuitBreakerConfig
  {
    fn default() -> Self
    {
      Self { failure_threshold : 5, success_threshold : 2, timeout : Duration::from_secs( 30 ) }
    }
  }

  /// Three-state gate (closed / open / half-open) for one provider instance.
  ///
  /// Not internally synchronized; callers hold it behind the owning
  /// provider instance's mutex (spec.md §5).
  #[ derive( Debug, Clone ) ]
  pub struct CircuitBreaker
  {
    config : CircuitBreakerConfig,
    state : CircuitState,
    failure_count : u32,
    success_count : u32,
    last_failure : Option< Instant >,
  }

  impl CircuitBreaker
  {
    /// Build a new circuit breaker, initially closed with zeroed counters.
    #[ must_use ]
    pub fn new( config : CircuitBreakerConfig ) -> Self
    {
      Self { config, state : CircuitState::Closed, failure_count : 0, success_count : 0, last_failure : None }
    }

    /// Current state.
    #[ must_use ]
    #[ inline ]
    pub fn state( &self ) -> CircuitState
    {
      self.state
    }

    /// Consecutive-failure counter (closed state) or reopen trigger count.
    #[ must_use ]
    #[ inline ]
    pub fn failure_count( &self ) -> u32
    {
      self.failure_count
    }

    /// Consecutive-success counter (half-open state only).
    #[ must_use ]
    #[ inline ]
    pub fn success_count( &self ) -> u32
    {
      self.success_count
    }

    /// `true` iff a request may currently be attempted. Transitions an
    /// expired `open` circuit into `half_open` as a side effect.
    pub fn can_attempt( &mut self ) -> bool
    {
      match self.state
      {
        CircuitState::Closed | CircuitState::HalfOpen => true,
        CircuitState::Open =>
        {
          let elapsed = self.last_failure.map_or( Duration::MAX, | t | t.elapsed() );
          if elapsed >= self.config.timeout
          {
            self.state = CircuitState::HalfOpen;
            self.failure_count = 0;
            self.success_count = 0;
            tracing::info!( "circuit breaker half-opening after timeout" );
            true
          }
          else
          {
            false
          }
        },
      }
    }

    /// Record a successful attempt.
    pub fn record_success( &mut self )
    {
      match self.state
      {
        CircuitState::Closed =>
        {
          self.failure_count = self.failure_count.saturating_sub( 1 );
        },
        CircuitState::HalfOpen =>
        {
          self.success_count += 1;
          if self.success_count >= self.config.success_threshold
          {
            tracing::info!( "circuit breaker closing after {} successes", self.success_count );
            self.state = CircuitState::Closed;
            self.failure_count = 0;
            self.success_count = 0;
          }
        },
        CircuitState::Open => {},
      }
    }

    /// Restore persisted state (spec.md §6.4). `last_failure` is reset to
    /// "now" when the restored state is `open`, since only an elapsed
    /// wall-clock instant is persisted, not a monotonic one comparable
    /// across a restart.
    pub fn restore( &mut self, state : CircuitState, failure_count : u32, success_count : u32 )
    {
      self.state = state;
      self.failure_count = failure_count;
      self.success_count = success_count;
      self.last_failure = if state == CircuitState::Open { Some( Instant::now() ) } else { None };
    }

    /// Record a failed attempt.
    pub fn record_failure( &mut self )
    {
      match self.state
      {
        CircuitState::Closed =>
        {
          self.failure_count += 1;
          if self.failure_count >= self.config.failure_threshold
          {
            tracing::warn!( "circuit breaker opening after {} consecutive failures", self.failure_count );
            self.state = CircuitState::Open;
            self.last_failure = Some( Instant::now() );
          }
        },
        CircuitState::HalfOpen =>
        {
          tracing::warn!( "circuit breaker reopening: probe failed" );
          self.state = CircuitState::Open;
          self.success_count = 0;
          self.last_failure = Some( Instant::now() );
        },
        CircuitState::Open =>
        {
          self.last_failure = Some( Instant::now() );
        },
      }
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ test ]
    fn opens_after_threshold_failures()
    {
      let mut cb = CircuitBreaker::new( CircuitBreakerConfig { failure_threshold : 3, success_threshold : 1, timeout : Duration::from_secs( 30 ) } );
      assert!( cb.can_attempt() );
      cb.record_failure();
      cb.record_failure();
      assert_eq!( cb.state(), CircuitState::Closed );
      cb.record_failure();
      assert_eq!( cb.state(), CircuitState::Open );
      assert!( !cb.can_attempt() );
    }

    #[ test ]
    fn half_open_closes_on_success_threshold()
    {
      let mut cb = CircuitBreaker::new( CircuitBreakerConfig { failure_threshold : 1, success_threshold : 2, timeout : Duration::from_millis( 0 ) } );
      cb.record_failure();
      assert_eq!( cb.state(), CircuitState::Open );
      assert!( cb.can_attempt() );
      assert_eq!( cb.state(), CircuitState::HalfOpen );
      cb.record_success();
      assert_eq!( cb.state(), CircuitState::HalfOpen );
      cb.record_success();
      assert_eq!( cb.state(), CircuitState::Closed );
    }

    #[ test ]
    fn half_open_failure_reopens()
    {
      let mut cb = CircuitBreaker::new( CircuitBreakerConfig { failure_threshold : 1, success_threshold : 2, timeout : Duration::from_millis( 0 ) } );
      cb.record_failure();
      assert!( cb.can_attempt() );
      cb.record_failure();
      assert_eq!( cb.state(), CircuitState::Open );
    }

    #[ test ]
    fn success_decays_failure_count_in_closed_state()
    {
      let mut cb = CircuitBreaker::new( CircuitBreakerConfig::default() );
      cb.record_failure();
      cb.record_failure();
      assert_eq!( cb.failure_count(), 2 );
      cb.record_success();
      assert_eq!( cb.failure_count(), 1 );
    }
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::CircuitState;
  exposed use private::CircuitBreakerConfig;
  exposed use private::CircuitBreaker;
}

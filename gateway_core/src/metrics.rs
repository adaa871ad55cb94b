// src/metrics.rs
//! Process-wide aggregate counters and rolling windows, updated on every
//! request success and failure.

mod private
{
  use std::collections::VecDeque;
  use std::sync::Mutex;
  use std::time::{ Duration, Instant };

  use serde::{ Deserialize, Serialize };

  /// Rolling-window sample cap for `GlobalMetrics` (distinct from
  /// `SpeedTracker`'s per-instance cap of 100).
  const GLOBAL_WINDOW_CAP : usize = 1000;

  #[ derive( Debug, Default ) ]
  struct Inner
  {
    total_requests : u64,
    total_errors : u64,
    total_prompt_tokens : u64,
    total_completion_tokens : u64,
    total_tokens : u64,
    total_credits : f64,
    durations : VecDeque< f64 >,
    ttfts : VecDeque< f64 >,
    request_timestamps : VecDeque< f64 >,
    error_timestamps : VecDeque< f64 >,
  }

  /// Point-in-time snapshot suitable for serialization and persistence
  /// (rolling windows are deliberately not part of the snapshot; spec.md
  /// §3/§6.4 says only aggregates are persisted).
  #[ derive( Debug, Clone, Copy, Default, Serialize, Deserialize ) ]
  pub struct GlobalMetricsSnapshot
  {
    pub total_requests : u64,
    pub total_errors : u64,
    pub total_prompt_tokens : u64,
    pub total_completion_tokens : u64,
    pub total_tokens : u64,
    pub total_credits : f64,
    pub mean_duration : f64,
    pub p95_duration : f64,
    pub mean_ttft : f64,
    pub p95_ttft : f64,
    pub uptime_seconds : f64,
    /// Requests observed over the span covered by the request-timestamp
    /// window, per second. Zero until at least two requests have landed.
    #[ serde( default ) ]
    pub requests_per_second : f64,
    /// Same as `requests_per_second`, but over the error-timestamp window.
    #[ serde( default ) ]
    pub errors_per_second : f64,
  }

  /// Aggregate counters and rolling windows for the whole process.
  ///
  /// One mutex guards the entire structure; contention is acceptable since
  /// it is acquired once per request completion or error (spec.md §5).
  #[ derive( Debug ) ]
  pub struct GlobalMetrics
  {
    inner : Mutex< Inner >,
    started_at : Instant,
  }

  impl Default for GlobalMetrics
  {
    fn default() -> Self
    {
      Self::new()
    }
  }

  impl GlobalMetrics
  {
    #[ must_use ]
    pub fn new() -> Self
    {
      Self { inner : Mutex::new( Inner::default() ), started_at : Instant::now() }
    }

    /// Restore aggregate counters from a persisted snapshot. Rolling
    /// windows start empty; they are never restored (spec.md §6.4).
    pub fn restore( &self, snapshot : GlobalMetricsSnapshot )
    {
      let mut inner = self.inner.lock().expect( "global metrics mutex poisoned" );
      inner.total_requests = snapshot.total_requests;
      inner.total_errors = snapshot.total_errors;
      inner.total_prompt_tokens = snapshot.total_prompt_tokens;
      inner.total_completion_tokens = snapshot.total_completion_tokens;
      inner.total_tokens = snapshot.total_tokens;
      inner.total_credits = snapshot.total_credits;
    }

    /// Record a successful request.
    pub fn record_request( &self, duration : Duration, in_tokens : u64, out_tokens : u64, ttft : Duration, credits : f64 )
    {
      let mut inner = self.inner.lock().expect( "global metrics mutex poisoned" );
      inner.total_requests += 1;
      inner.total_prompt_tokens += in_tokens;
      inner.total_completion_tokens += out_tokens;
      inner.total_tokens += in_tokens + out_tokens;
      inner.total_credits += credits;

      push_capped( &mut inner.durations, duration.as_secs_f64() );
      push_capped( &mut inner.ttfts, ttft.as_secs_f64() );
      let now = self.started_at.elapsed().as_secs_f64();
      push_capped( &mut inner.request_timestamps, now );
    }

    /// Record a failed attempt.
    pub fn record_error( &self )
    {
      let mut inner = self.inner.lock().expect( "global metrics mutex poisoned" );
      inner.total_errors += 1;
      let now = self.started_at.elapsed().as_secs_f64();
      push_capped( &mut inner.error_timestamps, now );
    }

    /// A coherent snapshot taken under the same lock that updates the
    /// windows it derives from.
    #[ must_use ]
    pub fn snapshot( &self ) -> GlobalMetricsSnapshot
    {
      let inner = self.inner.lock().expect( "global metrics mutex poisoned" );
      GlobalMetricsSnapshot
      {
        total_requests : inner.total_requests,
        total_errors : inner.total_errors,
        total_prompt_tokens : inner.total_prompt_tokens,
        total_completion_tokens : inner.total_completion_tokens,
        total_tokens : inner.total_tokens,
        total_credits : inner.total_credits,
        mean_duration : mean( inner.durations.iter().copied() ),
        p95_duration : percentile_95( inner.durations.iter().copied() ),
        mean_ttft : mean( inner.ttfts.iter().copied() ),
        p95_ttft : percentile_95( inner.ttfts.iter().copied() ),
        uptime_seconds : self.started_at.elapsed().as_secs_f64(),
        requests_per_second : window_rate( &inner.request_timestamps ),
        errors_per_second : window_rate( &inner.error_timestamps ),
      }
    }
  }

  /// Count of samples divided by the span they cover; zero with fewer than
  /// two samples (no span to divide by).
  fn window_rate( timestamps : &VecDeque< f64 > ) -> f64
  {
    match ( timestamps.front(), timestamps.back() )
    {
      ( Some( &oldest ), Some( &newest ) ) if newest > oldest => timestamps.len() as f64 / ( newest - oldest ),
      _ => 0.0,
    }
  }

  fn push_capped( window : &mut VecDeque< f64 >, value : f64 )
  {
    if window.len() >= GLOBAL_WINDOW_CAP
    {
      window.pop_front();
    }
    window.push_back( value );
  }

  fn mean( values : impl Iterator< Item = f64 > ) -> f64
  {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values
    {
      sum += v;
      count += 1;
    }
    if count == 0 { 0.0 } else { sum / count as f64 }
  }

  fn percentile_95( values : impl Iterator< Item = f64 > ) -> f64
  {
    let mut sorted : Vec< f64 > = values.collect();
    if sorted.is_empty()
    {
      return 0.0;
    }
    sorted.sort_by( | a, b | a.partial_cmp( b ).expect( "durations are never NaN" ) );
    let rank = ( ( sorted.len() as f64 ) * 0.95 ).ceil() as usize;
    let index = rank.saturating_sub( 1 ).min( sorted.len() - 1 );
    sorted[ index ]
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ test ]
    fn records_requests_and_errors()
    {
      let metrics = GlobalMetrics::new();
      metrics.record_request( Duration::from_millis( 100 ), 10, 20, Duration::from_millis( 5 ), 1.0 );
      metrics.record_error();
      let snapshot = metrics.snapshot();
      assert_eq!( snapshot.total_requests, 1 );
      assert_eq!( snapshot.total_errors, 1 );
      assert_eq!( snapshot.total_tokens, 30 );
    }

    #[ test ]
    fn restore_does_not_populate_rolling_windows()
    {
      let metrics = GlobalMetrics::new();
      metrics.restore( GlobalMetricsSnapshot { total_requests : 42, ..Default::default() } );
      let snapshot = metrics.snapshot();
      assert_eq!( snapshot.total_requests, 42 );
      assert_eq!( snapshot.mean_duration, 0.0 );
    }

    #[ test ]
    fn window_caps_at_1000_samples()
    {
      let metrics = GlobalMetrics::new();
      for _ in 0 .. 1100
      {
        metrics.record_request( Duration::from_millis( 1 ), 1, 1, Duration::ZERO, 0.0 );
      }
      let inner = metrics.inner.lock().unwrap();
      assert_eq!( inner.durations.len(), GLOBAL_WINDOW_CAP );
      assert_eq!( inner.request_timestamps.len(), GLOBAL_WINDOW_CAP );
    }

    #[ test ]
    fn error_timestamps_populate_independently_of_requests()
    {
      let metrics = GlobalMetrics::new();
      metrics.record_error();
      metrics.record_error();
      let inner = metrics.inner.lock().unwrap();
      assert_eq!( inner.error_timestamps.len(), 2 );
      assert!( inner.request_timestamps.is_empty() );
    }
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::GlobalMetricsSnapshot;
  exposed use private::GlobalMetrics;
}

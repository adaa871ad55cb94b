// src/speed_tracker.rs
//! Bounded rolling window of latency, throughput, and time-to-first-token
//! samples for one provider instance.

mod private
{
  use std::collections::VecDeque;
  use std::time::Duration;

  /// Samples retained per `SpeedTracker` before the oldest is evicted.
  const WINDOW_CAP : usize = 100;

  /// TTFT values larger than this are assumed to be absolute timestamps
  /// rather than durations, and are normalized by the caller before
  /// recording; `SpeedTracker` only asserts the invariant holds.
  const TTFT_SANITY_BOUND_SECS : f64 = 1_000_000_000.0;

  #[ derive( Debug, Clone, Copy ) ]
  struct Sample
  {
    duration : Duration,
    out_tokens : u64,
    ttft : Duration,
  }

  /// Bounded-length rolling window (cap 100) of `(duration, out_tokens,
  /// ttft)` samples, with derived mean/p95/throughput.
  ///
  /// Not internally synchronized; callers hold it behind the owning
  /// provider instance's mutex.
  #[ derive( Debug, Clone, Default ) ]
  pub struct SpeedTracker
  {
    samples : VecDeque< Sample >,
  }

  impl SpeedTracker
  {
    /// Build an empty tracker.
    #[ must_use ]
    pub fn new() -> Self
    {
      Self { samples : VecDeque::with_capacity( WINDOW_CAP ) }
    }

    /// Record one completed call's duration, output-token count, and
    /// time-to-first-token. `ttft` must already be a duration from request
    /// start; if a caller accidentally passes an absolute timestamp (larger
    /// than the sanity bound), it is normalized to zero rather than
    /// corrupting the rolling mean.
    pub fn record( &mut self, duration : Duration, out_tokens : u64, ttft : Duration )
    {
      let ttft = if ttft.as_secs_f64() > TTFT_SANITY_BOUND_SECS
      {
        tracing::warn!( "ttft sample looks like an absolute timestamp, normalizing to zero" );
        Duration::ZERO
      }
      else
      {
        ttft
      };

      if self.samples.len() >= WINDOW_CAP
      {
        self.samples.pop_front();
      }
      self.samples.push_back( Sample { duration, out_tokens, ttft } );
    }

    /// Number of samples currently retained.
    #[ must_use ]
    pub fn len( &self ) -> usize
    {
      self.samples.len()
    }

    /// `true` iff no samples have been recorded yet.
    #[ must_use ]
    pub fn is_empty( &self ) -> bool
    {
      self.samples.is_empty()
    }

    /// Mean duration over the current window, in seconds.
    #[ must_use ]
    pub fn mean_duration( &self ) -> f64
    {
      mean( self.samples.iter().map( | s | s.duration.as_secs_f64() ) )
    }

    /// 95th-percentile duration over the current window, in seconds.
    #[ must_use ]
    pub fn p95_duration( &self ) -> f64
    {
      percentile_95( self.samples.iter().map( | s | s.duration.as_secs_f64() ) )
    }

    /// Mean time-to-first-token over the current window, in seconds.
    #[ must_use ]
    pub fn mean_ttft( &self ) -> f64
    {
      mean( self.samples.iter().map( | s | s.ttft.as_secs_f64() ) )
    }

    /// 95th-percentile time-to-first-token over the current window, in seconds.
    #[ must_use ]
    pub fn p95_ttft( &self ) -> f64
    {
      percentile_95( self.samples.iter().map( | s | s.ttft.as_secs_f64() ) )
    }

    /// Throughput in output tokens per second: `sum(out_tokens) /
    /// sum(duration)`. Zero if the window is empty or total duration is
    /// zero.
    #[ must_use ]
    pub fn throughput( &self ) -> f64
    {
      let total_tokens : u64 = self.samples.iter().map( | s | s.out_tokens ).sum();
      let total_duration : f64 = self.samples.iter().map( | s | s.duration.as_secs_f64() ).sum();
      if total_duration > 0.0
      {
        total_tokens as f64 / total_duration
      }
      else
      {
        0.0
      }
    }
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

  /// Nearest-rank p95 over an unordered iterator; re-sorts on every call
  /// rather than maintaining order incrementally, since eviction from the
  /// front would otherwise require re-deriving order anyway.
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
    fn empty_tracker_reports_zero()
    {
      let tracker = SpeedTracker::new();
      assert!( tracker.is_empty() );
      assert_eq!( tracker.mean_duration(), 0.0 );
      assert_eq!( tracker.throughput(), 0.0 );
    }

    #[ test ]
    fn throughput_is_tokens_over_duration()
    {
      let mut tracker = SpeedTracker::new();
      tracker.record( Duration::from_secs( 1 ), 50, Duration::from_millis( 100 ) );
      tracker.record( Duration::from_secs( 1 ), 50, Duration::from_millis( 100 ) );
      assert!( ( tracker.throughput() - 50.0 ).abs() < 1e-9 );
    }

    #[ test ]
    fn window_evicts_oldest_past_cap()
    {
      let mut tracker = SpeedTracker::new();
      for i in 0 .. WINDOW_CAP + 10
      {
        tracker.record( Duration::from_millis( i as u64 ), 1, Duration::ZERO );
      }
      assert_eq!( tracker.len(), WINDOW_CAP );
    }

    #[ test ]
    fn ttft_sanity_bound_normalizes_absolute_timestamps()
    {
      let mut tracker = SpeedTracker::new();
      tracker.record( Duration::from_millis( 50 ), 10, Duration::from_secs( 1_700_000_000 ) );
      assert_eq!( tracker.mean_ttft(), 0.0 );
    }

    #[ test ]
    fn p95_matches_nearest_rank()
    {
      let mut tracker = SpeedTracker::new();
      for i in 1 ..= 20
      {
        tracker.record( Duration::from_millis( i * 10 ), 1, Duration::ZERO );
      }
      // 95th percentile of 1..=20 (in units of 10ms) is rank ceil(20*0.95)=19 -> value 190ms.
      assert!( ( tracker.p95_duration() - 0.190 ).abs() < 1e-9 );
    }
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::SpeedTracker;
}

// src/credential_pool.rs
//! Ordered set of API credentials for one provider instance: round-robin
//! selection filtered by per-credential rate limit, cooldown, and
//! credit-balance state.

mod private
{
  use std::sync::{ Arc, Mutex };
  use std::time::{ Duration, Instant };

  use serde::Serialize;

  use crate::rate_limiter::{ LimitKey, RateLimitTracker, TokenUsage };
  use crate::secret::Secret;

  /// Current usage against one configured rate limit, for introspection.
  #[ derive( Debug, Clone, Serialize ) ]
  pub struct LimitUsage
  {
    pub key : LimitKey,
    pub used : f64,
    pub bound : f64,
  }

  /// Per-credential introspection snapshot (provider/stats endpoints):
  /// failure and cooldown state plus current rate-limit usage, without ever
  /// exposing the credential value itself.
  #[ derive( Debug, Clone, Serialize ) ]
  pub struct CredentialStatus
  {
    /// Position of this credential within the pool; stable across calls.
    pub key_index : usize,
    pub consecutive_failures : u32,
    /// `true` iff the key is currently disabled after a failure.
    pub disabled : bool,
    /// Seconds remaining until `disabled` clears; zero when not disabled.
    pub disabled_for_secs : f64,
    pub rate_limited : bool,
    pub usage : Vec< LimitUsage >,
  }

  /// Opaque reference to one credential within a `CredentialPool`. Returned
  /// by [`CredentialPool::select`] and fed back into `mark_success`,
  /// `mark_failure`, and `record_usage`.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Hash ) ]
  pub struct CredentialHandle( usize );

  #[ derive( Debug ) ]
  struct KeyState
  {
    consecutive_failures : u32,
    disabled_until : Option< Instant >,
  }

  impl Default for KeyState
  {
    fn default() -> Self
    {
      Self { consecutive_failures : 0, disabled_until : None }
    }
  }

  /// Round-robin pool of credentials for one `ProviderInstance`.
  ///
  /// Per-key `RateLimitTracker`s are held as shared handles: the Registry
  /// owns the canonical `credential -> tracker` map and may hand the same
  /// `Arc<Mutex<_>>` to several pools when a key is reused across provider
  /// instances. Not internally synchronized beyond that; the owning
  /// provider instance's mutex serializes pool access end to end (spec.md §5).
  #[ derive( Debug ) ]
  pub struct CredentialPool
  {
    keys : Vec< Secret >,
    state : Vec< KeyState >,
    limiters : Vec< Arc< Mutex< RateLimitTracker > > >,
    cursor : usize,
    cooldown : Duration,
  }

  impl CredentialPool
  {
    /// Build a pool from `keys` and their matching rate-limit tracker
    /// handles (same length and order). `cooldown` is how long a key stays
    /// disabled after `mark_failure`.
    ///
    /// # Panics
    /// Panics if `keys` and `limiters` differ in length — this is a
    /// construction-time invariant violation, not a runtime condition.
    #[ must_use ]
    pub fn new( keys : Vec< Secret >, limiters : Vec< Arc< Mutex< RateLimitTracker > > >, cooldown : Duration ) -> Self
    {
      assert_eq!( keys.len(), limiters.len(), "credential pool keys and limiters must be parallel" );
      let state = keys.iter().map( | _ | KeyState::default() ).collect();
      Self { keys, state, limiters, cursor : 0, cooldown }
    }

    /// Number of credentials in the pool.
    #[ must_use ]
    pub fn len( &self ) -> usize
    {
      self.keys.len()
    }

    /// `true` iff the pool has no credentials at all (adapter must then
    /// accept a null credential, per spec.md §3).
    #[ must_use ]
    pub fn is_empty( &self ) -> bool
    {
      self.keys.is_empty()
    }

    /// Borrow the credential a handle refers to.
    #[ must_use ]
    pub fn secret( &self, handle : CredentialHandle ) -> &Secret
    {
      &self.keys[ handle.0 ]
    }

    /// Flat per-request credit rate shared by every key's tracker in this
    /// pool, used by `ProviderInstance::current_credential` to pass a
    /// non-zero `required_credits` into `select`. Taken literally, spec.md
    /// §4.6 always calls `select(required_credits=0)`, which would make
    /// credit-balance exhaustion unobservable at selection time; estimating
    /// the statically known flat per-request cost here is what makes the
    /// credit-exhaustion end-to-end scenario in spec.md §8 actually occur.
    #[ must_use ]
    pub fn estimate_required_credits( &self ) -> f64
    {
      self.limiters.first().map_or( 0.0, | t | t.lock().expect( "rate limiter mutex poisoned" ).configured_request_credit_rate() )
    }

    /// Select the next eligible credential by round robin.
    ///
    /// 1. Clear any expired cooldowns.
    /// 2. Build the eligible set: active, not rate-limited, and (when
    ///    `required_credits > 0`) has sufficient credit balance.
    /// 3. If nothing is eligible, emergency-unblock the key with the oldest
    ///    `disabled_until` and treat it as the sole eligible key.
    /// 4. Walk forward from `cursor`, advancing it each step, and return the
    ///    first eligible key encountered.
    ///
    /// Returns `None` only when the pool itself is empty.
    pub fn select( &mut self, required_credits : f64 ) -> Option< CredentialHandle >
    {
      if self.keys.is_empty()
      {
        return None;
      }

      let now = Instant::now();

      for key_state in &mut self.state
      {
        if let Some( disabled_until ) = key_state.disabled_until
        {
          if now >= disabled_until
          {
            key_state.disabled_until = None;
            key_state.consecutive_failures = 0;
          }
        }
      }

      let mut eligible : Vec< usize > = ( 0 .. self.keys.len() )
        .filter( | &i |
        {
          if self.state[ i ].disabled_until.is_some()
          {
            return false;
          }
          let mut limiter = self.limiters[ i ].lock().expect( "rate limiter mutex poisoned" );
          if limiter.is_limited()
          {
            return false;
          }
          required_credits <= 0.0 || limiter.has_sufficient_credits( required_credits )
        } )
        .collect();

      if eligible.is_empty()
      {
        let oldest = self.state
          .iter()
          .enumerate()
          .filter_map( | ( i, s ) | s.disabled_until.map( | d | ( i, d ) ) )
          .min_by_key( | &( _, d ) | d );

        match oldest
        {
          Some( ( idx, _ ) ) =>
          {
            tracing::warn!( key_index = idx, "emergency-unblocking credential: no eligible keys" );
            self.state[ idx ].disabled_until = None;
            eligible.push( idx );
          },
          None => return None,
        }
      }

      let n = self.keys.len();
      let mut idx = self.cursor;
      for _ in 0 .. n
      {
        let candidate = idx;
        idx = ( idx + 1 ) % n;
        self.cursor = idx;
        if eligible.contains( &candidate )
        {
          return Some( CredentialHandle( candidate ) );
        }
      }

      // Every candidate was visited without a match against `eligible`
      // built above; this can only happen if the emergency-unblocked key
      // does not line up with the walk, which it always does by construction.
      Some( CredentialHandle( eligible[ 0 ] ) )
    }

    /// Clear failure state for a key that just succeeded.
    pub fn mark_success( &mut self, handle : CredentialHandle )
    {
      let state = &mut self.state[ handle.0 ];
      state.consecutive_failures = 0;
      state.disabled_until = None;
    }

    /// Disable a key for `cooldown` after a failed attempt.
    pub fn mark_failure( &mut self, handle : CredentialHandle )
    {
      let state = &mut self.state[ handle.0 ];
      state.consecutive_failures += 1;
      state.disabled_until = Some( Instant::now() + self.cooldown );
      tracing::debug!( key_index = handle.0, consecutive_failures = state.consecutive_failures, "credential disabled after failure" );
    }

    /// Per-credential introspection snapshot for `GET /v1/providers/stats`:
    /// consecutive failures, cooldown state, and current rate-limit usage
    /// for every key in the pool, in index order.
    #[ must_use ]
    pub fn statuses( &self ) -> Vec< CredentialStatus >
    {
      let now = Instant::now();
      ( 0 .. self.keys.len() )
        .map( | i |
        {
          let key_state = &self.state[ i ];
          let disabled = key_state.disabled_until.is_some_and( | d | d > now );
          let disabled_for_secs = key_state.disabled_until.map_or( 0.0, | d | d.saturating_duration_since( now ).as_secs_f64() );

          let mut limiter = self.limiters[ i ].lock().expect( "rate limiter mutex poisoned" );
          let rate_limited = limiter.is_limited();
          let usage = limiter.usage_stats().into_iter().map( | ( key, used, bound ) | LimitUsage { key, used, bound } ).collect();

          CredentialStatus { key_index : i, consecutive_failures : key_state.consecutive_failures, disabled, disabled_for_secs, rate_limited, usage }
        } )
        .collect()
    }

    /// Forward usage to the key's rate-limit tracker and, if a non-zero
    /// credit cost was charged, spend it against the key's credit balance.
    /// Returns the credits charged.
    pub fn record_usage( &mut self, handle : CredentialHandle, usage : TokenUsage, credits_param : Option< f64 > ) -> f64
    {
      let mut limiter = self.limiters[ handle.0 ].lock().expect( "rate limiter mutex poisoned" );
      let charged = limiter.record( usage, credits_param );
      if charged > 0.0
      {
        limiter.spend( charged );
      }
      charged
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;
    use crate::rate_limiter::RateLimitConfig;

    fn unbounded_pool( n : usize ) -> CredentialPool
    {
      let keys : Vec< Secret > = ( 0 .. n ).map( | i | Secret::new_unchecked( format!( "key-{i}" ) ) ).collect();
      let limiters = ( 0 .. n ).map( | _ | Arc::new( Mutex::new( RateLimitTracker::new( RateLimitConfig::unbounded() ) ) ) ).collect();
      CredentialPool::new( keys, limiters, Duration::from_secs( 30 ) )
    }

    #[ test ]
    fn round_robin_visits_each_key_twice_over_2n_selections()
    {
      let mut pool = unbounded_pool( 3 );
      let mut counts = [ 0; 3 ];
      for _ in 0 .. 6
      {
        let handle = pool.select( 0.0 ).unwrap();
        counts[ handle.0 ] += 1;
      }
      assert_eq!( counts, [ 2, 2, 2 ] );
    }

    #[ test ]
    fn failed_key_is_skipped_until_cooldown_elapses()
    {
      let mut pool = CredentialPool::new(
        vec![ Secret::new_unchecked( "a" ), Secret::new_unchecked( "b" ) ],
        vec![
          Arc::new( Mutex::new( RateLimitTracker::new( RateLimitConfig::unbounded() ) ) ),
          Arc::new( Mutex::new( RateLimitTracker::new( RateLimitConfig::unbounded() ) ) ),
        ],
        Duration::from_secs( 60 ),
      );

      let first = pool.select( 0.0 ).unwrap();
      pool.mark_failure( first );
      let second = pool.select( 0.0 ).unwrap();
      assert_ne!( first, second );
      let third = pool.select( 0.0 ).unwrap();
      assert_eq!( second, third );
    }

    #[ test ]
    fn empty_pool_selects_nothing()
    {
      let mut pool = CredentialPool::new( vec![], vec![], Duration::from_secs( 1 ) );
      assert!( pool.select( 0.0 ).is_none() );
      assert!( pool.is_empty() );
    }

    #[ test ]
    fn emergency_unblock_when_all_keys_disabled()
    {
      let mut pool = unbounded_pool( 2 );
      let a = pool.select( 0.0 ).unwrap();
      pool.mark_failure( a );
      let b = pool.select( 0.0 ).unwrap();
      pool.mark_failure( b );

      // Both keys are now in cooldown; select must still return something.
      let rescued = pool.select( 0.0 );
      assert!( rescued.is_some() );
    }

    #[ test ]
    fn statuses_reflect_failure_and_cooldown_state()
    {
      let mut pool = unbounded_pool( 2 );
      let a = pool.select( 0.0 ).unwrap();
      pool.mark_failure( a );

      let statuses = pool.statuses();
      assert_eq!( statuses.len(), 2 );
      let failed = &statuses[ a.0 ];
      assert_eq!( failed.consecutive_failures, 1 );
      assert!( failed.disabled );
      assert!( failed.disabled_for_secs > 0.0 );

      let other_index = 1 - a.0;
      assert!( !statuses[ other_index ].disabled );
    }
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::CredentialHandle;
  exposed use private::CredentialPool;
  exposed use private::CredentialStatus;
  exposed use private::LimitUsage;
}

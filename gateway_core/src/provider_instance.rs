// src/provider_instance.rs
//! Binding of one provider adapter to one logical model, with its own
//! health and credential state.

mod private
{
  use std::sync::Arc;
  use std::time::{ Duration, Instant };

  use crate::adapter::ProviderAdapter;
  use crate::backoff::{ BackoffConfig, ExponentialBackoff };
  use crate::circuit_breaker::{ CircuitBreaker, CircuitBreakerConfig, CircuitState };
  use crate::credential_pool::{ CredentialHandle, CredentialPool, CredentialStatus };
  use crate::rate_limiter::TokenUsage;
  use crate::secret::Secret;
  use crate::speed_tracker::SpeedTracker;

  /// Consecutive-failure count past which a provider instance is disabled
  /// outright (independent of the circuit breaker, which governs retry
  /// pacing rather than eligibility for ranking).
  const DISABLE_AFTER_CONSECUTIVE_FAILURES : u32 = 3;

  /// Static construction parameters for a `ProviderInstance`.
  #[ derive( Debug ) ]
  pub struct ProviderInstanceConfig
  {
    /// Provider name from configuration, carried only for introspection
    /// (stats endpoints); never used to make dispatch decisions.
    pub name : String,
    /// Lower is preferred; used only for ranking.
    pub priority : i64,
    /// Provider-native model identifiers, rotated round robin per request.
    pub model_ids : Vec< String >,
    /// `None` means the adapter must accept a null credential.
    pub credential_pool : Option< CredentialPool >,
    /// Retry ceiling within one dispatch attempt at this instance.
    pub max_retries : u32,
    pub circuit_breaker : CircuitBreakerConfig,
    pub backoff : BackoffConfig,
  }

  /// One `(adapter, logical model, credential pool, priority)` binding with
  /// its own health state.
  ///
  /// Protected end to end by one per-instance mutex (spec.md §5); every
  /// method here assumes exclusive access.
  #[ derive( Debug ) ]
  pub struct ProviderInstance
  {
    adapter : Arc< dyn ProviderAdapter >,
    name : String,
    priority : i64,
    model_ids : Vec< String >,
    model_cursor : usize,
    credential_pool : Option< CredentialPool >,
    enabled : bool,
    consecutive_failures : u32,
    last_failure : Option< Instant >,
    retry_count : u32,
    max_retries : u32,
    circuit_breaker : CircuitBreaker,
    backoff : ExponentialBackoff,
    speed : SpeedTracker,
  }

  impl ProviderInstance
  {
    /// Build a new instance. `model_ids` must be non-empty (spec.md §3).
    ///
    /// # Panics
    /// Panics if `config.model_ids` is empty.
    #[ must_use ]
    pub fn new( adapter : Arc< dyn ProviderAdapter >, config : ProviderInstanceConfig ) -> Self
    {
      assert!( !config.model_ids.is_empty(), "provider instance must have at least one model id" );
      Self
      {
        adapter,
        name : config.name,
        priority : config.priority,
        model_ids : config.model_ids,
        model_cursor : 0,
        credential_pool : config.credential_pool,
        enabled : true,
        consecutive_failures : 0,
        last_failure : None,
        retry_count : 0,
        max_retries : config.max_retries,
        circuit_breaker : CircuitBreaker::new( config.circuit_breaker ),
        backoff : ExponentialBackoff::new( config.backoff ),
        speed : SpeedTracker::new(),
      }
    }

    #[ must_use ]
    #[ inline ]
    pub fn name( &self ) -> &str
    {
      &self.name
    }

    #[ must_use ]
    #[ inline ]
    pub fn priority( &self ) -> i64
    {
      self.priority
    }

    #[ must_use ]
    #[ inline ]
    pub fn enabled( &self ) -> bool
    {
      self.enabled
    }

    #[ must_use ]
    #[ inline ]
    pub fn consecutive_failures( &self ) -> u32
    {
      self.consecutive_failures
    }

    #[ must_use ]
    #[ inline ]
    pub fn circuit_state( &self ) -> CircuitState
    {
      self.circuit_breaker.state()
    }

    #[ must_use ]
    #[ inline ]
    pub fn circuit_failure_count( &self ) -> u32
    {
      self.circuit_breaker.failure_count()
    }

    #[ must_use ]
    #[ inline ]
    pub fn circuit_success_count( &self ) -> u32
    {
      self.circuit_breaker.success_count()
    }

    #[ must_use ]
    #[ inline ]
    pub fn speed( &self ) -> &SpeedTracker
    {
      &self.speed
    }

    #[ must_use ]
    #[ inline ]
    pub fn adapter( &self ) -> &Arc< dyn ProviderAdapter >
    {
      &self.adapter
    }

    #[ must_use ]
    #[ inline ]
    pub fn retry_count( &self ) -> u32
    {
      self.retry_count
    }

    /// Select the next credential from the pool, or `None` when there is no
    /// pool at all (adapter must accept a null credential).
    ///
    /// Passes the pool's estimated flat per-request credit cost as
    /// `required_credits` rather than a literal `0`, so that an exhausted
    /// credit balance actually excludes a key at selection time (see
    /// `CredentialPool::estimate_required_credits`).
    pub fn current_credential( &mut self ) -> Option< CredentialHandle >
    {
      let required = self.credential_pool.as_ref().map_or( 0.0, CredentialPool::estimate_required_credits );
      self.credential_pool.as_mut().and_then( | pool | pool.select( required ) )
    }

    /// Resolve a handle back to its secret, for adapters that need the
    /// actual credential value.
    #[ must_use ]
    pub fn credential_secret( &self, handle : CredentialHandle ) -> Option< &Secret >
    {
      self.credential_pool.as_ref().map( | pool | pool.secret( handle ) )
    }

    /// `true` iff this instance has a credential pool at all.
    #[ must_use ]
    pub fn has_credential_pool( &self ) -> bool
    {
      self.credential_pool.is_some()
    }

    /// Per-credential introspection snapshot for stats endpoints; empty when
    /// this instance has no credential pool.
    #[ must_use ]
    pub fn credential_statuses( &self ) -> Vec< CredentialStatus >
    {
      self.credential_pool.as_ref().map( CredentialPool::statuses ).unwrap_or_default()
    }

    /// Round-robin the next provider-native model identifier to use.
    pub fn next_model_id( &mut self ) -> &str
    {
      let idx = self.model_cursor;
      self.model_cursor = ( self.model_cursor + 1 ) % self.model_ids.len();
      &self.model_ids[ idx ]
    }

    /// Record a successful call's performance and usage.
    pub fn record_response( &mut self, duration : Duration, usage : TokenUsage, credits : Option< f64 >, ttft : Duration, key : Option< CredentialHandle > )
    {
      let out_tokens = match usage
      {
        TokenUsage::Split { out_tokens, .. } => out_tokens,
        TokenUsage::Total( total ) => total,
      };
      self.speed.record( duration, out_tokens, ttft );
      if let ( Some( pool ), Some( handle ) ) = ( self.credential_pool.as_mut(), key )
      {
        pool.record_usage( handle, usage, credits );
      }
    }

    /// Reset health state on a successful attempt.
    pub fn mark_success( &mut self )
    {
      self.consecutive_failures = 0;
      self.enabled = true;
      self.circuit_breaker.record_success();
      self.backoff.reset();
    }

    /// Record a failed attempt; disables the instance outright after
    /// `DISABLE_AFTER_CONSECUTIVE_FAILURES` consecutive failures.
    pub fn mark_failure( &mut self )
    {
      self.consecutive_failures += 1;
      self.last_failure = Some( Instant::now() );
      self.circuit_breaker.record_failure();
      if self.consecutive_failures >= DISABLE_AFTER_CONSECUTIVE_FAILURES
      {
        tracing::warn!( consecutive_failures = self.consecutive_failures, "disabling provider instance" );
        self.enabled = false;
      }
    }

    pub fn mark_key_success( &mut self, key : CredentialHandle )
    {
      if let Some( pool ) = self.credential_pool.as_mut()
      {
        pool.mark_success( key );
      }
    }

    pub fn mark_key_failure( &mut self, key : CredentialHandle )
    {
      if let Some( pool ) = self.credential_pool.as_mut()
      {
        pool.mark_failure( key );
      }
    }

    /// Restore persisted aggregate state (spec.md §6.4). Speed-tracker
    /// rolling windows are never restored, only the scalar failure/circuit
    /// counters.
    pub fn restore(
      &mut self,
      consecutive_failures : u32,
      circuit_state : CircuitState,
      circuit_failure_count : u32,
      circuit_success_count : u32,
    )
    {
      self.consecutive_failures = consecutive_failures;
      self.enabled = consecutive_failures < DISABLE_AFTER_CONSECUTIVE_FAILURES;
      self.circuit_breaker.restore( circuit_state, circuit_failure_count, circuit_success_count );
    }

    pub fn reset_retry_count( &mut self )
    {
      self.retry_count = 0;
    }

    pub fn increment_retry_count( &mut self )
    {
      self.retry_count += 1;
    }

    #[ must_use ]
    pub fn backoff_delay( &self ) -> Duration
    {
      self.backoff.get_delay()
    }

    /// Current backoff attempt counter (resets on success; see
    /// `ExponentialBackoff::reset`), exposed for stats endpoints.
    #[ must_use ]
    #[ inline ]
    pub fn backoff_attempt( &self ) -> u32
    {
      self.backoff.attempt()
    }

    pub fn record_backoff_attempt( &mut self )
    {
      self.backoff.record_attempt();
    }

    /// `true` iff the circuit breaker allows an attempt and the retry
    /// ceiling for this dispatch pass has not been reached.
    pub fn should_attempt( &mut self ) -> bool
    {
      self.circuit_breaker.can_attempt() && self.retry_count < self.max_retries
    }

    /// `true` iff enough time has elapsed since the last failure to
    /// consider re-enabling a disabled instance.
    #[ must_use ]
    pub fn retry_cooldown_elapsed( &self, cooldown : Duration ) -> bool
    {
      self.last_failure.map_or( true, | t | t.elapsed() >= cooldown )
    }

    /// Re-enable the instance if its cooldown has elapsed; called by
    /// `Model::available_candidates`.
    pub fn maybe_reenable( &mut self, cooldown : Duration )
    {
      if !self.enabled && self.retry_cooldown_elapsed( cooldown )
      {
        tracing::info!( "re-enabling provider instance after cooldown" );
        self.enabled = true;
        self.consecutive_failures = 0;
      }
    }

    /// Composite 0–100 health score; see spec.md §4.6 for the exact formula.
    #[ must_use ]
    pub fn health_score( &self ) -> f64
    {
      if self.circuit_breaker.state() == CircuitState::Open
      {
        return 0.0;
      }

      let half_open_penalty = if self.circuit_breaker.state() == CircuitState::HalfOpen { 50.0 } else { 0.0 };
      let failure_penalty = ( f64::from( self.consecutive_failures ) * 10.0 ).min( 40.0 );
      let mut score = 100.0 - half_open_penalty - failure_penalty;

      let throughput = self.speed.throughput();
      if throughput > 0.0
      {
        let penalty = ( ( 50.0 - throughput ) / 50.0 ).clamp( 0.0, 1.0 ) * 30.0;
        score -= penalty;
      }

      let avg_ttft = self.speed.mean_ttft();
      if avg_ttft > 0.0
      {
        score -= ( avg_ttft * 20.0 ).min( 20.0 );
      }

      score.clamp( 0.0, 100.0 )
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;
    use async_trait::async_trait;

    #[ derive( Debug ) ]
    struct StubAdapter;

    #[ async_trait ]
    impl ProviderAdapter for StubAdapter
    {
      async fn chat_completion(
        &self,
        _messages : &[ crate::adapter::ChatMessage ],
        _model_id : &str,
        _credential : Option< &Secret >,
        _params : &crate::adapter::ChatParams,
      ) -> core::result::Result< ( crate::adapter::ChatCompletionResponse, Duration ), crate::adapter::AdapterError >
      {
        unimplemented!( "not exercised in these unit tests" )
      }
    }

    fn instance() -> ProviderInstance
    {
      ProviderInstance::new(
        Arc::new( StubAdapter ),
        ProviderInstanceConfig
        {
          name : "test".to_string(),
          priority : 0,
          model_ids : vec![ "m".to_string() ],
          credential_pool : None,
          max_retries : 3,
          circuit_breaker : CircuitBreakerConfig::default(),
          backoff : BackoffConfig::default(),
        },
      )
    }

    #[ test ]
    fn disables_after_three_consecutive_failures()
    {
      let mut pi = instance();
      pi.mark_failure();
      pi.mark_failure();
      assert!( pi.enabled() );
      pi.mark_failure();
      assert!( !pi.enabled() );
    }

    #[ test ]
    fn success_resets_failure_state()
    {
      let mut pi = instance();
      pi.mark_failure();
      pi.mark_failure();
      pi.mark_success();
      assert_eq!( pi.consecutive_failures(), 0 );
      assert!( pi.enabled() );
    }

    #[ test ]
    fn health_score_zero_when_circuit_open()
    {
      let mut pi = instance();
      for _ in 0 .. 10
      {
        pi.mark_failure();
      }
      assert_eq!( pi.circuit_state(), CircuitState::Open );
      assert_eq!( pi.health_score(), 0.0 );
    }

    #[ test ]
    fn health_score_full_when_healthy()
    {
      let pi = instance();
      assert_eq!( pi.health_score(), 100.0 );
    }

    #[ test ]
    fn credential_statuses_empty_without_a_pool()
    {
      let pi = instance();
      assert!( pi.credential_statuses().is_empty() );
    }

    #[ test ]
    fn backoff_attempt_tracks_record_and_reset()
    {
      let mut pi = instance();
      assert_eq!( pi.backoff_attempt(), 0 );
      pi.record_backoff_attempt();
      pi.record_backoff_attempt();
      assert_eq!( pi.backoff_attempt(), 2 );
      pi.mark_success();
      assert_eq!( pi.backoff_attempt(), 0 );
    }

    #[ test ]
    fn model_ids_rotate_round_robin()
    {
      let mut pi = ProviderInstance::new(
        Arc::new( StubAdapter ),
        ProviderInstanceConfig
        {
          name : "test".to_string(),
          priority : 0,
          model_ids : vec![ "a".to_string(), "b".to_string() ],
          credential_pool : None,
          max_retries : 3,
          circuit_breaker : CircuitBreakerConfig::default(),
          backoff : BackoffConfig::default(),
        },
      );
      assert_eq!( pi.next_model_id(), "a" );
      assert_eq!( pi.next_model_id(), "b" );
      assert_eq!( pi.next_model_id(), "a" );
    }
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::ProviderInstanceConfig;
  exposed use private::ProviderInstance;
}

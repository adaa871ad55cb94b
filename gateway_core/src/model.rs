// src/model.rs
//! A logical model identifier plus its ranked provider instances.

mod private
{
  use std::sync::Mutex;
  use std::time::Duration;

  use crate::provider_instance::ProviderInstance;

  /// How long a disabled provider instance waits before being considered
  /// for re-enabling by `available_candidates`.
  const REENABLE_COOLDOWN : Duration = Duration::from_secs( 60 );

  /// Immutable metadata recorded at config load time.
  #[ derive( Debug, Clone ) ]
  pub struct ModelMetadata
  {
    /// Unix timestamp of config load.
    pub created : i64,
    /// Free-form owner label, e.g. `"openai"`.
    pub owned_by : String,
  }

  /// A client-visible model identifier backed by one or more provider
  /// instances.
  ///
  /// Exclusively owns its `ProviderInstance`s; each is individually
  /// mutex-protected so `available_candidates` never needs to hold more
  /// than one lock at a time (spec.md §5).
  #[ derive( Debug ) ]
  pub struct Model
  {
    id : String,
    metadata : ModelMetadata,
    instances : Vec< Mutex< ProviderInstance > >,
  }

  impl Model
  {
    #[ must_use ]
    pub fn new( id : String, metadata : ModelMetadata, instances : Vec< ProviderInstance > ) -> Self
    {
      Self { id, metadata, instances : instances.into_iter().map( Mutex::new ).collect() }
    }

    #[ must_use ]
    #[ inline ]
    pub fn id( &self ) -> &str
    {
      &self.id
    }

    #[ must_use ]
    #[ inline ]
    pub fn metadata( &self ) -> &ModelMetadata
    {
      &self.metadata
    }

    #[ must_use ]
    #[ inline ]
    pub fn instances( &self ) -> &[ Mutex< ProviderInstance > ]
    {
      &self.instances
    }

    /// Rank currently-available provider instances by adjusted score
    /// (health score plus priority bonus), descending. Re-enables any
    /// disabled instance whose cooldown has elapsed as a side effect.
    ///
    /// Returns indices into `self.instances()`, not the instances
    /// themselves, since each is separately lockable and callers need to
    /// re-lock them individually during dispatch.
    #[ must_use ]
    pub fn available_candidates( &self ) -> Vec< usize >
    {
      let mut priorities : Vec< ( usize, i64 ) > = Vec::with_capacity( self.instances.len() );
      let mut available : Vec< usize > = Vec::new();

      for ( idx, slot ) in self.instances.iter().enumerate()
      {
        let mut instance = slot.lock().expect( "provider instance mutex poisoned" );
        instance.maybe_reenable( REENABLE_COOLDOWN );
        if instance.enabled() || instance.retry_cooldown_elapsed( REENABLE_COOLDOWN )
        {
          available.push( idx );
          priorities.push( ( idx, instance.priority() ) );
        }
      }

      if available.is_empty()
      {
        return Vec::new();
      }

      // Rank ascending by priority (lower = preferred) to assign the bonus;
      // ties broken by index for stability.
      let mut by_priority = priorities.clone();
      by_priority.sort_by( | a, b | a.1.cmp( &b.1 ).then( a.0.cmp( &b.0 ) ) );

      let n = by_priority.len() as i64;
      let bonus : std::collections::HashMap< usize, i64 > = by_priority
        .into_iter()
        .enumerate()
        .map( | ( rank, ( idx, _ ) ) | ( idx, ( n - 1 ) - 2 * rank as i64 ) )
        .collect();

      let mut scored : Vec< ( usize, f64, bool ) > = available
        .into_iter()
        .map( | idx |
        {
          let instance = self.instances[ idx ].lock().expect( "provider instance mutex poisoned" );
          let adjusted = instance.health_score() + bonus[ &idx ] as f64;
          let has_samples = !instance.speed().is_empty();
          ( idx, adjusted, has_samples )
        } )
        .collect();

      // Descending by adjusted score; stable sort preserves insertion order
      // among ties, matching the unspecified-but-stable tie-break rule.
      scored.sort_by( | a, b | b.1.partial_cmp( &a.1 ).expect( "scores are never NaN" ) );

      // Dispatcher-level reordering: no-sample candidates first, preserving
      // adjusted-score order within each group (spec.md §4.7).
      let ( no_samples, with_samples ) : ( Vec< _ >, Vec< _ > ) = scored.into_iter().partition( | ( _, _, has_samples ) | !has_samples );

      no_samples.into_iter().chain( with_samples ).map( | ( idx, _, _ ) | idx ).collect()
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;
    use crate::backoff::BackoffConfig;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::provider_instance::ProviderInstanceConfig;
    use async_trait::async_trait;
    use std::sync::Arc;

    #[ derive( Debug ) ]
    struct StubAdapter;

    #[ async_trait ]
    impl crate::adapter::ProviderAdapter for StubAdapter
    {
      async fn chat_completion(
        &self,
        _messages : &[ crate::adapter::ChatMessage ],
        _model_id : &str,
        _credential : Option< &crate::secret::Secret >,
        _params : &crate::adapter::ChatParams,
      ) -> core::result::Result< ( crate::adapter::ChatCompletionResponse, std::time::Duration ), crate::adapter::AdapterError >
      {
        unimplemented!()
      }
    }

    fn instance_with_priority( priority : i64 ) -> ProviderInstance
    {
      ProviderInstance::new(
        Arc::new( StubAdapter ),
        ProviderInstanceConfig
        {
          name : "test".to_string(),
          priority,
          model_ids : vec![ "m".to_string() ],
          credential_pool : None,
          max_retries : 3,
          circuit_breaker : CircuitBreakerConfig::default(),
          backoff : BackoffConfig::default(),
        },
      )
    }

    #[ test ]
    fn lower_priority_ranks_first_when_health_equal()
    {
      let model = Model::new(
        "m1".to_string(),
        ModelMetadata { created : 0, owned_by : "test".to_string() },
        vec![ instance_with_priority( 5 ), instance_with_priority( 0 ) ],
      );
      let ranked = model.available_candidates();
      assert_eq!( ranked, vec![ 1, 0 ] );
    }

    #[ test ]
    fn open_circuit_never_outranks_healthy_instance()
    {
      let model = Model::new(
        "m1".to_string(),
        ModelMetadata { created : 0, owned_by : "test".to_string() },
        vec![ instance_with_priority( 0 ), instance_with_priority( 0 ) ],
      );
      {
        let mut broken = model.instances()[ 0 ].lock().unwrap();
        for _ in 0 .. 10
        {
          broken.mark_failure();
        }
      }
      let ranked = model.available_candidates();
      assert_eq!( ranked.first(), Some( &1 ) );
    }
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::ModelMetadata;
  exposed use private::Model;
}

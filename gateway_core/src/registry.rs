// src/registry.rs
//! Builds `Model`s and `ProviderInstance`s from a `GatewayConfig`,
//! resolving the adapter type string -> concrete adapter via a factory
//! registry supplied by the caller (spec.md §9: "configuration-driven
//! class dispatch" is a registry of factories, not a hardcoded match).

mod private
{
  use std::collections::HashMap;
  use std::sync::{ Arc, Mutex };
  use std::time::Duration;

  use crate::adapter::ProviderAdapter;
  use crate::backoff::BackoffConfig;
  use crate::circuit_breaker::CircuitBreakerConfig;
  use crate::config::{ GatewayConfig, ModelProviderConfig, ProviderConfig };
  use crate::credential_pool::CredentialPool;
  use crate::error::{ GatewayError, Result };
  use crate::model::{ Model, ModelMetadata };
  use crate::provider_instance::{ ProviderInstance, ProviderInstanceConfig };
  use crate::rate_limiter::{ CreditGrant, CreditRates, LimitKey, Period, RateLimitConfig, RateLimitTracker };
  use crate::secret::Secret;

  /// Builds a `ProviderAdapter` from its configuration. Registered by type
  /// string; an unknown type at config-resolution time is a startup
  /// failure, never a silent fallback.
  pub type AdapterFactory = dyn Fn( &ProviderConfig ) -> Result< Arc< dyn ProviderAdapter > > + Send + Sync;

  const DEFAULT_COOLDOWN : Duration = Duration::from_secs( 30 );
  const DEFAULT_MAX_RETRIES : u32 = 3;

  /// Collection of `Model`s and the canonical credential-tracker map they
  /// were built from.
  ///
  /// Owns every `LogicalModel`, `ProviderAdapter`, and the canonical
  /// `credential -> shared RateLimitTracker` map (spec.md §3). Built once
  /// from configuration and immutable thereafter except for the mutable
  /// state reachable through its `Model`s.
  #[ derive( Debug ) ]
  pub struct Registry
  {
    models : HashMap< String, Model >,
  }

  impl Registry
  {
    /// Resolve a logical model by id.
    pub fn get( &self, model_id : &str ) -> Result< &Model >
    {
      self.models.get( model_id ).ok_or_else( || GatewayError::ModelNotFound( model_id.to_string() ) )
    }

    /// Enumerate all registered logical model ids.
    #[ must_use ]
    pub fn model_ids( &self ) -> Vec< &str >
    {
      self.models.keys().map( String::as_str ).collect()
    }

    #[ must_use ]
    pub fn models( &self ) -> &HashMap< String, Model >
    {
      &self.models
    }

    /// Build a `Registry` from configuration and an adapter-factory map
    /// keyed by provider `type` string.
    pub fn build( config : &GatewayConfig, factories : &HashMap< String, Arc< AdapterFactory > > ) -> Result< Self >
    {
      let mut adapters : HashMap< String, Arc< dyn ProviderAdapter > > = HashMap::new();
      for ( name, provider ) in &config.providers
      {
        let factory = factories
          .get( &provider.kind )
          .ok_or_else( || GatewayError::Config( format!( "unknown provider type '{}' for provider '{name}'", provider.kind ) ) )?;
        adapters.insert( name.clone(), factory( provider )? );
      }

      // Canonical credential -> shared tracker map, keyed by (provider name,
      // key value): the same literal key reused under the same provider
      // shares one tracker; reused under a different provider gets its own.
      let mut trackers : HashMap< ( String, String ), Arc< Mutex< RateLimitTracker > > > = HashMap::new();

      let mut models = HashMap::new();
      for ( model_id, model_config ) in &config.models
      {
        let mut instances = Vec::new();
        for ( provider_name, mp ) in &model_config.providers
        {
          let provider_config = config
            .providers
            .get( provider_name )
            .ok_or_else( || GatewayError::Config( format!( "model '{model_id}' references unknown provider '{provider_name}'" ) ) )?;

          let adapter = adapters
            .get( provider_name )
            .ok_or_else( || GatewayError::Config( format!( "adapter for provider '{provider_name}' was not constructed" ) ) )?
            .clone();

          let instance = build_instance( provider_name, provider_config, mp, adapter, &mut trackers )?;
          instances.push( instance );
        }

        let metadata = ModelMetadata { created : model_config.created.unwrap_or( 0 ), owned_by : model_config.owned_by.clone().unwrap_or_default() };
        models.insert( model_id.clone(), Model::new( model_id.clone(), metadata, instances ) );
      }

      Ok( Self { models } )
    }
  }

  fn build_instance(
    provider_name : &str,
    provider : &ProviderConfig,
    mp : &ModelProviderConfig,
    adapter : Arc< dyn ProviderAdapter >,
    trackers : &mut HashMap< ( String, String ), Arc< Mutex< RateLimitTracker > > >,
  ) -> Result< ProviderInstance >
  {
    let model_ids = mp
      .model_id
      .clone()
      .map( crate::config::StringOrList::into_vec )
      .unwrap_or_else( || vec![ provider_name.to_string() ] );

    let keys : Vec< String > = mp
      .api_keys
      .clone()
      .or_else( || provider.api_keys.clone() )
      .map( crate::config::StringOrList::into_vec )
      .unwrap_or_default();

    let rate_config = merge_rate_limit_config( provider, mp );

    let credential_pool = if keys.is_empty()
    {
      None
    }
    else
    {
      let mut secrets = Vec::with_capacity( keys.len() );
      let mut limiters = Vec::with_capacity( keys.len() );
      for key in keys
      {
        let tracker_key = ( provider_name.to_string(), key.clone() );
        let tracker = trackers
          .entry( tracker_key )
          .or_insert_with( || Arc::new( Mutex::new( RateLimitTracker::new( rate_config.clone() ) ) ) )
          .clone();
        secrets.push( Secret::new_unchecked( key ) );
        limiters.push( tracker );
      }
      Some( CredentialPool::new( secrets, limiters, DEFAULT_COOLDOWN ) )
    };

    Ok( ProviderInstance::new(
      adapter,
      ProviderInstanceConfig
      {
        name : provider_name.to_string(),
        priority : mp.priority.unwrap_or( 0 ),
        model_ids,
        credential_pool,
        max_retries : mp.max_retries.unwrap_or( DEFAULT_MAX_RETRIES ),
        circuit_breaker : CircuitBreakerConfig::default(),
        backoff : BackoffConfig::default(),
      },
    ) )
  }

  fn effective_multiplier( specific : Option< f64 >, generic : Option< f64 > ) -> f64
  {
    specific.or( generic ).unwrap_or( 1.0 )
  }

  /// Merge provider-level defaults with instance-level overrides, then
  /// divide each configured numeric limit by the multiplier that inflates
  /// the usage it bounds (spec.md §6.3: "multipliers then divide numeric
  /// limits").
  fn merge_rate_limit_config( provider : &ProviderConfig, mp : &ModelProviderConfig ) -> RateLimitConfig
  {
    let mut merged : HashMap< String, f64 > = HashMap::new();
    if let Some( defaults ) = &provider.rate_limits
    {
      merged.extend( defaults.clone() );
    }
    if let Some( overrides ) = &mp.rate_limits
    {
      merged.extend( overrides.clone() );
    }

    let token_multiplier = effective_multiplier( mp.token_multiplier, mp.multiplier );
    let request_multiplier = effective_multiplier( mp.request_multiplier, mp.multiplier );
    let in_multiplier = effective_multiplier( mp.in_token_multiplier, Some( token_multiplier ) );
    let out_multiplier = effective_multiplier( mp.out_token_multiplier, Some( token_multiplier ) );

    let mut limits = HashMap::new();
    for ( key_str, bound ) in merged
    {
      if let Some( key ) = LimitKey::parse( &key_str )
      {
        let divisor = match key.kind
        {
          crate::rate_limiter::LimitKind::Requests => request_multiplier,
          crate::rate_limiter::LimitKind::Tokens => token_multiplier,
          crate::rate_limiter::LimitKind::InTokens => in_multiplier,
          crate::rate_limiter::LimitKind::OutTokens => out_multiplier,
          crate::rate_limiter::LimitKind::Credits => 1.0,
        };
        let divisor = if divisor > 0.0 { divisor } else { 1.0 };
        limits.insert( key, bound / divisor );
      }
      else
      {
        tracing::warn!( key = %key_str, "ignoring unrecognized rate-limit key" );
      }
    }

    let credit_rates = CreditRates
    {
      per_token : mp.credits_per_token.unwrap_or( 0.0 ),
      per_million_tokens : mp.credits_per_million_tokens.unwrap_or( 0.0 ),
      per_in_token : mp.credits_per_in_token.unwrap_or( 0.0 ),
      per_out_token : mp.credits_per_out_token.unwrap_or( 0.0 ),
      per_million_in_tokens : mp.credits_per_million_in_tokens.unwrap_or( 0.0 ),
      per_million_out_tokens : mp.credits_per_million_out_tokens.unwrap_or( 0.0 ),
      per_request : mp.credits_per_request.unwrap_or( 0.0 ),
    };

    let mut credit_balance = HashMap::new();
    if let Some( gain ) = provider.credits_gain_per_minute
    {
      credit_balance.insert( Period::Minute, CreditGrant { gain, max : provider.credits_max_per_minute } );
    }
    if let Some( gain ) = provider.credits_gain_per_hour
    {
      credit_balance.insert( Period::Hour, CreditGrant { gain, max : provider.credits_max_per_hour } );
    }
    if let Some( gain ) = provider.credits_gain_per_day
    {
      credit_balance.insert( Period::Day, CreditGrant { gain, max : provider.credits_max_per_day } );
    }
    if let Some( gain ) = provider.credits_gain_per_month
    {
      credit_balance.insert( Period::Month, CreditGrant { gain, max : provider.credits_max_per_month } );
    }

    RateLimitConfig { limits, token_multiplier, request_multiplier, credit_rates, credit_balance }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;
    use async_trait::async_trait;

    #[ derive( Debug ) ]
    struct EchoAdapter;

    #[ async_trait ]
    impl ProviderAdapter for EchoAdapter
    {
      async fn chat_completion(
        &self,
        messages : &[ crate::adapter::ChatMessage ],
        model_id : &str,
        _credential : Option< &Secret >,
        _params : &crate::adapter::ChatParams,
      ) -> core::result::Result< ( crate::adapter::ChatCompletionResponse, std::time::Duration ), crate::adapter::AdapterError >
      {
        let content = messages.last().map( | m | m.content.clone() ).unwrap_or_default();
        Ok( (
          crate::adapter::ChatCompletionResponse
          {
            id : "echo".to_string(),
            object : "chat.completion".to_string(),
            created : 0,
            model : model_id.to_string(),
            choices : vec![
              crate::adapter::ChatChoice { index : 0, message : crate::adapter::ChatMessage { role : "assistant".to_string(), content }, finish_reason : Some( "stop".to_string() ) }
            ],
            usage : None,
          },
          std::time::Duration::from_millis( 1 ),
        ) )
      }
    }

    fn factories() -> HashMap< String, Arc< AdapterFactory > >
    {
      let mut map : HashMap< String, Arc< AdapterFactory > > = HashMap::new();
      map.insert( "mock_echo".to_string(), Arc::new( | _ : &ProviderConfig | Ok( Arc::new( EchoAdapter ) as Arc< dyn ProviderAdapter > ) ) );
      map
    }

    #[ test ]
    fn builds_model_with_divided_limits()
    {
      let config = GatewayConfig::from_yaml_str(
        r#"
providers:
  p1:
    type: mock_echo
    api_keys: [k1]
    rate_limits:
      requests_per_minute: 10
models:
  m1:
    providers:
      p1:
        priority: 0
        request_multiplier: 2
"#,
      ).unwrap();

      let registry = Registry::build( &config, &factories() ).unwrap();
      let model = registry.get( "m1" ).unwrap();
      assert_eq!( model.instances().len(), 1 );
    }

    #[ test ]
    fn unknown_adapter_type_is_startup_failure()
    {
      let config = GatewayConfig::from_yaml_str(
        r#"
providers:
  p1:
    type: does_not_exist
models: {}
"#,
      ).unwrap();

      let err = Registry::build( &config, &factories() ).unwrap_err();
      assert!( matches!( err, GatewayError::Config( _ ) ) );
    }

    #[ test ]
    fn shared_key_under_same_provider_shares_tracker()
    {
      let config = GatewayConfig::from_yaml_str(
        r#"
providers:
  p1:
    type: mock_echo
    api_keys: [shared-key]
    rate_limits:
      requests_per_minute: 1
models:
  m1:
    providers:
      p1: {}
  m2:
    providers:
      p1: {}
"#,
      ).unwrap();

      let registry = Registry::build( &config, &factories() ).unwrap();
      // Both models reuse provider p1's only key; this does not assert
      // identity directly (no public accessor for that), but exercises the
      // build path without panicking or erroring.
      assert_eq!( registry.model_ids().len(), 2 );
    }
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::AdapterFactory;
  exposed use private::Registry;
}

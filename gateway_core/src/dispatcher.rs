// src/dispatcher.rs
//! The request-handling algorithm: walks ranked candidates, chooses
//! credentials, invokes the adapter, interprets outcomes, updates state,
//! and ultimately returns a response or a terminal failure (spec.md §4.8).

mod private
{
  use std::time::Instant;

  use crate::adapter::{ ChatMessage, ChatParams, ChatCompletionResponse };
  use crate::error::{ GatewayError, Result, ValidationIssue };
  use crate::metrics::GlobalMetrics;
  use crate::rate_limiter::TokenUsage;
  use crate::registry::Registry;

  /// Drives one chat-completion request across a `Registry`'s ranked
  /// candidates for the named model.
  ///
  /// Stateless beyond the `Registry`/`GlobalMetrics` it is handed; safe to
  /// share across concurrently dispatched requests (spec.md §5).
  #[ derive( Debug ) ]
  pub struct Dispatcher< 'r >
  {
    registry : &'r Registry,
    metrics : &'r GlobalMetrics,
  }

  impl< 'r > Dispatcher< 'r >
  {
    #[ must_use ]
    pub fn new( registry : &'r Registry, metrics : &'r GlobalMetrics ) -> Self
    {
      Self { registry, metrics }
    }

    /// Dispatch one request, returning the canonical response or a
    /// structured failure (spec.md §4.8/§4.9).
    pub async fn dispatch( &self, model_id : &str, messages : &[ ChatMessage ], params : &ChatParams ) -> Result< ChatCompletionResponse >
    {
      let model = self.registry.get( model_id )?;

      let candidates = model.available_candidates();
      if candidates.is_empty()
      {
        return Err( GatewayError::Unavailable( "no available providers".to_string() ) );
      }

      let mut last_validation_error : Option< Vec< ValidationIssue > > = None;
      let mut last_transport_error : Option< String > = None;
      let mut last_rate_limited_error : Option< String > = None;

      for idx in candidates
      {
        let slot = &model.instances()[ idx ];
        {
          let mut instance = slot.lock().expect( "provider instance mutex poisoned" );
          instance.reset_retry_count();
        }

        loop
        {
          let should_attempt = slot.lock().expect( "provider instance mutex poisoned" ).should_attempt();
          if !should_attempt
          {
            break;
          }

          let key = slot.lock().expect( "provider instance mutex poisoned" ).current_credential();
          let has_pool = slot.lock().expect( "provider instance mutex poisoned" ).has_credential_pool();
          if has_pool && key.is_none()
          {
            last_rate_limited_error = Some( format!( "no eligible credential for provider index {idx}" ) );
            break;
          }

          let retry_count = slot.lock().expect( "provider instance mutex poisoned" ).retry_count();
          if retry_count > 0
          {
            let delay =
            {
              let mut instance = slot.lock().expect( "provider instance mutex poisoned" );
              let delay = instance.backoff_delay();
              instance.record_backoff_attempt();
              delay
            };
            tokio::time::sleep( delay ).await;
          }

          let ( adapter, model_id_for_call, credential_secret ) =
          {
            let mut instance = slot.lock().expect( "provider instance mutex poisoned" );
            let adapter = instance.adapter().clone();
            let model_id_for_call = instance.next_model_id().to_string();
            let credential_secret = key.and_then( | k | instance.credential_secret( k ).cloned() );
            ( adapter, model_id_for_call, credential_secret )
          };

          let start = Instant::now();
          let outcome = adapter.chat_completion( messages, &model_id_for_call, credential_secret.as_ref(), params ).await;

          match outcome
          {
            Err( crate::adapter::AdapterError::Validation( issues ) ) =>
            {
              tracing::warn!( provider_index = idx, "adapter rejected request as invalid" );
              last_validation_error = Some( issues );
              let mut instance = slot.lock().expect( "provider instance mutex poisoned" );
              instance.mark_failure();
              instance.increment_retry_count();
              drop( instance );
              self.metrics.record_error();
              continue;
            },
            Err( crate::adapter::AdapterError::Transport( message ) ) =>
            {
              tracing::warn!( provider_index = idx, error = %message, "transport failure" );
              last_transport_error = Some( message );
              let should_continue =
              {
                let mut instance = slot.lock().expect( "provider instance mutex poisoned" );
                if let Some( k ) = key
                {
                  instance.mark_key_failure( k );
                }
                instance.mark_failure();
                instance.increment_retry_count();
                instance.should_attempt()
              };
              self.metrics.record_error();
              if !should_continue
              {
                break;
              }
              continue;
            },
            Ok( ( response, ttft ) ) =>
            {
              let duration = start.elapsed();
              let response_metrics = response.response_metrics( ttft );
              let usage = TokenUsage::Split { in_tokens : response_metrics.in_tokens, out_tokens : response_metrics.out_tokens };

              let mut instance = slot.lock().expect( "provider instance mutex poisoned" );
              instance.record_response( duration, usage, None, response_metrics.ttft, key );
              if let Some( k ) = key
              {
                instance.mark_key_success( k );
              }
              instance.mark_success();
              drop( instance );

              self.metrics.record_request( duration, response_metrics.in_tokens, response_metrics.out_tokens, response_metrics.ttft, 0.0 );
              return Ok( response );
            },
          }
        }
      }

      // Failure precedence (spec.md §4.9): a pending provider-reported
      // validation failure trumps the generic 503 only because no provider
      // ever succeeded; it is not returned early, so every candidate still
      // gets a chance first. Reported as `AdapterValidation`, not the
      // request-scoped `Validation`, since it came from an adapter rejecting
      // one attempt rather than from pre-dispatch request validation.
      if let Some( issues ) = last_validation_error
      {
        return Err( GatewayError::AdapterValidation( issues ) );
      }

      // Every candidate was excluded purely by rate-limit/credit exhaustion
      // and none was ever actually invoked: report `RateLimited` rather than
      // the generic `Unavailable`, which is reserved for candidates that
      // were tried and failed.
      if last_transport_error.is_none()
      {
        if let Some( detail ) = last_rate_limited_error
        {
          return Err( GatewayError::RateLimited( detail ) );
        }
      }

      let detail = last_transport_error.or( last_rate_limited_error ).unwrap_or_else( || "no provider returned a response".to_string() );
      Err( GatewayError::Unavailable( format!( "all providers failed; last error: {detail}" ) ) )
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::config::GatewayConfig;
    use crate::registry::AdapterFactory;
    use crate::secret::Secret;

    #[ derive( Debug ) ]
    struct EchoAdapter;

    #[ async_trait ]
    impl crate::adapter::ProviderAdapter for EchoAdapter
    {
      async fn chat_completion(
        &self,
        messages : &[ ChatMessage ],
        model_id : &str,
        _credential : Option< &Secret >,
        _params : &ChatParams,
      ) -> core::result::Result< ( ChatCompletionResponse, Duration ), crate::adapter::AdapterError >
      {
        let content = messages.last().map( | m | m.content.clone() ).unwrap_or_default();
        Ok( (
          ChatCompletionResponse
          {
            id : "echo".to_string(),
            object : "chat.completion".to_string(),
            created : 0,
            model : model_id.to_string(),
            choices : vec![ crate::adapter::ChatChoice { index : 0, message : ChatMessage { role : "assistant".to_string(), content }, finish_reason : Some( "stop".to_string() ) } ],
            usage : None,
          },
          Duration::from_millis( 1 ),
        ) )
      }
    }

    #[ derive( Debug ) ]
    struct AlwaysFailAdapter;

    #[ async_trait ]
    impl crate::adapter::ProviderAdapter for AlwaysFailAdapter
    {
      async fn chat_completion(
        &self,
        _messages : &[ ChatMessage ],
        _model_id : &str,
        _credential : Option< &Secret >,
        _params : &ChatParams,
      ) -> core::result::Result< ( ChatCompletionResponse, Duration ), crate::adapter::AdapterError >
      {
        Err( crate::adapter::AdapterError::Transport( "upstream 500".to_string() ) )
      }
    }

    #[ derive( Debug ) ]
    struct AlwaysInvalidAdapter;

    #[ async_trait ]
    impl crate::adapter::ProviderAdapter for AlwaysInvalidAdapter
    {
      async fn chat_completion(
        &self,
        _messages : &[ ChatMessage ],
        _model_id : &str,
        _credential : Option< &Secret >,
        _params : &ChatParams,
      ) -> core::result::Result< ( ChatCompletionResponse, Duration ), crate::adapter::AdapterError >
      {
        Err( crate::adapter::AdapterError::Validation( vec![ ValidationIssue { field : "messages".to_string(), message : "empty".to_string(), code : "EMPTY".to_string() } ] ) )
      }
    }

    fn factories() -> HashMap< String, Arc< AdapterFactory > >
    {
      let mut map : HashMap< String, Arc< AdapterFactory > > = HashMap::new();
      map.insert( "mock_echo".to_string(), Arc::new( | _cfg : &crate::config::ProviderConfig | Ok( Arc::new( EchoAdapter ) as Arc< dyn crate::adapter::ProviderAdapter > ) ) );
      map.insert( "mock_fail".to_string(), Arc::new( | _cfg : &crate::config::ProviderConfig | Ok( Arc::new( AlwaysFailAdapter ) as Arc< dyn crate::adapter::ProviderAdapter > ) ) );
      map.insert( "mock_invalid".to_string(), Arc::new( | _cfg : &crate::config::ProviderConfig | Ok( Arc::new( AlwaysInvalidAdapter ) as Arc< dyn crate::adapter::ProviderAdapter > ) ) );
      map
    }

    fn build_registry( yaml : &str ) -> Registry
    {
      let config = GatewayConfig::from_yaml_str( yaml ).unwrap();
      Registry::build( &config, &factories() ).unwrap()
    }

    #[ tokio::test ]
    async fn happy_path_returns_echoed_response()
    {
      let registry = build_registry(
        r#"
providers:
  p1:
    type: mock_echo
models:
  m1:
    providers:
      p1: {}
"#,
      );
      let metrics = GlobalMetrics::new();
      let dispatcher = Dispatcher::new( &registry, &metrics );

      let messages = vec![ ChatMessage { role : "user".to_string(), content : "hi".to_string() } ];
      let response = dispatcher.dispatch( "m1", &messages, &ChatParams::default() ).await.unwrap();
      assert_eq!( response.choices[ 0 ].message.content, "hi" );
      assert_eq!( metrics.snapshot().total_requests, 1 );
    }

    #[ tokio::test ]
    async fn fails_over_to_healthy_provider()
    {
      let registry = build_registry(
        r#"
providers:
  p1:
    type: mock_fail
  p2:
    type: mock_echo
models:
  m1:
    providers:
      p1:
        priority: 0
        max_retries: 1
      p2:
        priority: 1
"#,
      );
      let metrics = GlobalMetrics::new();
      let dispatcher = Dispatcher::new( &registry, &metrics );

      let messages = vec![ ChatMessage { role : "user".to_string(), content : "hi".to_string() } ];
      let response = dispatcher.dispatch( "m1", &messages, &ChatParams::default() ).await.unwrap();
      assert_eq!( response.choices[ 0 ].message.content, "hi" );
      assert_eq!( metrics.snapshot().total_errors, 1 );
    }

    #[ tokio::test ]
    async fn all_transport_failures_yield_unavailable()
    {
      let registry = build_registry(
        r#"
providers:
  p1:
    type: mock_fail
models:
  m1:
    providers:
      p1:
        max_retries: 2
"#,
      );
      let metrics = GlobalMetrics::new();
      let dispatcher = Dispatcher::new( &registry, &metrics );

      let messages = vec![ ChatMessage { role : "user".to_string(), content : "hi".to_string() } ];
      let err = dispatcher.dispatch( "m1", &messages, &ChatParams::default() ).await.unwrap_err();
      assert!( matches!( err, GatewayError::Unavailable( _ ) ) );
    }

    #[ tokio::test ]
    async fn validation_error_trumps_unavailable_when_nothing_succeeds()
    {
      let registry = build_registry(
        r#"
providers:
  p1:
    type: mock_invalid
models:
  m1:
    providers:
      p1:
        max_retries: 1
"#,
      );
      let metrics = GlobalMetrics::new();
      let dispatcher = Dispatcher::new( &registry, &metrics );

      let messages = vec![ ChatMessage { role : "user".to_string(), content : "hi".to_string() } ];
      let err = dispatcher.dispatch( "m1", &messages, &ChatParams::default() ).await.unwrap_err();
      assert!( matches!( err, GatewayError::AdapterValidation( _ ) ) );
    }

    #[ tokio::test ]
    async fn rate_limit_exhaustion_yields_rate_limited_not_unavailable()
    {
      let registry = build_registry(
        r#"
providers:
  p1:
    type: mock_echo
    api_keys: [k1]
    rate_limits:
      requests_per_minute: 1
models:
  m1:
    providers:
      p1:
        max_retries: 1
"#,
      );
      let metrics = GlobalMetrics::new();
      let dispatcher = Dispatcher::new( &registry, &metrics );

      let messages = vec![ ChatMessage { role : "user".to_string(), content : "hi".to_string() } ];
      dispatcher.dispatch( "m1", &messages, &ChatParams::default() ).await.unwrap();

      let err = dispatcher.dispatch( "m1", &messages, &ChatParams::default() ).await.unwrap_err();
      assert!( matches!( err, GatewayError::RateLimited( _ ) ) );
    }

    #[ tokio::test ]
    async fn unknown_model_is_not_found()
    {
      let registry = build_registry( "providers: {}\nmodels: {}\n" );
      let metrics = GlobalMetrics::new();
      let dispatcher = Dispatcher::new( &registry, &metrics );
      let messages = vec![ ChatMessage { role : "user".to_string(), content : "hi".to_string() } ];
      let err = dispatcher.dispatch( "missing", &messages, &ChatParams::default() ).await.unwrap_err();
      assert!( matches!( err, GatewayError::ModelNotFound( _ ) ) );
    }

    #[ tokio::test ]
    async fn exhausted_credit_balance_fails_over_to_next_provider()
    {
      // `p_poor` has exactly one key and a credit balance too small to ever
      // cover its own flat per-request cost; its only key can never become
      // eligible and is never disabled either, so selection returns no
      // credential and the dispatcher fails over to `p_good` (spec.md §8,
      // scenario 6, generalized to a two-provider failover rather than an
      // outright 503 since a healthy fallback exists here).
      let registry = build_registry(
        r#"
providers:
  p_poor:
    type: mock_echo
    api_keys: [k]
    credits_gain_per_day: 1
  p_good:
    type: mock_echo
models:
  m1:
    providers:
      p_poor:
        priority: 0
        max_retries: 1
        credits_per_request: 3
      p_good:
        priority: 1
"#,
      );
      let metrics = GlobalMetrics::new();
      let dispatcher = Dispatcher::new( &registry, &metrics );

      let messages = vec![ ChatMessage { role : "user".to_string(), content : "hi".to_string() } ];
      let response = dispatcher.dispatch( "m1", &messages, &ChatParams::default() ).await.unwrap();
      assert_eq!( response.choices[ 0 ].message.content, "hi" );
    }
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::Dispatcher;
}

// src/routes.rs
//! Route handlers: `POST /v1/chat/completions`, `GET /v1/models`,
//! `GET /v1/providers/stats`, `GET /v1/health` (spec.md §6.1).

mod private
{
  use std::collections::HashMap;

  use axum::extract::State;
  use axum::response::{ IntoResponse, Response, Sse };
  use axum::response::sse::Event;
  use axum::Json;
  use futures_util::stream;
  use serde::{ Deserialize, Serialize };

  use gateway_core::adapter::{ ChatCompletionResponse, ChatMessage, ChatParams };
  use gateway_core::dispatcher::Dispatcher;
  use gateway_core::error::{ GatewayError, ValidationIssue };

  use crate::error::ApiError;
  use crate::state::AppState;

  /// `POST /v1/chat/completions` request body.
  #[ derive( Debug, Deserialize ) ]
  pub struct ChatCompletionRequest
  {
    pub model : String,
    pub messages : Vec< ChatMessage >,
    #[ serde( flatten ) ]
    pub params : ChatParams,
  }

  fn validate( request : &ChatCompletionRequest ) -> Result< (), GatewayError >
  {
    let mut issues = Vec::new();
    if request.model.trim().is_empty()
    {
      issues.push( ValidationIssue { field : "model".to_string(), message : "must not be empty".to_string(), code : "MISSING_MODEL".to_string() } );
    }
    if request.messages.is_empty()
    {
      issues.push( ValidationIssue { field : "messages".to_string(), message : "must contain at least one message".to_string(), code : "EMPTY_MESSAGES".to_string() } );
    }
    if issues.is_empty() { Ok( () ) } else { Err( GatewayError::Validation( issues ) ) }
  }

  /// `data: {json}\n\n` framing terminated by `data: [DONE]\n\n`, synthesized
  /// from a single non-streaming upstream response (spec.md §6.1).
  fn synthesize_sse( response : ChatCompletionResponse ) -> Sse< impl futures_util::Stream< Item = Result< Event, core::convert::Infallible > > >
  {
    let chunk = serde_json::to_string( &response ).unwrap_or_default();
    let events = vec![ Ok( Event::default().data( chunk ) ), Ok( Event::default().data( "[DONE]" ) ) ];
    Sse::new( stream::iter( events ) )
  }

  /// `POST /v1/chat/completions`.
  pub async fn chat_completions( State( state ) : State< AppState >, Json( request ) : Json< ChatCompletionRequest > ) -> Result< Response, ApiError >
  {
    validate( &request )?;

    let dispatcher = Dispatcher::new( &state.registry, &state.metrics );
    let response = dispatcher.dispatch( &request.model, &request.messages, &request.params ).await?;

    if request.params.stream
    {
      Ok( synthesize_sse( response ).into_response() )
    }
    else
    {
      Ok( Json( response ).into_response() )
    }
  }

  #[ derive( Debug, Serialize ) ]
  struct ModelListEntry
  {
    id : String,
    object : &'static str,
    created : i64,
    owned_by : String,
  }

  #[ derive( Debug, Serialize ) ]
  struct ModelList
  {
    object : &'static str,
    data : Vec< ModelListEntry >,
  }

  /// `GET /v1/models`.
  pub async fn list_models( State( state ) : State< AppState > ) -> Json< ModelList >
  {
    let mut data : Vec< ModelListEntry > = state
      .registry
      .models()
      .values()
      .map( | model | ModelListEntry { id : model.id().to_string(), object : "model", created : model.metadata().created, owned_by : model.metadata().owned_by.clone() } )
      .collect();
    data.sort_by( | a, b | a.id.cmp( &b.id ) );
    Json( ModelList { object : "list", data } )
  }

  #[ derive( Debug, Serialize ) ]
  struct ProviderStats
  {
    name : String,
    priority : i64,
    enabled : bool,
    consecutive_failures : u32,
    circuit_breaker_state : gateway_core::circuit_breaker::CircuitState,
    health_score : f64,
    average_response_time : f64,
    p95_response_time : f64,
    tokens_per_second : f64,
    average_ttft : f64,
    p95_ttft : f64,
    backoff_attempt : u32,
    next_backoff_delay_secs : f64,
    credentials : Vec< gateway_core::credential_pool::CredentialStatus >,
  }

  #[ derive( Debug, Serialize ) ]
  struct ModelStats
  {
    model_id : String,
    providers : Vec< ProviderStats >,
  }

  /// `GET /v1/providers/stats`.
  pub async fn provider_stats( State( state ) : State< AppState > ) -> Json< HashMap< String, ModelStats > >
  {
    let mut out = HashMap::new();
    for ( model_id, model ) in state.registry.models()
    {
      let providers = model
        .instances()
        .iter()
        .map( | slot |
        {
          let instance = slot.lock().expect( "provider instance mutex poisoned" );
          ProviderStats
          {
            name : instance.name().to_string(),
            priority : instance.priority(),
            enabled : instance.enabled(),
            consecutive_failures : instance.consecutive_failures(),
            circuit_breaker_state : instance.circuit_state(),
            health_score : instance.health_score(),
            average_response_time : instance.speed().mean_duration(),
            p95_response_time : instance.speed().p95_duration(),
            tokens_per_second : instance.speed().throughput(),
            average_ttft : instance.speed().mean_ttft(),
            p95_ttft : instance.speed().p95_ttft(),
            backoff_attempt : instance.backoff_attempt(),
            next_backoff_delay_secs : instance.backoff_delay().as_secs_f64(),
            credentials : instance.credential_statuses(),
          }
        } )
        .collect();
      out.insert( model_id.clone(), ModelStats { model_id : model_id.clone(), providers } );
    }
    Json( out )
  }

  #[ derive( Debug, Serialize ) ]
  struct Health
  {
    status : &'static str,
  }

  /// `GET /v1/health`.
  pub async fn health() -> Json< Health >
  {
    Json( Health { status : "ok" } )
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::ChatCompletionRequest;
  exposed use private::chat_completions;
  exposed use private::list_models;
  exposed use private::provider_stats;
  exposed use private::health;
}

// tests/end_to_end.rs
//! End-to-end dispatch scenarios exercised through the public API: load a
//! YAML document, build a `Registry` against a factory map, and drive one
//! or more requests through a `Dispatcher`.
//!
//! Scenarios adapted to defaults the configuration schema actually
//! exposes: circuit-breaker thresholds are not YAML-configurable (only
//! `max_retries` is), so the circuit-opens scenario below uses the
//! built-in `failure_threshold=5` rather than a literal 3.

use std::collections::HashMap;
use std::sync::Arc;

use gateway_core::adapter::{ ChatMessage, ChatParams, ProviderAdapter };
use gateway_core::circuit_breaker::CircuitState;
use gateway_core::config::{ GatewayConfig, ProviderConfig };
use gateway_core::error::GatewayError;
use gateway_core::metrics::GlobalMetrics;
use gateway_core::registry::{ AdapterFactory, Registry };
use gateway_core::dispatcher::Dispatcher;

use gateway_providers::mock::{ EchoAdapter, ScriptedAdapter, ScriptedOutcome };

fn factories_with_scripts( scripts : HashMap< &'static str, Vec< ScriptedOutcome > > ) -> HashMap< String, Arc< AdapterFactory > >
{
  let mut map : HashMap< String, Arc< AdapterFactory > > = HashMap::new();
  map.insert( "mock_echo".to_string(), Arc::new( | _ : &ProviderConfig | Ok( Arc::new( EchoAdapter ) as Arc< dyn ProviderAdapter > ) ) );
  for ( kind, script ) in scripts
  {
    let adapter : Arc< dyn ProviderAdapter > = Arc::new( ScriptedAdapter::new( script ) );
    map.insert( kind.to_string(), Arc::new( move | _ : &ProviderConfig | Ok( adapter.clone() ) ) );
  }
  map
}

fn user_message( content : &str ) -> Vec< ChatMessage >
{
  vec![ ChatMessage { role : "user".to_string(), content : content.to_string() } ]
}

#[ tokio::test ]
async fn scenario_1_single_provider_happy_path()
{
  let config = GatewayConfig::from_yaml_str(
    r#"
providers:
  p1:
    type: mock_echo
    api_keys: [k1]
models:
  m1:
    providers:
      p1: {}
"#,
  ).unwrap();

  let factories = factories_with_scripts( HashMap::new() );
  let registry = Registry::build( &config, &factories ).unwrap();
  let metrics = GlobalMetrics::new();
  let dispatcher = Dispatcher::new( &registry, &metrics );

  let response = dispatcher.dispatch( "m1", &user_message( "hi" ), &ChatParams::default() ).await.unwrap();
  assert_eq!( response.choices[ 0 ].message.content, "hi" );
  assert_eq!( metrics.snapshot().total_requests, 1 );
}

#[ tokio::test ]
async fn scenario_2_failover_on_transient()
{
  let config = GatewayConfig::from_yaml_str(
    r#"
providers:
  p1:
    type: mock_p1
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
  ).unwrap();

  let mut scripts = HashMap::new();
  scripts.insert( "mock_p1", vec![ ScriptedOutcome::Fail( "upstream 500".to_string() ) ] );
  let factories = factories_with_scripts( scripts );
  let registry = Registry::build( &config, &factories ).unwrap();
  let metrics = GlobalMetrics::new();
  let dispatcher = Dispatcher::new( &registry, &metrics );

  let response = dispatcher.dispatch( "m1", &user_message( "hi" ), &ChatParams::default() ).await.unwrap();
  assert_eq!( response.choices[ 0 ].message.content, "hi" );

  let model = registry.get( "m1" ).unwrap();
  let p1 = model.instances()[ 0 ].lock().unwrap();
  assert_eq!( p1.consecutive_failures(), 1 );
  assert_eq!( p1.circuit_failure_count(), 1 );
  drop( p1 );

  let snapshot = metrics.snapshot();
  assert_eq!( snapshot.total_errors, 1 );
  assert_eq!( snapshot.total_requests, 1 );
}

#[ tokio::test ]
async fn scenario_3_circuit_opens_after_default_threshold()
{
  let config = GatewayConfig::from_yaml_str(
    r#"
providers:
  p1:
    type: mock_p1
models:
  m1:
    providers:
      p1:
        max_retries: 5
"#,
  ).unwrap();

  let mut scripts = HashMap::new();
  scripts.insert( "mock_p1", vec![ ScriptedOutcome::Fail( "upstream 500".to_string() ) ] );
  let factories = factories_with_scripts( scripts );
  let registry = Registry::build( &config, &factories ).unwrap();
  let metrics = GlobalMetrics::new();
  let dispatcher = Dispatcher::new( &registry, &metrics );

  let err = dispatcher.dispatch( "m1", &user_message( "hi" ), &ChatParams::default() ).await.unwrap_err();
  assert!( matches!( err, GatewayError::Unavailable( _ ) ) );

  let model = registry.get( "m1" ).unwrap();
  {
    let p1 = model.instances()[ 0 ].lock().unwrap();
    assert_eq!( p1.circuit_state(), CircuitState::Open );
  }

  // A second identical request must not invoke p1 at all: no available
  // candidates once p1 is disabled and its circuit is open, so it fails
  // fast rather than retrying p1.
  let err2 = dispatcher.dispatch( "m1", &user_message( "hi" ), &ChatParams::default() ).await.unwrap_err();
  assert!( matches!( err2, GatewayError::Unavailable( _ ) ) );
}

#[ tokio::test ]
async fn scenario_4_rate_limit_rotates_then_blocks_once_both_keys_are_spent()
{
  // Two keys, each capped at 1 request/minute: req1 takes `a`, req2 takes
  // `b`. By req3 both are merely rate-limited (not failed), so there is
  // no `disabled_until` key for the emergency-unblock path to rescue —
  // selection legitimately returns no credential. No adapter is ever
  // invoked for req3, so the dispatcher reports `RateLimited` rather than
  // `Unavailable`, which is reserved for candidates that were tried and
  // failed transport-side.
  let config = GatewayConfig::from_yaml_str(
    r#"
providers:
  p1:
    type: mock_echo
    api_keys: [a, b]
    rate_limits:
      requests_per_minute: 1
models:
  m1:
    providers:
      p1:
        max_retries: 2
"#,
  ).unwrap();

  let factories = factories_with_scripts( HashMap::new() );
  let registry = Registry::build( &config, &factories ).unwrap();
  let metrics = GlobalMetrics::new();
  let dispatcher = Dispatcher::new( &registry, &metrics );

  let first = dispatcher.dispatch( "m1", &user_message( "hi" ), &ChatParams::default() ).await.unwrap();
  assert_eq!( first.choices[ 0 ].message.content, "hi" );
  let second = dispatcher.dispatch( "m1", &user_message( "hi" ), &ChatParams::default() ).await.unwrap();
  assert_eq!( second.choices[ 0 ].message.content, "hi" );

  let third = dispatcher.dispatch( "m1", &user_message( "hi" ), &ChatParams::default() ).await.unwrap_err();
  assert!( matches!( third, GatewayError::RateLimited( _ ) ) );
}

#[ tokio::test ]
async fn scenario_6_credit_exhaustion_fails_over()
{
  let config = GatewayConfig::from_yaml_str(
    r#"
providers:
  p_poor:
    type: mock_echo
    api_keys: [k]
    credits_gain_per_day: 10
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
  ).unwrap();

  let factories = factories_with_scripts( HashMap::new() );
  let registry = Registry::build( &config, &factories ).unwrap();
  let metrics = GlobalMetrics::new();
  let dispatcher = Dispatcher::new( &registry, &metrics );

  for _ in 0 .. 4
  {
    let response = dispatcher.dispatch( "m1", &user_message( "hi" ), &ChatParams::default() ).await.unwrap();
    assert_eq!( response.choices[ 0 ].message.content, "hi" );
  }
}

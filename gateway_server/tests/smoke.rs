// tests/smoke.rs
//! Boots the router against an in-process listener and drives the four
//! HTTP routes with a real client, exercising config loading, registry
//! build, and request/response (de)serialization end to end.

use std::collections::HashMap;
use std::sync::Arc;

use gateway_core::adapter::ProviderAdapter;
use gateway_core::config::{ GatewayConfig, ProviderConfig };
use gateway_core::metrics::GlobalMetrics;
use gateway_core::persistence::MetricsPersistence;
use gateway_core::registry::{ AdapterFactory, Registry };

use gateway_providers::mock::EchoAdapter;
use gateway_server::router::build_router;
use gateway_server::state::AppState;

const CONFIG : &str = r#"
providers:
  p1:
    type: mock_echo
models:
  m1:
    owned_by: test
    providers:
      p1: {}
"#;

async fn spawn_server() -> String
{
  let config = GatewayConfig::from_yaml_str( CONFIG ).unwrap();
  let mut factories : HashMap< String, Arc< AdapterFactory > > = HashMap::new();
  factories.insert( "mock_echo".to_string(), Arc::new( | _ : &ProviderConfig | Ok( Arc::new( EchoAdapter ) as Arc< dyn ProviderAdapter > ) ) );
  let registry = Registry::build( &config, &factories ).unwrap();

  let dir = tempfile::tempdir().unwrap();
  let state = AppState::new( registry, GlobalMetrics::new(), MetricsPersistence::new( dir.path() ) );
  let app = build_router( state );

  let listener = tokio::net::TcpListener::bind( "127.0.0.1:0" ).await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn( async move { axum::serve( listener, app ).await.unwrap(); } );
  format!( "http://{addr}" )
}

#[ tokio::test ]
async fn health_reports_ok()
{
  let base = spawn_server().await;
  let body : serde_json::Value = reqwest::get( format!( "{base}/v1/health" ) ).await.unwrap().json().await.unwrap();
  assert_eq!( body[ "status" ], "ok" );
}

#[ tokio::test ]
async fn lists_configured_models()
{
  let base = spawn_server().await;
  let body : serde_json::Value = reqwest::get( format!( "{base}/v1/models" ) ).await.unwrap().json().await.unwrap();
  assert_eq!( body[ "data" ][ 0 ][ "id" ], "m1" );
}

#[ tokio::test ]
async fn chat_completions_echoes_last_message()
{
  let base = spawn_server().await;
  let client = reqwest::Client::new();
  let response = client
    .post( format!( "{base}/v1/chat/completions" ) )
    .json( &serde_json::json!( { "model": "m1", "messages": [ { "role": "user", "content": "hi" } ] } ) )
    .send()
    .await
    .unwrap();
  assert_eq!( response.status(), 200 );
  let body : serde_json::Value = response.json().await.unwrap();
  assert_eq!( body[ "choices" ][ 0 ][ "message" ][ "content" ], "hi" );
}

#[ tokio::test ]
async fn unknown_model_is_404()
{
  let base = spawn_server().await;
  let client = reqwest::Client::new();
  let response = client
    .post( format!( "{base}/v1/chat/completions" ) )
    .json( &serde_json::json!( { "model": "ghost", "messages": [ { "role": "user", "content": "hi" } ] } ) )
    .send()
    .await
    .unwrap();
  assert_eq!( response.status(), 404 );
}

#[ tokio::test ]
async fn empty_messages_is_400()
{
  let base = spawn_server().await;
  let client = reqwest::Client::new();
  let response = client
    .post( format!( "{base}/v1/chat/completions" ) )
    .json( &serde_json::json!( { "model": "m1", "messages": [] } ) )
    .send()
    .await
    .unwrap();
  assert_eq!( response.status(), 400 );
}

#[ tokio::test ]
async fn provider_stats_lists_p1_under_m1()
{
  let base = spawn_server().await;
  let body : serde_json::Value = reqwest::get( format!( "{base}/v1/providers/stats" ) ).await.unwrap().json().await.unwrap();
  assert_eq!( body[ "m1" ][ "providers" ][ 0 ][ "name" ], "p1" );
}

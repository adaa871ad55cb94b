// src/main.rs
//! Process entry point: parses CLI arguments, loads configuration,
//! restores persisted aggregates, serves the HTTP surface, and flushes
//! metrics on a timer and on graceful shutdown.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{ fmt, EnvFilter };

use gateway_core::config::GatewayConfig;
use gateway_core::metrics::GlobalMetrics;
use gateway_core::persistence::MetricsPersistence;
use gateway_core::registry::Registry;
use gateway_providers::factories::builtin_factories;
use gateway_server::persistence_task;
use gateway_server::router::build_router;
use gateway_server::state::AppState;

/// HTTP surface for the `llm_gateway` dispatch engine.
#[ derive( Debug, Parser ) ]
#[ command( name = "gateway_server" ) ]
struct Args
{
  /// Path to the YAML configuration document (spec.md §6.3).
  #[ arg( long, default_value = "config.yaml" ) ]
  config : PathBuf,

  /// Directory for the two persisted metrics JSON files (spec.md §6.4).
  #[ arg( long, default_value = "metrics" ) ]
  metrics_dir : PathBuf,

  /// Address to bind the HTTP listener to.
  #[ arg( long, default_value = "0.0.0.0" ) ]
  host : String,

  /// Port to bind the HTTP listener to.
  #[ arg( long, default_value_t = 8080 ) ]
  port : u16,

  /// Seconds between periodic metrics flushes.
  #[ arg( long, default_value_t = 60 ) ]
  flush_interval_secs : u64,
}

#[ tokio::main ]
async fn main() -> Result< (), Box< dyn std::error::Error > >
{
  fmt()
    .with_env_filter( EnvFilter::from_default_env().add_directive( "gateway_server=info".parse()? ) )
    .init();

  let args = Args::parse();

  let config = GatewayConfig::from_yaml_file( &args.config )?;
  let factories = builtin_factories();
  let registry = Registry::build( &config, &factories )?;
  let metrics = GlobalMetrics::new();
  let persistence = MetricsPersistence::new( &args.metrics_dir );

  let state = AppState::new( registry, metrics, persistence );
  persistence_task::restore( &state );

  let flush_handle = persistence_task::spawn_periodic_flush( state.clone(), Duration::from_secs( args.flush_interval_secs ) );

  let app = build_router( state.clone() );
  let addr : SocketAddr = format!( "{}:{}", args.host, args.port ).parse()?;
  tracing::info!( %addr, config = %args.config.display(), "starting gateway_server" );

  let listener = tokio::net::TcpListener::bind( addr ).await?;
  axum::serve( listener, app ).with_graceful_shutdown( shutdown_signal() ).await?;

  flush_handle.abort();
  persistence_task::flush( &state );
  tracing::info!( "gateway_server stopped" );

  Ok( () )
}

async fn shutdown_signal()
{
  let ctrl_c = async
  {
    tokio::signal::ctrl_c().await.expect( "failed to install Ctrl+C handler" );
  };

  #[ cfg( unix ) ]
  let terminate = async
  {
    tokio::signal::unix::signal( tokio::signal::unix::SignalKind::terminate() )
      .expect( "failed to install SIGTERM handler" )
      .recv()
      .await;
  };

  #[ cfg( not( unix ) ) ]
  let terminate = core::future::pending::< () >();

  tokio::select!
  {
    () = ctrl_c => {},
    () = terminate => {},
  }
}

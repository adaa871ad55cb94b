// src/persistence.rs
//! JSON persistence for aggregate metrics (spec.md §6.4). Two files under a
//! configurable directory: per-provider-instance aggregates and global
//! aggregates. Rolling windows are never written or restored.

mod private
{
  use std::collections::HashMap;
  use std::path::{ Path, PathBuf };

  use serde::{ Deserialize, Serialize };

  use crate::circuit_breaker::CircuitState;
  use crate::error::Result;
  use crate::metrics::GlobalMetricsSnapshot;
  use crate::provider_instance::ProviderInstance;

  /// Persisted snapshot of one `ProviderInstance`'s aggregate health state.
  #[ derive( Debug, Clone, Copy, Serialize, Deserialize ) ]
  pub struct ProviderInstanceAggregate
  {
    pub consecutive_failures : u32,
    pub circuit_breaker_state : CircuitState,
    pub circuit_breaker_failure_count : u32,
    pub circuit_breaker_success_count : u32,
    pub average_response_time : f64,
    pub p95_response_time : f64,
    pub tokens_per_second : f64,
    pub average_ttft : f64,
    pub p95_ttft : f64,
  }

  impl ProviderInstanceAggregate
  {
    /// Snapshot the persistable subset of a live instance's state.
    #[ must_use ]
    pub fn extract( instance : &ProviderInstance ) -> Self
    {
      Self
      {
        consecutive_failures : instance.consecutive_failures(),
        circuit_breaker_state : instance.circuit_state(),
        circuit_breaker_failure_count : instance.circuit_failure_count(),
        circuit_breaker_success_count : instance.circuit_success_count(),
        average_response_time : instance.speed().mean_duration(),
        p95_response_time : instance.speed().p95_duration(),
        tokens_per_second : instance.speed().throughput(),
        average_ttft : instance.speed().mean_ttft(),
        p95_ttft : instance.speed().p95_ttft(),
      }
    }

    /// Apply this snapshot back onto a freshly constructed instance.
    pub fn restore( &self, instance : &mut ProviderInstance )
    {
      instance.restore( self.consecutive_failures, self.circuit_breaker_state, self.circuit_breaker_failure_count, self.circuit_breaker_success_count );
    }
  }

  /// Handles reading and writing the two metrics files under `metrics/`.
  #[ derive( Debug, Clone ) ]
  pub struct MetricsPersistence
  {
    provider_metrics_path : PathBuf,
    global_metrics_path : PathBuf,
  }

  impl MetricsPersistence
  {
    /// Use the default layout: `<dir>/provider_metrics.json` and
    /// `<dir>/global_metrics.json`.
    #[ must_use ]
    pub fn new( dir : impl AsRef< Path > ) -> Self
    {
      let dir = dir.as_ref();
      Self { provider_metrics_path : dir.join( "provider_metrics.json" ), global_metrics_path : dir.join( "global_metrics.json" ) }
    }

    fn ensure_parent_dirs( &self ) -> Result< () >
    {
      if let Some( parent ) = self.provider_metrics_path.parent()
      {
        std::fs::create_dir_all( parent )?;
      }
      Ok( () )
    }

    /// Write per-instance aggregates, keyed by an opaque instance label
    /// (the caller decides the naming scheme, typically `"{model}:{provider}"`).
    pub fn save_provider_metrics( &self, metrics : &HashMap< String, ProviderInstanceAggregate > ) -> Result< () >
    {
      self.ensure_parent_dirs()?;
      let json = serde_json::to_string_pretty( metrics )?;
      std::fs::write( &self.provider_metrics_path, json )?;
      Ok( () )
    }

    /// Load per-instance aggregates. Returns an empty map if the file does
    /// not exist yet (first run).
    pub fn load_provider_metrics( &self ) -> Result< HashMap< String, ProviderInstanceAggregate > >
    {
      if !self.provider_metrics_path.exists()
      {
        return Ok( HashMap::new() );
      }
      let text = std::fs::read_to_string( &self.provider_metrics_path )?;
      Ok( serde_json::from_str( &text )? )
    }

    /// Write the global metrics snapshot.
    pub fn save_global_metrics( &self, snapshot : &GlobalMetricsSnapshot ) -> Result< () >
    {
      self.ensure_parent_dirs()?;
      let json = serde_json::to_string_pretty( snapshot )?;
      std::fs::write( &self.global_metrics_path, json )?;
      Ok( () )
    }

    /// Load the global metrics snapshot. Returns the default (all-zero)
    /// snapshot if the file does not exist yet.
    pub fn load_global_metrics( &self ) -> Result< GlobalMetricsSnapshot >
    {
      if !self.global_metrics_path.exists()
      {
        return Ok( GlobalMetricsSnapshot::default() );
      }
      let text = std::fs::read_to_string( &self.global_metrics_path )?;
      Ok( serde_json::from_str( &text )? )
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ test ]
    fn round_trips_provider_metrics()
    {
      let dir = tempfile::tempdir().unwrap();
      let persistence = MetricsPersistence::new( dir.path() );

      let mut metrics = HashMap::new();
      metrics.insert(
        "m1:p1".to_string(),
        ProviderInstanceAggregate
        {
          consecutive_failures : 2,
          circuit_breaker_state : CircuitState::Open,
          circuit_breaker_failure_count : 5,
          circuit_breaker_success_count : 0,
          average_response_time : 0.5,
          p95_response_time : 0.9,
          tokens_per_second : 42.0,
          average_ttft : 0.05,
          p95_ttft : 0.1,
        },
      );

      persistence.save_provider_metrics( &metrics ).unwrap();
      let loaded = persistence.load_provider_metrics().unwrap();
      assert_eq!( loaded[ "m1:p1" ].consecutive_failures, 2 );
      assert_eq!( loaded[ "m1:p1" ].circuit_breaker_state, CircuitState::Open );
    }

    #[ test ]
    fn missing_files_load_as_empty_or_default()
    {
      let dir = tempfile::tempdir().unwrap();
      let persistence = MetricsPersistence::new( dir.path() );
      assert!( persistence.load_provider_metrics().unwrap().is_empty() );
      assert_eq!( persistence.load_global_metrics().unwrap().total_requests, 0 );
    }
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::ProviderInstanceAggregate;
  exposed use private::MetricsPersistence;
}

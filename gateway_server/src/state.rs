// src/state.rs
//! Process-wide shared state: the built registry, global metrics, and the
//! metrics persistence handle, all reachable from every request handler.

mod private
{
  use std::sync::Arc;

  use gateway_core::metrics::GlobalMetrics;
  use gateway_core::persistence::MetricsPersistence;
  use gateway_core::registry::Registry;

  /// Shared application state, cloned cheaply into every handler via
  /// `axum::extract::State`.
  #[ derive( Debug, Clone ) ]
  pub struct AppState
  {
    /// Built model/provider registry; immutable after startup.
    pub registry : Arc< Registry >,
    /// Process-wide request counters and rolling windows.
    pub metrics : Arc< GlobalMetrics >,
    /// Handle for reading/writing the two metrics JSON files.
    pub persistence : Arc< MetricsPersistence >,
  }

  impl AppState
  {
    #[ must_use ]
    pub fn new( registry : Registry, metrics : GlobalMetrics, persistence : MetricsPersistence ) -> Self
    {
      Self { registry : Arc::new( registry ), metrics : Arc::new( metrics ), persistence : Arc::new( persistence ) }
    }
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::AppState;
}

// src/persistence_task.rs
//! Startup restore and periodic flush of the two metrics JSON files
//! (spec.md §6.4): "on startup the engine restores aggregates; on
//! change/shutdown it writes."

mod private
{
  use std::collections::HashMap;
  use std::time::Duration;

  use gateway_core::persistence::ProviderInstanceAggregate;

  use crate::state::AppState;

  fn instance_label( model_id : &str, provider_name : &str ) -> String
  {
    format!( "{model_id}:{provider_name}" )
  }

  /// Apply any persisted aggregates onto the freshly built registry and
  /// global metrics. Safe to call on a registry with no prior state: a
  /// missing file loads as empty/default.
  pub fn restore( state : &AppState )
  {
    match state.persistence.load_provider_metrics()
    {
      Ok( saved ) => apply_provider_metrics( state, &saved ),
      Err( error ) => tracing::warn!( %error, "failed to load persisted provider metrics; starting cold" ),
    }

    match state.persistence.load_global_metrics()
    {
      Ok( snapshot ) => state.metrics.restore( snapshot ),
      Err( error ) => tracing::warn!( %error, "failed to load persisted global metrics; starting cold" ),
    }
  }

  fn apply_provider_metrics( state : &AppState, saved : &HashMap< String, ProviderInstanceAggregate > )
  {
    for ( model_id, model ) in state.registry.models()
    {
      for slot in model.instances()
      {
        let mut instance = slot.lock().expect( "provider instance mutex poisoned" );
        let label = instance_label( model_id, instance.name() );
        if let Some( aggregate ) = saved.get( &label )
        {
          aggregate.restore( &mut instance );
        }
      }
    }
  }

  fn snapshot_provider_metrics( state : &AppState ) -> HashMap< String, ProviderInstanceAggregate >
  {
    let mut out = HashMap::new();
    for ( model_id, model ) in state.registry.models()
    {
      for slot in model.instances()
      {
        let instance = slot.lock().expect( "provider instance mutex poisoned" );
        let label = instance_label( model_id, instance.name() );
        out.insert( label, ProviderInstanceAggregate::extract( &instance ) );
      }
    }
    out
  }

  /// Write the current aggregates to disk once.
  pub fn flush( state : &AppState )
  {
    let provider_metrics = snapshot_provider_metrics( state );
    if let Err( error ) = state.persistence.save_provider_metrics( &provider_metrics )
    {
      tracing::warn!( %error, "failed to persist provider metrics" );
    }

    let global_snapshot = state.metrics.snapshot();
    if let Err( error ) = state.persistence.save_global_metrics( &global_snapshot )
    {
      tracing::warn!( %error, "failed to persist global metrics" );
    }
  }

  /// Spawn a background ticker that flushes aggregates every `interval`
  /// until the returned handle is aborted.
  pub fn spawn_periodic_flush( state : AppState, interval : Duration ) -> tokio::task::JoinHandle< () >
  {
    tokio::spawn( async move
    {
      let mut ticker = tokio::time::interval( interval );
      loop
      {
        ticker.tick().await;
        flush( &state );
      }
    } )
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::restore;
  exposed use private::flush;
  exposed use private::spawn_periodic_flush;
}

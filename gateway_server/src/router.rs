// src/router.rs
//! Wires route handlers onto an `axum::Router` over shared `AppState`.

mod private
{
  use axum::routing::{ get, post };
  use axum::Router;
  use tower_http::trace::TraceLayer;

  use crate::routes::{ chat_completions, health, list_models, provider_stats };
  use crate::state::AppState;

  /// Build the full HTTP surface (spec.md §6.1).
  #[ must_use ]
  pub fn build_router( state : AppState ) -> Router
  {
    Router::new()
      .route( "/v1/chat/completions", post( chat_completions ) )
      .route( "/v1/models", get( list_models ) )
      .route( "/v1/providers/stats", get( provider_stats ) )
      .route( "/v1/health", get( health ) )
      .layer( TraceLayer::new_for_http() )
      .with_state( state )
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::build_router;
}

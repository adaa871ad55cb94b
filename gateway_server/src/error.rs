// src/error.rs
//! Maps `GatewayError` onto HTTP status codes and a JSON error body
//! (spec.md §6.1: 404 model not found, 400 validation, 503 exhausted,
//! 500 registry not initialized / internal).

mod private
{
  use axum::http::StatusCode;
  use axum::response::{ IntoResponse, Response };
  use axum::Json;
  use serde::Serialize;

  use gateway_core::error::GatewayError;

  #[ derive( Debug, Serialize ) ]
  struct ErrorBody
  {
    error : ErrorDetail,
  }

  #[ derive( Debug, Serialize ) ]
  struct ErrorDetail
  {
    message : String,
    #[ serde( rename = "type" ) ]
    kind : &'static str,
  }

  /// Wraps a `GatewayError` so it can be returned directly from a handler.
  #[ derive( Debug ) ]
  pub struct ApiError( pub GatewayError );

  impl From< GatewayError > for ApiError
  {
    fn from( error : GatewayError ) -> Self
    {
      Self( error )
    }
  }

  impl IntoResponse for ApiError
  {
    fn into_response( self ) -> Response
    {
      let ( status, kind ) = match &self.0
      {
        GatewayError::Validation( _ ) | GatewayError::AdapterValidation( _ ) => ( StatusCode::BAD_REQUEST, "validation_error" ),
        GatewayError::ModelNotFound( _ ) => ( StatusCode::NOT_FOUND, "model_not_found" ),
        GatewayError::RateLimited( _ ) => ( StatusCode::TOO_MANY_REQUESTS, "rate_limited" ),
        GatewayError::Unavailable( _ ) => ( StatusCode::SERVICE_UNAVAILABLE, "unavailable" ),
        GatewayError::NotInitialized => ( StatusCode::INTERNAL_SERVER_ERROR, "not_initialized" ),
        GatewayError::Config( _ ) => ( StatusCode::INTERNAL_SERVER_ERROR, "config_error" ),
        GatewayError::Transport( _ ) => ( StatusCode::BAD_GATEWAY, "transport_error" ),
        GatewayError::Persistence( _ ) => ( StatusCode::INTERNAL_SERVER_ERROR, "persistence_error" ),
        GatewayError::Internal( _ ) => ( StatusCode::INTERNAL_SERVER_ERROR, "internal_error" ),
      };
      let body = ErrorBody { error : ErrorDetail { message : self.0.to_string(), kind } };
      ( status, Json( body ) ).into_response()
    }
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::ApiError;
}

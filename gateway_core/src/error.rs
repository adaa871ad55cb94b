// src/error.rs
//! This module defines the error types for the dispatch engine.
//! It includes a comprehensive `GatewayError` enum that covers validation,
//! transport, configuration, and internal failure scenarios.

/// Define a private namespace for all its items.
mod private
{
  use core::fmt;

  /// A single field-level validation failure reported by a provider adapter.
  ///
  /// Mirrors the `(field, message, code)` shape an adapter uses to reject a
  /// request before it ever reaches the upstream network call.
  #[ derive( Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize ) ]
  pub struct ValidationIssue
  {
    /// Dotted path of the offending field, e.g. `messages[0].role`.
    pub field : String,
    /// Human-readable description of the failure.
    pub message : String,
    /// Stable machine-readable code, e.g. `MISSING_ROLE`.
    pub code : String,
  }

  impl fmt::Display for ValidationIssue
  {
    #[ inline ]
    fn fmt( &self, f : &mut fmt::Formatter< '_ > ) -> fmt::Result
    {
      write!( f, "{} ({}): {}", self.field, self.code, self.message )
    }
  }

  /// All possible errors that can occur while dispatching a chat-completion
  /// request across the provider registry.
  #[ derive( Debug, Clone, thiserror::Error ) ]
  #[ non_exhaustive ]
  pub enum GatewayError
  {
    /// The client-supplied request failed basic validation (unknown model,
    /// missing field). Surfaced immediately, never retried.
    #[ error( "validation error: {0:?}" ) ]
    Validation( Vec< ValidationIssue > ),

    /// A provider adapter rejected the request as malformed for its wire
    /// format (spec.md §6.2/§7: "ValidationError"). Distinct from
    /// `Validation` because it is attempt-scoped, not request-scoped: other
    /// candidates may still be tried.
    #[ error( "adapter rejected request: {0:?}" ) ]
    AdapterValidation( Vec< ValidationIssue > ),

    /// Network failure, timeout, or non-2xx upstream response. Retryable.
    #[ error( "transport error: {0}" ) ]
    Transport( String ),

    /// Every ranked candidate was excluded purely by rate-limit or
    /// credit-balance exhaustion — no credential was ever eligible, and no
    /// adapter was ever actually invoked. Distinct from `Unavailable`, which
    /// also covers candidates that were tried and failed transport-side.
    #[ error( "rate limited: {0}" ) ]
    RateLimited( String ),

    /// The logical model named in the request is not registered.
    #[ error( "model not found: {0}" ) ]
    ModelNotFound( String ),

    /// Every ranked candidate for a model was exhausted without success.
    #[ error( "no available providers: {0}" ) ]
    Unavailable( String ),

    /// Configuration document failed to parse or referenced an unknown
    /// provider type / provider name.
    #[ error( "configuration error: {0}" ) ]
    Config( String ),

    /// The registry was queried before it had been built.
    #[ error( "registry not initialized" ) ]
    NotInitialized,

    /// Persistence (metrics read/write) failure. Never fatal to a request;
    /// surfaced only to callers that explicitly flush or restore state.
    #[ error( "persistence error: {0}" ) ]
    Persistence( String ),

    /// Catch-all for invariant violations that should not be reachable.
    #[ error( "internal error: {0}" ) ]
    Internal( String ),
  }

  impl From< serde_json::Error > for GatewayError
  {
    #[ inline ]
    fn from( error : serde_json::Error ) -> Self
    {
      GatewayError::Internal( format!( "JSON error: {error}" ) )
    }
  }

  impl From< serde_yaml::Error > for GatewayError
  {
    #[ inline ]
    fn from( error : serde_yaml::Error ) -> Self
    {
      GatewayError::Config( format!( "YAML error: {error}" ) )
    }
  }

  impl From< std::io::Error > for GatewayError
  {
    #[ inline ]
    fn from( error : std::io::Error ) -> Self
    {
      GatewayError::Persistence( error.to_string() )
    }
  }

  /// Crate-wide result alias.
  pub type Result< T > = core::result::Result< T, GatewayError >;

} // end mod private

crate ::mod_interface!
{
  exposed use private::ValidationIssue;
  exposed use private::GatewayError;
  exposed use private::Result;
}

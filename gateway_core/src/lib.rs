// src/lib.rs
//! Dispatch engine for an `OpenAI`-compatible multi-provider chat-completion
//! gateway: model-and-candidate ranking, credential rotation, rate limiting,
//! circuit breaking, exponential backoff, failover, and metrics.
//!
//! This crate holds no network or HTTP layer of its own — `gateway_providers`
//! supplies [`adapter::ProviderAdapter`] implementations and `gateway_server`
//! wires a [`dispatcher::Dispatcher`] up to an HTTP surface. Everything here
//! is runtime-stateful but process-stateless except for [`persistence`],
//! which is an explicit, opt-in aggregate snapshot.

#![ warn( missing_docs ) ]

use mod_interface::mod_interface;

mod private {}

mod_interface!
{
  layer error;
  layer secret;
  layer rate_limiter;
  layer circuit_breaker;
  layer backoff;
  layer speed_tracker;
  layer adapter;
  layer credential_pool;
  layer provider_instance;
  layer model;
  layer registry;
  layer metrics;
  layer config;
  layer persistence;
  layer dispatcher;

  exposed use error;
  exposed use secret;
  exposed use rate_limiter;
  exposed use circuit_breaker;
  exposed use backoff;
  exposed use speed_tracker;
  exposed use adapter;
  exposed use credential_pool;
  exposed use provider_instance;
  exposed use model;
  exposed use registry;
  exposed use metrics;
  exposed use config;
  exposed use persistence;
  exposed use dispatcher;
}

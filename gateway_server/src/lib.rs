// src/lib.rs
//! Thin HTTP surface for the `llm_gateway` dispatch engine: configuration
//! loading, route wiring, and metrics-persistence scheduling. The dispatch
//! algorithm itself lives in `gateway_core`; this crate only translates it
//! to and from HTTP.

#![ warn( missing_docs ) ]

use mod_interface::mod_interface;

mod private {}

mod_interface!
{
  layer state;
  layer error;
  layer routes;
  layer router;
  layer persistence_task;

  exposed use state;
  exposed use error;
  exposed use routes;
  exposed use router;
  exposed use persistence_task;
}

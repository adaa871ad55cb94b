// src/lib.rs
//! Provider adapters for the `llm_gateway` dispatch engine: an
//! OpenAI-wire-compatible HTTP adapter, in-memory adapters for tests and
//! demos, and the built-in `type:` string → adapter factory registry that
//! `gateway_server` loads configuration against.

#![ warn( missing_docs ) ]

use mod_interface::mod_interface;

mod private {}

mod_interface!
{
  layer openai_http;
  layer mock;
  layer factories;

  exposed use openai_http;
  exposed use mock;
  exposed use factories;
}

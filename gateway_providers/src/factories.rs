// src/factories.rs
//! Built-in adapter-factory registry: maps a provider's `type:` string from
//! configuration to a constructor for the matching [`ProviderAdapter`].

mod private
{
  use std::collections::HashMap;
  use std::sync::Arc;

  use gateway_core::registry::AdapterFactory;

  use crate::mock::EchoAdapter;
  use crate::openai_http::OpenAiHttpAdapter;

  /// The adapter types this crate ships out of the box: `"openai"` for any
  /// upstream speaking the OpenAI chat-completions wire format, and
  /// `"mock_echo"` for local demos and smoke tests.
  #[ must_use ]
  pub fn builtin_factories() -> HashMap< String, Arc< AdapterFactory > >
  {
    let mut map : HashMap< String, Arc< AdapterFactory > > = HashMap::new();
    map.insert( "openai".to_string(), Arc::new( | config : &gateway_core::config::ProviderConfig | {
      OpenAiHttpAdapter::from_config( config ).map( | a | Arc::new( a ) as Arc< dyn gateway_core::adapter::ProviderAdapter > )
    } ) );
    map.insert( "mock_echo".to_string(), Arc::new( | _config : &gateway_core::config::ProviderConfig | {
      Ok( Arc::new( EchoAdapter ) as Arc< dyn gateway_core::adapter::ProviderAdapter > )
    } ) );
    map
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ test ]
    fn builtin_factories_cover_openai_and_mock_echo()
    {
      let factories = builtin_factories();
      assert!( factories.contains_key( "openai" ) );
      assert!( factories.contains_key( "mock_echo" ) );
    }
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::builtin_factories;
}

// src/config.rs
//! Binding for the YAML configuration document (spec.md §6.3): providers
//! keyed by adapter name, and models keyed by logical id, each naming the
//! providers that back it.

mod private
{
  use std::collections::HashMap;
  use std::path::Path;

  use serde::{ Deserialize, Serialize };

  use crate::error::{ GatewayError, Result };

  /// A YAML scalar that may appear as either a single string or a list.
  #[ derive( Debug, Clone, Serialize, Deserialize ) ]
  #[ serde( untagged ) ]
  pub enum StringOrList
  {
    /// A single value.
    One( String ),
    /// Several values.
    Many( Vec< String > ),
  }

  impl StringOrList
  {
    /// Normalize to a non-empty `Vec<String>`.
    #[ must_use ]
    pub fn into_vec( self ) -> Vec< String >
    {
      match self
      {
        StringOrList::One( s ) => vec![ s ],
        StringOrList::Many( v ) => v,
      }
    }
  }

  /// One entry in the top-level `providers:` section.
  #[ derive( Debug, Clone, Default, Serialize, Deserialize ) ]
  pub struct ProviderConfig
  {
    /// Adapter type string, resolved against a factory registry at startup.
    #[ serde( rename = "type" ) ]
    pub kind : String,
    #[ serde( default ) ]
    pub base_url : Option< String >,
    #[ serde( default ) ]
    pub timeout : Option< f64 >,
    #[ serde( default ) ]
    pub api_keys : Option< StringOrList >,
    #[ serde( default ) ]
    pub rate_limits : Option< HashMap< String, f64 > >,
    #[ serde( default ) ]
    pub credits_gain_per_minute : Option< f64 >,
    #[ serde( default ) ]
    pub credits_gain_per_hour : Option< f64 >,
    #[ serde( default ) ]
    pub credits_gain_per_day : Option< f64 >,
    #[ serde( default ) ]
    pub credits_gain_per_month : Option< f64 >,
    #[ serde( default ) ]
    pub credits_max_per_minute : Option< f64 >,
    #[ serde( default ) ]
    pub credits_max_per_hour : Option< f64 >,
    #[ serde( default ) ]
    pub credits_max_per_day : Option< f64 >,
    #[ serde( default ) ]
    pub credits_max_per_month : Option< f64 >,
  }

  /// One provider binding under a logical model's `providers:` map.
  #[ derive( Debug, Clone, Default, Serialize, Deserialize ) ]
  pub struct ModelProviderConfig
  {
    #[ serde( default ) ]
    pub priority : Option< i64 >,
    #[ serde( default ) ]
    pub model_id : Option< StringOrList >,
    #[ serde( default ) ]
    pub api_keys : Option< StringOrList >,
    #[ serde( default ) ]
    pub rate_limits : Option< HashMap< String, f64 > >,
    #[ serde( default ) ]
    pub multiplier : Option< f64 >,
    #[ serde( default ) ]
    pub token_multiplier : Option< f64 >,
    #[ serde( default ) ]
    pub in_token_multiplier : Option< f64 >,
    #[ serde( default ) ]
    pub out_token_multiplier : Option< f64 >,
    #[ serde( default ) ]
    pub request_multiplier : Option< f64 >,
    #[ serde( default ) ]
    pub credits_per_token : Option< f64 >,
    #[ serde( default ) ]
    pub credits_per_million_tokens : Option< f64 >,
    #[ serde( default ) ]
    pub credits_per_in_token : Option< f64 >,
    #[ serde( default ) ]
    pub credits_per_out_token : Option< f64 >,
    #[ serde( default ) ]
    pub credits_per_million_in_tokens : Option< f64 >,
    #[ serde( default ) ]
    pub credits_per_million_out_tokens : Option< f64 >,
    #[ serde( default ) ]
    pub credits_per_request : Option< f64 >,
    #[ serde( default ) ]
    pub max_retries : Option< u32 >,
  }

  /// One entry in the top-level `models:` section.
  #[ derive( Debug, Clone, Default, Serialize, Deserialize ) ]
  pub struct ModelConfig
  {
    #[ serde( default ) ]
    pub created : Option< i64 >,
    #[ serde( default ) ]
    pub owned_by : Option< String >,
    #[ serde( default ) ]
    pub providers : HashMap< String, ModelProviderConfig >,
  }

  /// The full configuration document.
  #[ derive( Debug, Clone, Default, Serialize, Deserialize ) ]
  pub struct GatewayConfig
  {
    #[ serde( default ) ]
    pub providers : HashMap< String, ProviderConfig >,
    #[ serde( default ) ]
    pub models : HashMap< String, ModelConfig >,
  }

  impl GatewayConfig
  {
    /// Parse a configuration document from a YAML string.
    pub fn from_yaml_str( text : &str ) -> Result< Self >
    {
      let config : Self = serde_yaml::from_str( text )?;
      config.validate()?;
      Ok( config )
    }

    /// Load and parse a configuration document from a YAML file.
    pub fn from_yaml_file( path : &Path ) -> Result< Self >
    {
      let text = std::fs::read_to_string( path )
        .map_err( | e | GatewayError::Config( format!( "failed to read {}: {e}", path.display() ) ) )?;
      Self::from_yaml_str( &text )
    }

    /// Every model must reference at least one provider, and every
    /// referenced provider name must exist in the `providers:` section.
    fn validate( &self ) -> Result< () >
    {
      for ( model_id, model ) in &self.models
      {
        if model.providers.is_empty()
        {
          return Err( GatewayError::Config( format!( "model '{model_id}' has no providers" ) ) );
        }
        for provider_name in model.providers.keys()
        {
          if !self.providers.contains_key( provider_name )
          {
            return Err( GatewayError::Config( format!( "model '{model_id}' references unknown provider '{provider_name}'" ) ) );
          }
        }
      }
      Ok( () )
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    const SAMPLE : &str = r#"
providers:
  p1:
    type: mock_echo
    api_keys: [a, b]
    rate_limits:
      requests_per_minute: 10
models:
  m1:
    owned_by: test
    providers:
      p1:
        priority: 0
        model_id: native-m1
"#;

    #[ test ]
    fn parses_sample_document()
    {
      let config = GatewayConfig::from_yaml_str( SAMPLE ).unwrap();
      assert_eq!( config.providers.len(), 1 );
      assert_eq!( config.models.len(), 1 );
      let p1 = &config.providers[ "p1" ];
      assert_eq!( p1.kind, "mock_echo" );
    }

    #[ test ]
    fn rejects_unknown_provider_reference()
    {
      let bad = r#"
providers: {}
models:
  m1:
    providers:
      ghost: {}
"#;
      let err = GatewayConfig::from_yaml_str( bad ).unwrap_err();
      assert!( matches!( err, GatewayError::Config( _ ) ) );
    }

    #[ test ]
    fn string_or_list_normalizes()
    {
      assert_eq!( StringOrList::One( "a".to_string() ).into_vec(), vec![ "a".to_string() ] );
      assert_eq!( StringOrList::Many( vec![ "a".to_string(), "b".to_string() ] ).into_vec(), vec![ "a".to_string(), "b".to_string() ] );
    }
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::StringOrList;
  exposed use private::ProviderConfig;
  exposed use private::ModelProviderConfig;
  exposed use private::ModelConfig;
  exposed use private::GatewayConfig;
}

// src/secret.rs
//! `Secret` wraps an opaque API credential so it is never accidentally
//! exposed in debug output, logs, or serialized state.

mod private
{
  use secrecy::{ ExposeSecret, SecretString };
  use crate::error::{ GatewayError, Result };

  /// An opaque provider credential (API key, bearer token, …).
  ///
  /// `Debug` never prints the wrapped value. Use [`Secret::expose`] only at
  /// the point the value is handed to a transport layer.
  #[ derive( Clone ) ]
  pub struct Secret( SecretString );

  impl core::fmt::Debug for Secret
  {
    fn fmt( &self, f : &mut core::fmt::Formatter< '_ > ) -> core::fmt::Result
    {
      f.debug_tuple( "Secret" ).field( &"<redacted>" ).finish()
    }
  }

  impl Secret
  {
    /// Wrap `value` after checking it is a plausible credential (non-empty,
    /// within a sane length range). Providers speak wildly different key
    /// formats, so this does not enforce a provider-specific prefix.
    pub fn new( value : String ) -> Result< Self >
    {
      let trimmed = value.trim();
      if trimmed.is_empty()
      {
        return Err( GatewayError::Config( "credential must not be empty".to_string() ) );
      }
      if trimmed.len() > 4096
      {
        return Err( GatewayError::Config( "credential exceeds maximum length".to_string() ) );
      }
      Ok( Self( SecretString::from( trimmed.to_string() ) ) )
    }

    /// Wrap `value` without validation; used for credentials whose format is
    /// already known good (e.g. round-tripped from persisted state).
    #[ must_use ]
    pub fn new_unchecked( value : String ) -> Self
    {
      Self( SecretString::from( value ) )
    }

    /// Borrow the wrapped value. Callers must not log or persist the
    /// returned string.
    #[ must_use ]
    pub fn expose( &self ) -> &str
    {
      self.0.expose_secret()
    }
  }

  impl From< String > for Secret
  {
    fn from( value : String ) -> Self
    {
      Self::new_unchecked( value )
    }
  }

  impl From< &str > for Secret
  {
    fn from( value : &str ) -> Self
    {
      Self::new_unchecked( value.to_owned() )
    }
  }

  impl PartialEq for Secret
  {
    fn eq( &self, other : &Self ) -> bool
    {
      self.0.expose_secret() == other.0.expose_secret()
    }
  }

  impl Eq for Secret {}

  impl core::hash::Hash for Secret
  {
    fn hash< H : core::hash::Hasher >( &self, state : &mut H )
    {
      self.0.expose_secret().hash( state );
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ test ]
    fn debug_never_prints_value()
    {
      let secret = Secret::new( "sk-super-sensitive-value".to_string() ).unwrap();
      let rendered = format!( "{secret:?}" );
      assert!( !rendered.contains( "super-sensitive" ) );
    }

    #[ test ]
    fn rejects_empty_credential()
    {
      assert!( Secret::new( String::new() ).is_err() );
      assert!( Secret::new( "   ".to_string() ).is_err() );
    }

    #[ test ]
    fn equal_secrets_compare_equal()
    {
      let a = Secret::new( "key-a".to_string() ).unwrap();
      let b = Secret::new( "key-a".to_string() ).unwrap();
      let c = Secret::new( "key-b".to_string() ).unwrap();
      assert_eq!( a, b );
      assert_ne!( a, c );
    }
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::Secret;
}

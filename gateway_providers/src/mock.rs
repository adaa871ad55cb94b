// src/mock.rs
//! In-memory adapters for tests and local demos: an adapter that echoes the
//! last user message back, and one that replays a fixed script of
//! outcomes (useful for exercising failover and retry paths deterministically).

mod private
{
  use std::sync::Mutex;
  use std::time::Duration;

  use async_trait::async_trait;

  use gateway_core::adapter::{ AdapterError, ChatChoice, ChatCompletionResponse, ChatMessage, ChatParams, ProviderAdapter };
  use gateway_core::secret::Secret;

  /// Returns a single-choice completion echoing the last user message.
  /// Reports zero token usage; callers that need usage-driven rate-limit or
  /// credit behaviour in tests should prefer [`ScriptedAdapter`].
  #[ derive( Debug, Default ) ]
  pub struct EchoAdapter;

  #[ async_trait ]
  impl ProviderAdapter for EchoAdapter
  {
    async fn chat_completion(
      &self,
      messages : &[ ChatMessage ],
      model_id : &str,
      _credential : Option< &Secret >,
      _params : &ChatParams,
    ) -> core::result::Result< ( ChatCompletionResponse, Duration ), AdapterError >
    {
      let content = messages.last().map( | m | m.content.clone() ).unwrap_or_default();
      let response = ChatCompletionResponse
      {
        id : "echo".to_string(),
        object : "chat.completion".to_string(),
        created : 0,
        model : model_id.to_string(),
        choices : vec![ ChatChoice { index : 0, message : ChatMessage { role : "assistant".to_string(), content }, finish_reason : Some( "stop".to_string() ) } ],
        usage : None,
      };
      Ok( ( response, Duration::from_millis( 1 ) ) )
    }
  }

  /// One step of a [`ScriptedAdapter`]'s script.
  #[ derive( Debug, Clone ) ]
  pub enum ScriptedOutcome
  {
    /// Succeed, echoing the given content.
    Success( String ),
    /// Fail with a provider-reported validation error.
    Invalid( String ),
    /// Fail with a transport error.
    Fail( String ),
  }

  /// Replays a fixed sequence of outcomes, one per call; the last entry
  /// repeats once the script runs out. Used to drive retry, failover, and
  /// circuit-breaker scenarios in tests without a real upstream.
  #[ derive( Debug ) ]
  pub struct ScriptedAdapter
  {
    script : Vec< ScriptedOutcome >,
    cursor : Mutex< usize >,
  }

  impl ScriptedAdapter
  {
    /// Build an adapter that plays back `script` in order.
    ///
    /// # Panics
    /// Panics if `script` is empty; a scripted adapter with nothing to play
    /// back is a test-authoring mistake, not a runtime condition.
    #[ must_use ]
    pub fn new( script : Vec< ScriptedOutcome > ) -> Self
    {
      assert!( !script.is_empty(), "scripted adapter requires at least one outcome" );
      Self { script, cursor : Mutex::new( 0 ) }
    }
  }

  #[ async_trait ]
  impl ProviderAdapter for ScriptedAdapter
  {
    async fn chat_completion(
      &self,
      _messages : &[ ChatMessage ],
      model_id : &str,
      _credential : Option< &Secret >,
      _params : &ChatParams,
    ) -> core::result::Result< ( ChatCompletionResponse, Duration ), AdapterError >
    {
      let outcome =
      {
        let mut cursor = self.cursor.lock().expect( "scripted adapter cursor mutex poisoned" );
        let index = ( *cursor ).min( self.script.len() - 1 );
        *cursor += 1;
        self.script[ index ].clone()
      };

      match outcome
      {
        ScriptedOutcome::Success( content ) =>
        {
          let response = ChatCompletionResponse
          {
            id : "scripted".to_string(),
            object : "chat.completion".to_string(),
            created : 0,
            model : model_id.to_string(),
            choices : vec![ ChatChoice { index : 0, message : ChatMessage { role : "assistant".to_string(), content }, finish_reason : Some( "stop".to_string() ) } ],
            usage : None,
          };
          Ok( ( response, Duration::from_millis( 1 ) ) )
        },
        ScriptedOutcome::Invalid( message ) => Err( AdapterError::Validation( vec![ gateway_core::error::ValidationIssue
        {
          field : "messages".to_string(),
          message,
          code : "SCRIPTED_INVALID".to_string(),
        } ] ) ),
        ScriptedOutcome::Fail( message ) => Err( AdapterError::Transport( message ) ),
      }
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ tokio::test ]
    async fn echo_adapter_returns_last_message_content()
    {
      let adapter = EchoAdapter;
      let messages = vec![ ChatMessage { role : "user".to_string(), content : "hello".to_string() } ];
      let ( response, _ttft ) = adapter.chat_completion( &messages, "m1", None, &ChatParams::default() ).await.unwrap();
      assert_eq!( response.choices[ 0 ].message.content, "hello" );
    }

    #[ tokio::test ]
    async fn scripted_adapter_plays_back_in_order_then_repeats_last()
    {
      let adapter = ScriptedAdapter::new( vec![
        ScriptedOutcome::Fail( "first down".to_string() ),
        ScriptedOutcome::Success( "recovered".to_string() ),
      ] );

      let messages = vec![ ChatMessage { role : "user".to_string(), content : "hi".to_string() } ];
      let params = ChatParams::default();

      let first = adapter.chat_completion( &messages, "m1", None, &params ).await;
      assert!( matches!( first, Err( AdapterError::Transport( _ ) ) ) );

      let second = adapter.chat_completion( &messages, "m1", None, &params ).await;
      assert!( second.is_ok() );

      let third = adapter.chat_completion( &messages, "m1", None, &params ).await;
      assert!( third.is_ok() );
    }
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::EchoAdapter;
  exposed use private::ScriptedOutcome;
  exposed use private::ScriptedAdapter;
}

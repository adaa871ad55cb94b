// src/adapter.rs
//! Canonical chat-completion wire types and the `ProviderAdapter` contract
//! every upstream binding must satisfy.

mod private
{
  use std::time::Duration;
  use serde::{ Deserialize, Serialize };

  use crate::error::ValidationIssue;
  use crate::secret::Secret;

  /// One message in a chat-completion conversation.
  #[ derive( Debug, Clone, Serialize, Deserialize ) ]
  pub struct ChatMessage
  {
    /// `"system" | "user" | "assistant" | "tool"`.
    pub role : String,
    /// Message text.
    pub content : String,
  }

  /// Client-tunable generation parameters, passed through to the adapter
  /// unmodified.
  #[ derive( Debug, Clone, Default, Serialize, Deserialize ) ]
  pub struct ChatParams
  {
    /// Sampling temperature.
    #[ serde( default, skip_serializing_if = "Option::is_none" ) ]
    pub temperature : Option< f32 >,
    /// Nucleus-sampling probability mass.
    #[ serde( default, skip_serializing_if = "Option::is_none" ) ]
    pub top_p : Option< f32 >,
    /// Legacy token ceiling.
    #[ serde( default, skip_serializing_if = "Option::is_none" ) ]
    pub max_tokens : Option< u32 >,
    /// Token ceiling that supersedes `max_tokens` when both are set.
    #[ serde( default, skip_serializing_if = "Option::is_none" ) ]
    pub max_completion_tokens : Option< u32 >,
    /// One or more stop sequences.
    #[ serde( default, skip_serializing_if = "Option::is_none" ) ]
    pub stop : Option< StopSequences >,
    /// Whether the client asked for a streamed response.
    #[ serde( default ) ]
    pub stream : bool,
  }

  impl ChatParams
  {
    /// The effective token ceiling: `max_completion_tokens` takes
    /// precedence over `max_tokens` when both are present.
    #[ must_use ]
    pub fn effective_max_tokens( &self ) -> Option< u32 >
    {
      self.max_completion_tokens.or( self.max_tokens )
    }
  }

  /// `stop` accepts either a single string or a list, per the client body
  /// shape in spec.md §6.1.
  #[ derive( Debug, Clone, Serialize, Deserialize ) ]
  #[ serde( untagged ) ]
  pub enum StopSequences
  {
    /// A single stop sequence.
    Single( String ),
    /// Multiple stop sequences.
    Many( Vec< String > ),
  }

  /// One returned completion choice.
  #[ derive( Debug, Clone, Serialize, Deserialize ) ]
  pub struct ChatChoice
  {
    /// Index of this choice within `choices`.
    pub index : u32,
    /// The generated message.
    pub message : ChatMessage,
    /// Why generation stopped, if known.
    #[ serde( default, skip_serializing_if = "Option::is_none" ) ]
    pub finish_reason : Option< String >,
  }

  /// Token-usage accounting for one completion.
  #[ derive( Debug, Clone, Copy, Default, Serialize, Deserialize ) ]
  pub struct ChatUsage
  {
    /// Input/prompt tokens.
    #[ serde( default ) ]
    pub prompt_tokens : u64,
    /// Output/completion tokens.
    #[ serde( default ) ]
    pub completion_tokens : u64,
    /// `prompt_tokens + completion_tokens`, as reported by the upstream
    /// (not re-derived, since some providers round differently).
    #[ serde( default ) ]
    pub total_tokens : u64,
  }

  /// Canonical chat-completion response returned to the client, matching
  /// the OpenAI wire shape named in spec.md §6.1.
  #[ derive( Debug, Clone, Serialize, Deserialize ) ]
  pub struct ChatCompletionResponse
  {
    /// Unique identifier for this completion.
    pub id : String,
    /// Always `"chat.completion"`.
    pub object : String,
    /// Unix timestamp of creation.
    pub created : i64,
    /// Provider-native model identifier actually used.
    pub model : String,
    /// Completion choices; adapters must populate at least one.
    pub choices : Vec< ChatChoice >,
    /// Token usage, when the upstream reports it.
    #[ serde( default, skip_serializing_if = "Option::is_none" ) ]
    pub usage : Option< ChatUsage >,
  }

  /// Everything the dispatcher extracts from a successful adapter call
  /// besides the wire response itself.
  #[ derive( Debug, Clone, Copy, Default ) ]
  pub struct ResponseMetrics
  {
    /// Input tokens consumed, for rate-limit and metrics accounting.
    pub in_tokens : u64,
    /// Output tokens produced.
    pub out_tokens : u64,
    /// Time to first token, if the adapter can report it; zero otherwise.
    pub ttft : Duration,
  }

  impl ChatCompletionResponse
  {
    /// Derive `ResponseMetrics` from the response's own usage block
    /// (missing fields are tolerated as zero, per spec.md §6.2) and an
    /// adapter-supplied TTFT.
    #[ must_use ]
    pub fn response_metrics( &self, ttft : Duration ) -> ResponseMetrics
    {
      let usage = self.usage.unwrap_or_default();
      ResponseMetrics { in_tokens : usage.prompt_tokens, out_tokens : usage.completion_tokens, ttft }
    }
  }

  /// The two distinguishable failure kinds a `ProviderAdapter` may report.
  /// `Validation` is request-shaped and must not be retried on the same
  /// adapter; `Transport` covers everything else and is retryable.
  #[ derive( Debug, Clone, thiserror::Error ) ]
  pub enum AdapterError
  {
    /// The request was rejected as malformed for this adapter's wire format.
    #[ error( "request rejected: {0:?}" ) ]
    Validation( Vec< ValidationIssue > ),
    /// Network failure, timeout, or non-2xx upstream response.
    #[ error( "transport failure: {0}" ) ]
    Transport( String ),
  }

  /// Contract every upstream binding must satisfy. Implementations live in
  /// a separate crate; `gateway_core` depends only on this trait, never on
  /// a concrete adapter (spec.md §1).
  #[ async_trait::async_trait ]
  pub trait ProviderAdapter : core::fmt::Debug + Send + Sync
  {
    /// Perform one chat-completion call: validate, translate to native
    /// format, make exactly one upstream call, translate the response back.
    async fn chat_completion(
      &self,
      messages : &[ ChatMessage ],
      model_id : &str,
      credential : Option< &Secret >,
      params : &ChatParams,
    ) -> core::result::Result< ( ChatCompletionResponse, Duration ), AdapterError >;
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ test ]
    fn max_completion_tokens_takes_precedence()
    {
      let params = ChatParams { max_tokens : Some( 100 ), max_completion_tokens : Some( 50 ), ..Default::default() };
      assert_eq!( params.effective_max_tokens(), Some( 50 ) );

      let params = ChatParams { max_tokens : Some( 100 ), max_completion_tokens : None, ..Default::default() };
      assert_eq!( params.effective_max_tokens(), Some( 100 ) );
    }

    #[ test ]
    fn missing_usage_is_tolerated_as_zero()
    {
      let response = ChatCompletionResponse
      {
        id : "x".to_string(),
        object : "chat.completion".to_string(),
        created : 0,
        model : "m".to_string(),
        choices : vec![],
        usage : None,
      };
      let metrics = response.response_metrics( Duration::from_millis( 10 ) );
      assert_eq!( metrics.in_tokens, 0 );
      assert_eq!( metrics.out_tokens, 0 );
    }
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::ChatMessage;
  exposed use private::ChatParams;
  exposed use private::StopSequences;
  exposed use private::ChatChoice;
  exposed use private::ChatUsage;
  exposed use private::ChatCompletionResponse;
  exposed use private::ResponseMetrics;
  exposed use private::AdapterError;
  exposed use private::ProviderAdapter;
}

// src/openai_http.rs
//! Adapter for providers that speak the OpenAI chat-completions wire format
//! verbatim: the request body is passed straight through and the response
//! body is parsed directly into the canonical response type.

mod private
{
  use std::time::{ Duration, Instant };

  use async_trait::async_trait;
  use serde::Serialize;

  use gateway_core::adapter::{ AdapterError, ChatCompletionResponse, ChatMessage, ChatParams, ProviderAdapter };
  use gateway_core::config::ProviderConfig;
  use gateway_core::error::{ GatewayError, Result };
  use gateway_core::secret::Secret;

  const DEFAULT_BASE_URL : &str = "https://api.openai.com/v1";
  const DEFAULT_TIMEOUT_SECS : f64 = 60.0;

  #[ derive( Debug, Serialize ) ]
  struct ChatCompletionRequest< 'a >
  {
    model : &'a str,
    messages : &'a [ ChatMessage ],
    #[ serde( skip_serializing_if = "Option::is_none" ) ]
    temperature : Option< f32 >,
    #[ serde( skip_serializing_if = "Option::is_none" ) ]
    top_p : Option< f32 >,
    #[ serde( skip_serializing_if = "Option::is_none" ) ]
    max_completion_tokens : Option< u32 >,
    #[ serde( skip_serializing_if = "Option::is_none" ) ]
    stop : Option< &'a gateway_core::adapter::StopSequences >,
    stream : bool,
  }

  impl< 'a > ChatCompletionRequest< 'a >
  {
    fn new( model : &'a str, messages : &'a [ ChatMessage ], params : &'a ChatParams ) -> Self
    {
      Self
      {
        model,
        messages,
        temperature : params.temperature,
        top_p : params.top_p,
        max_completion_tokens : params.effective_max_tokens(),
        stop : params.stop.as_ref(),
        stream : false,
      }
    }
  }

  /// Speaks the OpenAI chat-completions wire format over HTTP. Any other
  /// upstream that mirrors this shape (most do) can reuse this adapter by
  /// pointing `base_url` at its own endpoint.
  #[ derive( Debug ) ]
  pub struct OpenAiHttpAdapter
  {
    http : reqwest::Client,
    base_url : String,
  }

  impl OpenAiHttpAdapter
  {
    /// Build an adapter from a provider's configuration entry: `base_url`
    /// defaults to the public OpenAI endpoint, `timeout` to 60 seconds.
    pub fn from_config( config : &ProviderConfig ) -> Result< Self >
    {
      let timeout_secs = config.timeout.unwrap_or( DEFAULT_TIMEOUT_SECS );
      let http = reqwest::Client::builder()
        .timeout( Duration::from_secs_f64( timeout_secs ) )
        .build()
        .map_err( | e | GatewayError::Config( format!( "failed to build http client: {e}" ) ) )?;
      let base_url = config.base_url.clone().unwrap_or_else( || DEFAULT_BASE_URL.to_string() );
      Ok( Self { http, base_url } )
    }
  }

  #[ async_trait ]
  impl ProviderAdapter for OpenAiHttpAdapter
  {
    async fn chat_completion(
      &self,
      messages : &[ ChatMessage ],
      model_id : &str,
      credential : Option< &Secret >,
      params : &ChatParams,
    ) -> core::result::Result< ( ChatCompletionResponse, Duration ), AdapterError >
    {
      let body = ChatCompletionRequest::new( model_id, messages, params );
      let url = format!( "{}/chat/completions", self.base_url.trim_end_matches( '/' ) );

      let mut request = self.http.post( &url ).json( &body );
      if let Some( secret ) = credential
      {
        request = request.bearer_auth( secret.expose() );
      }

      let start = Instant::now();
      let response = request.send().await.map_err( | e | AdapterError::Transport( e.to_string() ) )?;
      let ttft = start.elapsed();

      let status = response.status();
      let bytes = response.bytes().await.map_err( | e | AdapterError::Transport( e.to_string() ) )?;

      if !status.is_success()
      {
        let text = String::from_utf8_lossy( &bytes );
        return Err( AdapterError::Transport( format!( "upstream returned {status}: {text}" ) ) );
      }

      let parsed : ChatCompletionResponse = serde_json::from_slice( &bytes )
        .map_err( | e | AdapterError::Transport( format!( "malformed upstream response: {e}" ) ) )?;

      Ok( ( parsed, ttft ) )
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ test ]
    fn defaults_base_url_and_timeout_when_unset()
    {
      let config = ProviderConfig { kind : "openai".to_string(), ..Default::default() };
      let adapter = OpenAiHttpAdapter::from_config( &config ).unwrap();
      assert_eq!( adapter.base_url, DEFAULT_BASE_URL );
    }

    #[ test ]
    fn honors_configured_base_url()
    {
      let config = ProviderConfig { kind : "openai".to_string(), base_url : Some( "https://my-proxy.example/v1".to_string() ), ..Default::default() };
      let adapter = OpenAiHttpAdapter::from_config( &config ).unwrap();
      assert_eq!( adapter.base_url, "https://my-proxy.example/v1" );
    }

    #[ test ]
    fn request_body_prefers_max_completion_tokens()
    {
      let messages = vec![ ChatMessage { role : "user".to_string(), content : "hi".to_string() } ];
      let params = ChatParams { max_tokens : Some( 10 ), max_completion_tokens : Some( 20 ), ..Default::default() };
      let body = ChatCompletionRequest::new( "gpt-4", &messages, &params );
      let json = serde_json::to_value( &body ).unwrap();
      assert_eq!( json[ "max_completion_tokens" ], 20 );
      assert!( json.get( "max_tokens" ).is_none() );
    }
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::OpenAiHttpAdapter;
}

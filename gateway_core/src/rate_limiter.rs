// src/rate_limiter.rs
//! Per-credential usage accounting over calendar windows.
//!
//! A `RateLimitTracker` owns one mapping `limit_key -> limit_value` per
//! credential, where `limit_key` names a `(kind, period)` pair such as
//! "requests_per_minute" or "credits_per_day". Every period rolls over
//! independently at its own calendar boundary; old samples are discarded on
//! rollover rather than carried forward, so this is strictly a calendar
//! accounting structure, not a sliding window.

mod private
{
  use std::collections::{ HashMap, HashSet };
  use core::time::Duration;
  use chrono::{ DateTime, Datelike, TimeZone, Timelike, Utc };
  use serde::{ Deserialize, Serialize };

  /// Calendar granularity a limit or credit-balance grant is measured over.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize ) ]
  pub enum Period
  {
    /// Resets at `ss == 00` of the next minute.
    Minute,
    /// Resets at `mm:ss == 00:00` of the next hour.
    Hour,
    /// Resets at `00:00:00` UTC of the next day.
    Day,
    /// Resets at `00:00:00` UTC on the first of the next month.
    Month,
  }

  impl Period
  {
    /// Compute the next UTC calendar boundary strictly after `now`.
    #[ must_use ]
    pub fn next_boundary( self, now : DateTime< Utc > ) -> DateTime< Utc >
    {
      match self
      {
        Period::Minute =>
        {
          let truncated = now.date_naive().and_hms_opt( now.hour(), now.minute(), 0 ).unwrap();
          Utc.from_utc_datetime( &truncated ) + chrono::Duration::minutes( 1 )
        },
        Period::Hour =>
        {
          let truncated = now.date_naive().and_hms_opt( now.hour(), 0, 0 ).unwrap();
          Utc.from_utc_datetime( &truncated ) + chrono::Duration::hours( 1 )
        },
        Period::Day =>
        {
          let truncated = now.date_naive().and_hms_opt( 0, 0, 0 ).unwrap();
          Utc.from_utc_datetime( &truncated ) + chrono::Duration::days( 1 )
        },
        Period::Month =>
        {
          let ( year, month ) = if now.month() == 12 { ( now.year() + 1, 1 ) } else { ( now.year(), now.month() + 1 ) };
          Utc.with_ymd_and_hms( year, month, 1, 0, 0, 0 ).single().expect( "valid first-of-month timestamp" )
        },
      }
    }

    /// Parse the `_per_{minute,hour,day,month}` suffix of a configuration key.
    #[ must_use ]
    pub fn parse_suffix( s : &str ) -> Option< Self >
    {
      match s
      {
        "minute" => Some( Period::Minute ),
        "hour" => Some( Period::Hour ),
        "day" => Some( Period::Day ),
        "month" => Some( Period::Month ),
        _ => None,
      }
    }
  }

  /// What is being counted against a limit.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize ) ]
  pub enum LimitKind
  {
    /// Counted request increments (after `request_multiplier`).
    Requests,
    /// Counted total tokens (input + output, after `token_multiplier`).
    Tokens,
    /// Counted input tokens.
    InTokens,
    /// Counted output tokens.
    OutTokens,
    /// Counted credits.
    Credits,
  }

  impl LimitKind
  {
    #[ must_use ]
    fn parse_prefix( s : &str ) -> Option< Self >
    {
      match s
      {
        "requests" => Some( LimitKind::Requests ),
        "tokens" => Some( LimitKind::Tokens ),
        "in_tokens" => Some( LimitKind::InTokens ),
        "out_tokens" => Some( LimitKind::OutTokens ),
        "credits" => Some( LimitKind::Credits ),
        _ => None,
      }
    }
  }

  /// Identifies one configured limit: `{requests|tokens|in_tokens|out_tokens|credits}_per_{minute|hour|day|month}`.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize ) ]
  pub struct LimitKey
  {
    /// What is being counted.
    pub kind : LimitKind,
    /// Over which calendar window.
    pub period : Period,
  }

  impl LimitKey
  {
    /// Construct a limit key directly.
    #[ must_use ]
    #[ inline ]
    pub fn new( kind : LimitKind, period : Period ) -> Self
    {
      Self { kind, period }
    }

    /// Parse a configuration key such as `"requests_per_minute"`.
    ///
    /// Returns `None` if the key does not match `<kind>_per_<period>`.
    #[ must_use ]
    pub fn parse( s : &str ) -> Option< Self >
    {
      let ( kind_str, period_str ) = s.split_once( "_per_" )?;
      let kind = LimitKind::parse_prefix( kind_str )?;
      let period = Period::parse_suffix( period_str )?;
      Some( Self { kind, period } )
    }
  }

  #[ derive( Debug, Clone, Copy, Default ) ]
  struct PeriodAccumulator
  {
    requests : f64,
    tokens : f64,
    in_tokens : f64,
    out_tokens : f64,
    credits : f64,
  }

  impl PeriodAccumulator
  {
    fn get( self, kind : LimitKind ) -> f64
    {
      match kind
      {
        LimitKind::Requests => self.requests,
        LimitKind::Tokens => self.tokens,
        LimitKind::InTokens => self.in_tokens,
        LimitKind::OutTokens => self.out_tokens,
        LimitKind::Credits => self.credits,
      }
    }
  }

  #[ derive( Debug, Clone ) ]
  struct PeriodState
  {
    accum : PeriodAccumulator,
    next_reset : DateTime< Utc >,
    /// Present only when a credit-balance grant is configured for this period.
    balance : Option< f64 >,
  }

  /// Composable per-unit credit-cost rates. The first non-zero rate in each
  /// category (token-based, then request-based) applies; see `cost`.
  #[ derive( Debug, Clone, Copy, Default, Serialize, Deserialize ) ]
  pub struct CreditRates
  {
    /// Flat cost per counted token (input + output combined).
    #[ serde( default ) ]
    pub per_token : f64,
    /// Cost per million counted tokens (input + output combined).
    #[ serde( default ) ]
    pub per_million_tokens : f64,
    /// Cost per counted input token.
    #[ serde( default ) ]
    pub per_in_token : f64,
    /// Cost per counted output token.
    #[ serde( default ) ]
    pub per_out_token : f64,
    /// Cost per million counted input tokens.
    #[ serde( default ) ]
    pub per_million_in_tokens : f64,
    /// Cost per million counted output tokens.
    #[ serde( default ) ]
    pub per_million_out_tokens : f64,
    /// Flat cost added once per request, independent of token usage.
    #[ serde( default ) ]
    pub per_request : f64,
  }

  impl CreditRates
  {
    /// Compose the token-based portion of the cost from the most specific
    /// configured rate. Precedence (first non-zero wins): per-direction
    /// per-token, per-direction per-million, blanket per-token, blanket
    /// per-million. The flat `per_request` cost is always added on top.
    #[ must_use ]
    pub fn cost( &self, counted_in : f64, counted_out : f64 ) -> f64
    {
      let token_cost = if self.per_in_token != 0.0 || self.per_out_token != 0.0
      {
        counted_in * self.per_in_token + counted_out * self.per_out_token
      }
      else if self.per_million_in_tokens != 0.0 || self.per_million_out_tokens != 0.0
      {
        ( counted_in / 1_000_000.0 ) * self.per_million_in_tokens + ( counted_out / 1_000_000.0 ) * self.per_million_out_tokens
      }
      else if self.per_token != 0.0
      {
        ( counted_in + counted_out ) * self.per_token
      }
      else if self.per_million_tokens != 0.0
      {
        ( ( counted_in + counted_out ) / 1_000_000.0 ) * self.per_million_tokens
      }
      else
      {
        0.0
      };

      token_cost + self.per_request
    }
  }

  /// A credit-balance grant for one calendar period: replenishes to `max`
  /// (falling back to `gain` when `max` is unset) at each rollover.
  #[ derive( Debug, Clone, Copy, Serialize, Deserialize ) ]
  pub struct CreditGrant
  {
    /// Amount credited at each rollover when `max` is not separately configured.
    pub gain : f64,
    /// Ceiling the balance replenishes to; defaults to `gain` if absent.
    #[ serde( default ) ]
    pub max : Option< f64 >,
  }

  impl CreditGrant
  {
    #[ must_use ]
    fn effective_max( self ) -> f64
    {
      self.max.unwrap_or( self.gain )
    }
  }

  /// Reported token usage for a single `record` call. Adapters that only
  /// expose an aggregate `total_tokens` figure use `Total`; the in/out split
  /// is then stored as zero, per spec's token-count fallback rule.
  #[ derive( Debug, Clone, Copy ) ]
  pub enum TokenUsage
  {
    /// Separate input/output token counts.
    Split
    {
      /// Input (prompt) tokens.
      in_tokens : u64,
      /// Output (completion) tokens.
      out_tokens : u64,
    },
    /// A single aggregate token count with no input/output breakdown.
    Total( u64 ),
  }

  /// Static configuration for a `RateLimitTracker`: the limits it enforces,
  /// the multipliers applied at record time, and the optional credit model.
  #[ derive( Debug, Clone, Default ) ]
  pub struct RateLimitConfig
  {
    /// Configured bound per limit key.
    pub limits : HashMap< LimitKey, f64 >,
    /// Multiplier applied to counted token usage before storage.
    pub token_multiplier : f64,
    /// Multiplier applied to the counted request increment before storage.
    pub request_multiplier : f64,
    /// Credit-cost composition rates.
    pub credit_rates : CreditRates,
    /// Optional credit-balance grant per period.
    pub credit_balance : HashMap< Period, CreditGrant >,
  }

  impl RateLimitConfig
  {
    /// A configuration with no limits, no credit model, and multipliers of 1.0.
    #[ must_use ]
    pub fn unbounded() -> Self
    {
      Self
      {
        limits : HashMap::new(),
        token_multiplier : 1.0,
        request_multiplier : 1.0,
        credit_rates : CreditRates::default(),
        credit_balance : HashMap::new(),
      }
    }
  }

  /// Per-credential usage accounting over calendar windows.
  ///
  /// See module docs for the rollover rule. `RateLimitTracker` is not
  /// internally synchronized — callers (`CredentialPool`) hold it behind
  /// their own mutex, per spec.md §5.
  #[ derive( Debug ) ]
  pub struct RateLimitTracker
  {
    config : RateLimitConfig,
    periods : HashMap< Period, PeriodState >,
  }

  impl RateLimitTracker
  {
    /// Build a tracker from static configuration.
    #[ must_use ]
    pub fn new( config : RateLimitConfig ) -> Self
    {
      Self { config, periods : HashMap::new() }
    }

    fn active_periods( &self ) -> HashSet< Period >
    {
      let mut set : HashSet< Period > = self.config.limits.keys().map( | k | k.period ).collect();
      set.extend( self.config.credit_balance.keys().copied() );
      set
    }

    /// Lazily initialize the period's accumulator and roll it over if its
    /// calendar boundary has already passed.
    fn ensure_period( &mut self, period : Period, now : DateTime< Utc > ) -> &mut PeriodState
    {
      let grant = self.config.credit_balance.get( &period ).copied();

      let state = self.periods.entry( period ).or_insert_with( ||
      {
        PeriodState
        {
          accum : PeriodAccumulator::default(),
          next_reset : period.next_boundary( now ),
          balance : grant.map( CreditGrant::effective_max ),
        }
      } );

      if now >= state.next_reset
      {
        state.accum = PeriodAccumulator::default();
        state.next_reset = period.next_boundary( now );
        if let Some( g ) = grant
        {
          state.balance = Some( g.effective_max() );
        }
      }

      state
    }

    /// Record one request's usage against every configured period.
    ///
    /// Applies `token_multiplier`/`request_multiplier` once, before storage.
    /// Returns the credits charged for this call (composed from
    /// `credit_rates`, or `credits_param` verbatim when the caller supplies a
    /// pre-computed value) so the caller can decide whether to also
    /// [`RateLimitTracker::spend`] it against the balance model.
    pub fn record( &mut self, usage : TokenUsage, credits_param : Option< f64 > ) -> f64
    {
      let now = Utc::now();

      let ( raw_in, raw_out, raw_total ) = match usage
      {
        TokenUsage::Split { in_tokens, out_tokens } => ( in_tokens as f64, out_tokens as f64, ( in_tokens + out_tokens ) as f64 ),
        TokenUsage::Total( total ) => ( 0.0, 0.0, total as f64 ),
      };

      let counted_in = raw_in * self.config.token_multiplier;
      let counted_out = raw_out * self.config.token_multiplier;
      let counted_total = raw_total * self.config.token_multiplier;
      let counted_requests = self.config.request_multiplier;

      let credits = credits_param.unwrap_or_else( || self.config.credit_rates.cost( counted_in, counted_out ) );

      let periods : Vec< Period > = self.active_periods().into_iter().collect();
      for period in periods
      {
        let state = self.ensure_period( period, now );
        state.accum.requests += counted_requests;
        state.accum.tokens += counted_total;
        state.accum.in_tokens += counted_in;
        state.accum.out_tokens += counted_out;
        state.accum.credits += credits;
      }

      credits
    }

    /// `true` iff any configured limit's accumulator has reached its bound.
    pub fn is_limited( &mut self ) -> bool
    {
      let now = Utc::now();
      let limits : Vec< ( LimitKey, f64 ) > = self.config.limits.iter().map( | ( k, v ) | ( *k, *v ) ).collect();
      for ( key, bound ) in limits
      {
        let state = self.ensure_period( key.period, now );
        if state.accum.get( key.kind ) >= bound
        {
          return true;
        }
      }
      false
    }

    /// Snapshot `(used, limit)` for every configured limit key.
    pub fn usage_stats( &mut self ) -> Vec< ( LimitKey, f64, f64 ) >
    {
      let now = Utc::now();
      let limits : Vec< ( LimitKey, f64 ) > = self.config.limits.iter().map( | ( k, v ) | ( *k, *v ) ).collect();
      limits
        .into_iter()
        .map( | ( key, bound ) |
        {
          let state = self.ensure_period( key.period, now );
          ( key, state.accum.get( key.kind ), bound )
        } )
        .collect()
    }

    /// Minimum time until the soonest currently-exceeded limit's calendar
    /// boundary. `None` if nothing is currently rate limited.
    pub fn time_until_available( &mut self ) -> Option< Duration >
    {
      let now = Utc::now();
      let limits : Vec< ( LimitKey, f64 ) > = self.config.limits.iter().map( | ( k, v ) | ( *k, *v ) ).collect();
      let mut best : Option< Duration > = None;
      for ( key, bound ) in limits
      {
        let state = self.ensure_period( key.period, now );
        if state.accum.get( key.kind ) >= bound
        {
          let remaining = ( state.next_reset - now ).to_std().unwrap_or( Duration::ZERO );
          best = Some( best.map_or( remaining, | b | b.min( remaining ) ) );
        }
      }
      best
    }

    /// Force every configured credit-balance period to roll over and
    /// replenish to its ceiling if its boundary has passed. Implicitly
    /// invoked by `has_sufficient_credits` and `spend`; exposed for callers
    /// that want to pre-warm the state (e.g. at startup restore).
    pub fn update_balance( &mut self )
    {
      let now = Utc::now();
      let periods : Vec< Period > = self.config.credit_balance.keys().copied().collect();
      for period in periods
      {
        self.ensure_period( period, now );
      }
    }

    /// `true` iff, after rollover, every period with a configured grant has
    /// at least `required` credits remaining. `true` (vacuously) when no
    /// credit-balance model is configured at all.
    pub fn has_sufficient_credits( &mut self, required : f64 ) -> bool
    {
      self.update_balance();
      if self.config.credit_balance.is_empty()
      {
        return true;
      }
      self.config.credit_balance.keys().copied().all( | period |
      {
        self.periods.get( &period ).and_then( | s | s.balance ).is_some_and( | b | b >= required )
      } )
    }

    /// Subtract `amount` from every period's balance, floored at zero.
    pub fn spend( &mut self, amount : f64 )
    {
      if amount <= 0.0
      {
        return;
      }
      self.update_balance();
      for state in self.periods.values_mut()
      {
        if let Some( balance ) = state.balance
        {
          state.balance = Some( ( balance - amount ).max( 0.0 ) );
        }
      }
    }

    /// The flat per-request credit rate this tracker was configured with,
    /// used to estimate a request's cost before it is made (so selection
    /// can reject a key whose balance cannot cover it).
    #[ must_use ]
    pub fn configured_request_credit_rate( &self ) -> f64
    {
      self.config.credit_rates.per_request
    }

    /// Current balance for a period, if a grant is configured for it.
    #[ must_use ]
    pub fn balance( &self, period : Period ) -> Option< f64 >
    {
      self.periods.get( &period ).and_then( | s | s.balance )
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ test ]
    fn parses_limit_keys()
    {
      let key = LimitKey::parse( "requests_per_minute" ).unwrap();
      assert_eq!( key.kind, LimitKind::Requests );
      assert_eq!( key.period, Period::Minute );

      let key = LimitKey::parse( "credits_per_month" ).unwrap();
      assert_eq!( key.kind, LimitKind::Credits );
      assert_eq!( key.period, Period::Month );

      assert!( LimitKey::parse( "bogus" ).is_none() );
    }

    #[ test ]
    fn records_and_limits_requests_per_minute()
    {
      let mut limits = HashMap::new();
      limits.insert( LimitKey::new( LimitKind::Requests, Period::Minute ), 1.0 );
      let mut config = RateLimitConfig::unbounded();
      config.limits = limits;
      let mut tracker = RateLimitTracker::new( config );

      assert!( !tracker.is_limited() );
      tracker.record( TokenUsage::Split { in_tokens : 10, out_tokens : 5 }, None );
      assert!( tracker.is_limited() );
    }

    #[ test ]
    fn token_multiplier_applies_once()
    {
      let mut limits = HashMap::new();
      limits.insert( LimitKey::new( LimitKind::Tokens, Period::Hour ), 100.0 );
      let mut config = RateLimitConfig::unbounded();
      config.limits = limits;
      config.token_multiplier = 2.0;
      let mut tracker = RateLimitTracker::new( config );

      tracker.record( TokenUsage::Split { in_tokens : 10, out_tokens : 10 }, None );
      let stats = tracker.usage_stats();
      let ( _, used, _ ) = stats.iter().find( | ( k, _, _ ) | k.kind == LimitKind::Tokens ).unwrap();
      assert!( ( *used - 40.0 ).abs() < f64::EPSILON );
    }

    #[ test ]
    fn total_tokens_fallback_zeroes_split()
    {
      let mut limits = HashMap::new();
      limits.insert( LimitKey::new( LimitKind::InTokens, Period::Day ), 1000.0 );
      limits.insert( LimitKey::new( LimitKind::Tokens, Period::Day ), 1000.0 );
      let mut config = RateLimitConfig::unbounded();
      config.limits = limits;
      let mut tracker = RateLimitTracker::new( config );

      tracker.record( TokenUsage::Total( 50 ), None );
      let stats = tracker.usage_stats();
      let in_used = stats.iter().find( | ( k, _, _ ) | k.kind == LimitKind::InTokens ).unwrap().1;
      let total_used = stats.iter().find( | ( k, _, _ ) | k.kind == LimitKind::Tokens ).unwrap().1;
      assert!( ( in_used - 0.0 ).abs() < f64::EPSILON );
      assert!( ( total_used - 50.0 ).abs() < f64::EPSILON );
    }

    #[ test ]
    fn credit_balance_replenishes_and_spends()
    {
      let mut config = RateLimitConfig::unbounded();
      config.credit_balance.insert( Period::Day, CreditGrant { gain : 10.0, max : None } );
      let mut tracker = RateLimitTracker::new( config );

      assert!( tracker.has_sufficient_credits( 3.0 ) );
      tracker.spend( 3.0 );
      assert_eq!( tracker.balance( Period::Day ), Some( 7.0 ) );
      tracker.spend( 3.0 );
      tracker.spend( 3.0 );
      assert_eq!( tracker.balance( Period::Day ), Some( 1.0 ) );
      assert!( !tracker.has_sufficient_credits( 3.0 ) );
      // Floored at zero, never negative.
      tracker.spend( 100.0 );
      assert_eq!( tracker.balance( Period::Day ), Some( 0.0 ) );
    }

    #[ test ]
    fn credit_rate_composition_prefers_most_specific()
    {
      let rates = CreditRates { per_in_token : 0.1, per_out_token : 0.2, per_token : 999.0, ..Default::default() };
      let cost = rates.cost( 10.0, 10.0 );
      assert!( ( cost - 3.0 ).abs() < f64::EPSILON );
    }

    #[ test ]
    fn not_yet_limited_has_no_time_until_available()
    {
      let mut limits = HashMap::new();
      limits.insert( LimitKey::new( LimitKind::Requests, Period::Minute ), 5.0 );
      let mut config = RateLimitConfig::unbounded();
      config.limits = limits;
      let mut tracker = RateLimitTracker::new( config );
      assert!( tracker.time_until_available().is_none() );
    }
  }

} // end mod private

crate ::mod_interface!
{
  exposed use private::Period;
  exposed use private::LimitKind;
  exposed use private::LimitKey;
  exposed use private::CreditRates;
  exposed use private::CreditGrant;
  exposed use private::TokenUsage;
  exposed use private::RateLimitConfig;
  exposed use private::RateLimitTracker;
}

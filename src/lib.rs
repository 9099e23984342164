//! Multi-provider LLM orchestration gateway.
//!
//! Wires together a provider abstraction over three wire families
//! ([`providers`]), a resilient fallback/health-tracked call path and
//! primary/fallback/smart-routing model manager ([`model_manager`]), a
//! tool registry/dispatcher with anti-spin guardrails ([`tools`]), and the
//! ReAct orchestration loop that ties them together ([`agent`]).

pub mod agent;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod model_manager;
pub mod providers;
pub mod tools;

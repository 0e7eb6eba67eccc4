//! Outbound text directives understood by the live feed server.

use std::fmt;

/// A subscription change for one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Subscribe(String),
    Unsubscribe(String),
}

impl Directive {
    /// Channel the directive applies to
    pub fn channel(&self) -> &str {
        match self {
            Directive::Subscribe(channel) | Directive::Unsubscribe(channel) => channel,
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Subscribe(channel) => write!(f, "subscribe {}", channel),
            Directive::Unsubscribe(channel) => write!(f, "unsubscribe {}", channel),
        }
    }
}

// Platform client — session login and hashtag search.
//
// Each submodule wraps one external capability: auth obtains sessions
// (headless-browser or direct credential login), client issues search
// queries against a session.

pub mod auth;
pub mod client;

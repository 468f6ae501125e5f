pub mod attendance;
pub mod authenticator;
pub mod bootstrap;

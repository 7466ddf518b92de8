//! SSH transport: argument-vector construction plus one-shot/streaming exec.

pub mod quoting;
pub mod transport;

pub use quoting::shell_quote;
pub use transport::{SshOutput, SshTransport};

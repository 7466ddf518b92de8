//! Command handlers, one module per subcommand group.

pub mod lieutenant;
pub mod swarm;

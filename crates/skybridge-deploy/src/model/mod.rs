//! Wire shapes exchanged with the remote collaborators

pub mod function;
pub mod gateway;
pub mod identity;

pub use function::*;
pub use gateway::*;
pub use identity::*;

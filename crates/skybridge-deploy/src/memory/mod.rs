//! In-memory collaborators
//!
//! Stand-ins for the cloud APIs and the builder, used by the test suites and
//! for local rehearsal runs. Every implementation records the calls it
//! receives and can be told to fail specific operations.

mod builder;
mod functions;
mod gateway;
mod identity;

pub use builder::PrebuiltBuilder;
pub use functions::{ApiCall, InMemoryFunctionApi, TEST_ACCOUNT_ID};
pub use gateway::InMemoryGatewayApi;
pub use identity::InMemoryIdentityPoolApi;

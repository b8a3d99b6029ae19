//! Skybridge deployment engine
//!
//! Converges each configured function through
//! `Unseen → {Creating | Updating} → VersionPublishing → AliasResolving → AliasBound`,
//! then wires the bound aliases into API gateways and identity pools.
//!
//! ## Collaborators
//!
//! The engine never talks to the cloud directly. It goes through
//! [`FunctionApi`], [`GatewayApi`], [`IdentityPoolApi`] and [`Builder`],
//! bundled as [`Collaborators`]. `skybridge-aws` implements the API traits
//! over the cloud SDKs; [`memory`] has in-memory versions of all four.
//!
//! ## Fault isolation
//!
//! Units are converged one after another. Any error stops that unit where it
//! is, is logged and recorded in the [`RunReport`], and the run continues.
//!
//! ## Dry run
//!
//! Remote state is fetched and the payload reconciled and validated, but no
//! state-changing call is made and no identifiers are recorded.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod api;
pub mod arn;
pub mod build;
pub mod convergence;
pub mod error;
pub mod integration;
pub mod memory;
pub mod model;
pub mod paths;
pub mod permission;
pub mod pipeline;
pub mod reconcile;
pub mod unit;

// Re-exports
pub use api::{fetch_remote, FunctionApi, GatewayApi, IdentityPoolApi, RemoteState};
pub use build::{plan_units, BuildRequest, BuildSession, BuildSettings, Builder, ContainerBuilder, DockerCli};
pub use convergence::{Convergence, Converger, SettlePolicy};
pub use error::{ApiError, ApiResult, BuildError, BuildResult, DeployError, Result};
pub use integration::{GatewayWiring, IdentityWiring, WiringSummary};
pub use permission::{statement_id, upsert_invoke_permission};
pub use pipeline::{Collaborators, Pipeline, RunReport, UnitOutcome, UnitReport};
pub use reconcile::{reconcile, Desired, DesiredFunction, CLEAR_SENTINEL};
pub use unit::{ConvergenceState, DeploymentUnit, UnitIdentifiers};

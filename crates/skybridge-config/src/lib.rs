//! Skybridge configuration
//!
//! Hierarchical configuration for function deployments, with lazy
//! resolution of reference expressions such as `${config:roles.lambda}` or
//! `${env:ROLE_ARN, 'arn:aws:iam::123456789012:role/default'}`.
//!
//! ## Lifecycle
//!
//! 1. [`load_tree`] reads the raw tree from a file plus `SKYBRIDGE_*`
//!    environment variables.
//! 2. [`ResolvedConfig::build`] resolves every reference once through a
//!    [`Resolver`] and its [`MemoCache`], then applies the [`RunSettings`].
//! 3. Everything downstream reads the immutable [`ResolvedConfig`].
//!
//! Resolution runs on a single control path. [`MemoCache`] is `!Sync` and
//! must not be shared across threads.
//!
//! ## Usage
//!
//! ```
//! use skybridge_config::{ResolvedConfig, RunSettings};
//!
//! let doc = r#"
//! roles: { lambda: "arn:aws:iam::123456789012:role/lambda" }
//! defaults: { role: "${config:roles.lambda}" }
//! serverless: { functions: { hello: { handler: main.handler } } }
//! "#;
//! let snapshot = ResolvedConfig::from_yaml(doc, &RunSettings::default()).unwrap();
//! let functions = snapshot.functions();
//! assert_eq!(
//!     functions["hello"].get_string("role"),
//!     "arn:aws:iam::123456789012:role/lambda"
//! );
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod cache;
pub mod error;
pub mod loader;
pub mod reference;
pub mod resolver;
pub mod snapshot;
pub mod tree;
pub mod value;

// Re-exports
pub use cache::{CacheKey, MemoCache};
pub use error::{ConfigError, Result};
pub use loader::{load_tree, CONFIG_BASENAME, ENV_PREFIX};
pub use reference::{is_reference, ReferenceExpression, ReferenceKind};
pub use resolver::{Resolver, MAP_NAMESPACE, VALUE_NAMESPACE};
pub use snapshot::{ResolvedConfig, RunSettings, DEFAULT_REGION, DEFAULT_STAGE, FUNCTIONS_PATH};
pub use tree::ConfigTree;
pub use value::ConfigValue;

//! Toolchain resolution and execution.
//!
//! A toolchain is a pipeline of independently packaged command-line tools,
//! each turning one typed artifact into another. Given a raw input and a
//! desired output type, this crate:
//!
//! - picks the input tool whose activation accepts the input ([`Resolver`])
//! - orders declared prerequisites and splices glue tools between
//!   type-incompatible neighbours
//! - negotiates one shared-dependency version for every packaged tool
//!   ([`negotiate`])
//! - installs each package into a locked on-disk cache ([`PackageCache`])
//! - runs the pipeline step by step ([`Executor`])
//!
//! # Example
//!
//! ```ignore
//! use pipewright_core::{Config, Registry, Target, Tool, Toolchain, NoopObserver};
//!
//! let registry = Registry::new()
//!     .with(Tool::new("A").consuming(["input"]).producing(["X"])
//!         .activated_by(Activation::in_process(|_| true)))
//!     .with(Tool::new("B").consuming(["X"]).producing(["Y"]));
//! let toolchain = Toolchain::new(Arc::new(registry), provider, &Config::default())?;
//! let output = toolchain.run(input, &Target::new("Y"), &NoopObserver).await?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod negotiate;
pub mod process;
pub mod provider;
pub mod registry;
pub mod resolver;
pub mod tool;
pub mod toolchain;
pub mod version;

pub use cache::{CacheEntry, PackageCache};
pub use config::Config;
pub use error::{Error, Result};
pub use executor::{ExecutionObserver, Executor, NoopObserver};
pub use negotiate::VersionNegotiator;
pub use provider::{MemoizedProvider, PackageProvider};
pub use registry::Registry;
pub use resolver::{Resolver, Target};
pub use tool::{Activation, Invocation, PlannedStep, ResolvedTool, Sequence, Tool, TransformContext};
pub use toolchain::Toolchain;

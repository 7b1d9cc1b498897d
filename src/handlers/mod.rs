//! Handler builders and associated traits.
//!
//! Provides a small builder API for constructing handlers in a type-safe
//! manner. Each builder implements [`HandlerBuilderTrait`], validating its
//! options before the handler and its worker threads are created.

use thiserror::Error;

use crate::handler::FemtoHandlerTrait;

pub mod ship_builder;

pub use ship_builder::ShipHandlerBuilder;

/// Errors that may occur while building a handler.
#[derive(Debug, Error)]
pub enum HandlerBuildError {
    /// Invalid user supplied configuration.
    #[error("invalid handler configuration: {0}")]
    InvalidConfig(String),
}

/// Trait implemented by all handler builders.
pub trait HandlerBuilderTrait: Send + Sync {
    type Handler: FemtoHandlerTrait + 'static;

    /// Build the concrete handler.
    fn build_inner(&self) -> Result<Self::Handler, HandlerBuildError>;

    /// Build the handler behind a trait object.
    fn build(&self) -> Result<Box<dyn FemtoHandlerTrait>, HandlerBuildError> {
        Ok(Box::new(self.build_inner()?))
    }
}

//! Directory provider collaborators.
//!
//! [`contract`] holds the traits the core consumes; [`HttpProvider`] is the
//! REST implementation and [`TemplateSuggester`] the built-in reply
//! suggestion service.

mod client;
pub mod contract;
pub mod error;
pub mod normalize;
mod suggest;
mod types;

pub use client::HttpProvider;
pub use contract::{
    DirectoryClient, ReplyAck, ReplySubmitter, ReplySuggester, ReviewBatch, ReviewSource,
};
pub use error::ProviderError;
pub use suggest::TemplateSuggester;

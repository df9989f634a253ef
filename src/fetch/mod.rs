//! Remote artifact fetching
//!
//! The download orchestrator talks to the remote archive through the
//! [`Fetcher`] trait. [`ArxivFetcher`] is the HTTP implementation.

mod arxiv;
mod traits;

pub use arxiv::ArxivFetcher;
pub use traits::Fetcher;

//! Resources and fetchers for quire.
//!
//! A [`Resource`] is a [`Readable`](quire_common::Readable) with a logical
//! [`Link`]. [`Fetcher`]s map links to resources from archives, exploded
//! directories, local files and HTTP, and compose with each other.

mod directory;
mod fetcher;
mod http;
mod resource;

pub use directory::DirectoryContainer;
pub use fetcher::{
    CompositeFetcher, ContainerFetcher, Fetcher, FileFetcher, HttpFetcher, RoutingFetcher,
    SingleResourceFetcher,
};
#[cfg(feature = "http")]
pub use http::ReqwestClient;
pub use http::{range_header, status_error, HttpClient, HttpMetadata, HttpResource};
pub use resource::{FailureResource, FallbackResource, Link, ReadableResource, Resource};

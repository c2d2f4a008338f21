pub mod client;
pub mod error;
pub mod propfind;
pub mod range;

pub use client::WebDavClient;
pub use error::WebDavError;
pub use propfind::RemoteEntry;
pub use range::{HttpRangeSink, HttpRangeSource};

//! Remote message source boundary and paged fetching.

pub mod clock;
pub mod fetcher;
pub mod source;

pub use clock::{Clock, SleepFuture, SystemClock};
pub use fetcher::{FetchSession, FetchState};
pub use source::{FetchQuery, RemoteFuture, RemoteSource};

//! Configuration structures for both cores.
//!
//! Each core is constructed from a dedicated config struct that carries every
//! tunable and validates itself before any state is built. Invalid
//! parameters surface as [`Error::InvalidArgument`](crate::Error) from the
//! constructor rather than panicking later.

pub mod cache;
pub mod rto;

pub use cache::CacheConfig;
pub use rto::RtoConfig;

// Core modules implementing request construction, response normalization,
// success classification, and error modeling. Everything here is pure and
// transport-free; the api layer owns all I/O.
pub mod command;
pub mod config;
pub mod error;
pub mod request;
pub mod response;
pub mod verdict;

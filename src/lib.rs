//! Simulated direct-access execution service for quantum primitive jobs.
//!
//! The entry point is [`service::DirectAccessService`], a local stand-in for
//! the real direct-access API: submitted jobs run on simulated backend
//! devices while keeping the API's job lifecycle, admission limits and
//! storage conventions intact.

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod joblog;
pub mod service;
pub mod storage;
pub mod store;

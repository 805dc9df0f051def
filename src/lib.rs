//! windowgate - fixed-window rate limiting for CV-Wiz request paths
//!
//! This crate implements an in-process, in-memory rate limiter. Each protected
//! operation (registration, login, feedback, generic API traffic) gets its own
//! namespace in a shared counter store; callers are identified from proxy
//! headers with a guard against injection-shaped values. Counters are not
//! shared between processes.

pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod ratelimit;
pub mod replay;

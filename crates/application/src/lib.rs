//! Attempt throttling service and ports.

#![forbid(unsafe_code)]

mod attempt_limit_service;

pub use attempt_limit_service::{
    AttemptDecision, AttemptLimitService, AttemptStore, ThrottlePolicy,
};

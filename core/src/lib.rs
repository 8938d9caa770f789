//! Shared domain for the Rehearse sales simulator: scenarios, transcripts, prompt
//! synthesis and feedback validation. Everything here is pure; I/O lives in `rehearse-api`.

pub mod auth;
pub mod error;
pub mod feedback;
pub mod prompts;
pub mod scenario;
pub mod session;
pub mod transcript;

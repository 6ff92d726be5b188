//! Integration tests for gula-ai
//!
//! These tests drive the stream dispatcher, session and tool gate together through a mock
//! transport.

#[path = "../common/mod.rs"]
pub mod common;

pub mod dispatcher_cancel;
pub mod session_flow;
pub mod sse_chunking;

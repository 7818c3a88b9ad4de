//! Device lifecycle core.
//!
//! Entry points the host dispatches through the descriptor's table:
//! lifecycle (create/expunge), session gate (open/close), and the dispatch
//! stubs (begin/abort). All of them thread the process-wide [`lifecycle::ModuleState`]
//! instead of globals.

pub mod dispatch;
pub mod instance;
pub mod lifecycle;
pub mod session;

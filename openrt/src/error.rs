//! Error kinds surfaced by compile, run and the plan codec.
//!
//! Everything propagates as `anyhow::Error`; the typed [`RtError`] rides inside
//! and is recovered with [`ret_code`] and [`failed_node`], also through
//! `context` layers.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetCode {
    InvalidGraph,
    InvalidValue,
    Unsupported,
    OutOfMemory,
    RuntimeError,
}

impl RetCode {
    pub fn as_str(self) -> &'static str {
        match self {
            RetCode::InvalidGraph => "RC_INVALID_GRAPH",
            RetCode::InvalidValue => "RC_INVALID_VALUE",
            RetCode::Unsupported => "RC_UNSUPPORTED",
            RetCode::OutOfMemory => "RC_OUT_OF_MEMORY",
            RetCode::RuntimeError => "RC_RUNTIME_ERROR",
        }
    }
}

impl fmt::Display for RetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}{}: {message}", node_suffix(.node))]
pub struct RtError {
    pub code: RetCode,
    pub node: Option<NodeId>,
    pub message: String,
}

fn node_suffix(node: &Option<NodeId>) -> String {
    match node {
        Some(node) => format!(" at node {}", node),
        None => String::new(),
    }
}

pub fn rt_error(code: RetCode, message: impl Into<String>) -> anyhow::Error {
    RtError {
        code,
        node: None,
        message: message.into(),
    }
    .into()
}

pub fn node_error(code: RetCode, node: NodeId, message: impl Into<String>) -> anyhow::Error {
    RtError {
        code,
        node: Some(node),
        message: message.into(),
    }
    .into()
}

/// Code of the innermost [`RtError`] in the chain, if any.
pub fn ret_code(err: &anyhow::Error) -> Option<RetCode> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<RtError>())
        .map(|rt| rt.code)
}

/// Node that failed, if the error carries one.
pub fn failed_node(err: &anyhow::Error) -> Option<NodeId> {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<RtError>())
        .find_map(|rt| rt.node)
}

/// Tag an error with `node`, keeping an existing code or applying `default`.
pub fn attach_node(err: anyhow::Error, node: NodeId, default: RetCode) -> anyhow::Error {
    if failed_node(&err).is_some() {
        return err;
    }
    let code = ret_code(&err).unwrap_or(default);
    let message = match err.downcast_ref::<RtError>() {
        Some(rt) => rt.message.clone(),
        None => format!("{:#}", err),
    };
    node_error(code, node, message)
}

/// Apply `code` to an error that has none yet.
pub fn with_code(err: anyhow::Error, code: RetCode) -> anyhow::Error {
    if ret_code(&err).is_some() {
        return err;
    }
    rt_error(code, format!("{:#}", err))
}

/// Return early with a tagged error.
#[macro_export]
macro_rules! bail_rc {
    ($code:ident, $($arg:tt)*) => {
        return Err($crate::error::rt_error(
            $crate::error::RetCode::$code,
            format!($($arg)*),
        ))
    };
}

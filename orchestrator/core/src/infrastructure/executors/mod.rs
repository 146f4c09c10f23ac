// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Concrete `ToolExecutor` adapters: in-process, HTTP/REST,
//! JSON-RPC-over-stdio, and WebSocket streaming. The Dispatcher treats every
//! kind uniformly through the `ToolExecutor` trait; adapter-specific
//! concerns (retries, auth header injection, token refresh) live here.

pub mod http;
pub mod in_process;
pub mod jsonrpc_stdio;
pub mod websocket;

pub use http::HttpExecutor;
pub use in_process::InProcessExecutor;
pub use jsonrpc_stdio::JsonRpcStdioExecutor;
pub use websocket::WebSocketExecutor;

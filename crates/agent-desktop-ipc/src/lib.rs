#![deny(clippy::all)]

pub mod error_codes;
mod types;

pub use types::ErrorData;
pub use types::RpcRequest;
pub use types::RpcResponse;

mod capabilities;
mod dialect;
mod filter;
mod json2;
mod jsonrpc;
mod transport;

pub use capabilities::*;
pub use dialect::*;
pub use filter::*;
pub use json2::*;
pub use jsonrpc::*;
pub use transport::*;

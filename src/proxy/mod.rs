//
// src/proxy/mod.rs
//
mod proxy;

pub use proxy::{Proxy, ProxyError, REQUEST_ID_HEADER};

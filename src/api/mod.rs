mod client;
mod models;
mod retry;

pub use client::*;
pub use models::*;
pub use retry::*;

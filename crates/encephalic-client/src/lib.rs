pub mod client;
pub mod config;
pub mod error;
pub mod playback;
pub mod readiness;
pub mod retry;
pub mod subscription;
pub mod types;

pub use client::*;
pub use config::*;
pub use error::*;
pub use playback::*;
pub use readiness::*;
pub use retry::*;
pub use subscription::*;
pub use types::*;

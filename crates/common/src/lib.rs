//! Common types shared by the kube-dc crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;

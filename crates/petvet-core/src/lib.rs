pub mod config;
pub mod error;
pub mod types;

pub use config::PetVetConfig;
pub use error::{PetVetError, Result};
pub use types::*;

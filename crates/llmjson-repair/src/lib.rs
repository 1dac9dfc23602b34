pub mod config;
pub mod error;
pub mod factory;
pub mod providers;
pub mod traits;

pub use config::*;
pub use error::RepairError;
pub use factory::*;
pub use providers::{LenientRepairer, StrictRepairer};
pub use traits::*;

pub mod coerce;
pub mod descriptor;
pub mod envelope;
pub mod error;
pub mod extract;
pub mod reconcile;

pub use coerce::*;
pub use descriptor::*;
pub use envelope::*;
pub use error::*;
pub use extract::*;
pub use reconcile::*;

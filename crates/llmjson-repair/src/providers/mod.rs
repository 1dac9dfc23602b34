mod lenient;
mod strict;

pub use lenient::LenientRepairer;
pub use strict::StrictRepairer;

use std::sync::Arc;

use crate::config::RepairerConfig;
use crate::error::RepairError;
use crate::providers::{LenientRepairer, StrictRepairer};
use crate::traits::SyntaxRepairer;

pub fn build_repairer(cfg: RepairerConfig) -> Result<Arc<dyn SyntaxRepairer>, RepairError> {
    match cfg {
        RepairerConfig::Lenient(c) => Ok(Arc::new(LenientRepairer::new(c)?)),
        RepairerConfig::Strict => Ok(Arc::new(StrictRepairer)),
    }
}

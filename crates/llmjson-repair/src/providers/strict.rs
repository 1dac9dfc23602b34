use serde_json::Value;

use crate::error::RepairError;
use crate::traits::SyntaxRepairer;

/// Accepts only text that is already valid JSON and never rewrites it.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictRepairer;

impl SyntaxRepairer for StrictRepairer {
    fn name(&self) -> &'static str {
        "strict"
    }

    fn repair(&self, text: &str) -> Result<String, RepairError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(RepairError::Empty);
        }
        serde_json::from_str::<Value>(trimmed).map_err(RepairError::Invalid)?;
        Ok(trimmed.to_string())
    }
}

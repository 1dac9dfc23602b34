use crate::error::RepairError;

/// Purely syntactic normalization of near-JSON text into valid JSON.
///
/// Implementations make no judgment about field names or types and must be
/// safe to share across threads.
pub trait SyntaxRepairer: Send + Sync {
    fn name(&self) -> &'static str;

    fn repair(&self, text: &str) -> Result<String, RepairError>;
}

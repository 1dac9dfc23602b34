use llmjson_repair::{LenientConfig, RepairerConfig, MAX_NESTING_DEPTH};

pub const DEFAULT_MAX_CANDIDATES: usize = 32;
pub const DEFAULT_REPAIR_MAX_DEPTH: usize = MAX_NESTING_DEPTH;

#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Upper bound on extracted candidates attempted per call.
    pub max_candidates: usize,
    /// Retry a failed repaired decode on the envelope-unwrapped tree.
    pub envelope_unwrap: bool,
    /// Try the first-element and wrap-singleton heuristics.
    pub reconcile: bool,
    pub repairer: RepairerConfig,
}

impl DecoderConfig {
    pub fn new() -> Self {
        Self {
            max_candidates: DEFAULT_MAX_CANDIDATES,
            envelope_unwrap: true,
            reconcile: true,
            repairer: RepairerConfig::default(),
        }
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    pub fn with_envelope_unwrap(mut self, enabled: bool) -> Self {
        self.envelope_unwrap = enabled;
        self
    }

    pub fn with_reconcile(mut self, enabled: bool) -> Self {
        self.reconcile = enabled;
        self
    }

    pub fn with_repairer(mut self, repairer: RepairerConfig) -> Self {
        self.repairer = repairer;
        self
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let repairer = match lookup("LLMJSON_REPAIR")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("strict" | "none" | "off") => RepairerConfig::Strict,
            _ => RepairerConfig::Lenient(LenientConfig {
                max_depth: lookup_usize(
                    &lookup,
                    "LLMJSON_REPAIR_MAX_DEPTH",
                    DEFAULT_REPAIR_MAX_DEPTH,
                    1,
                    MAX_NESTING_DEPTH,
                ),
                language_literals: lookup_bool(&lookup, "LLMJSON_LANGUAGE_LITERALS", true),
                ..LenientConfig::default()
            }),
        };

        Self {
            max_candidates: lookup_usize(
                &lookup,
                "LLMJSON_MAX_CANDIDATES",
                DEFAULT_MAX_CANDIDATES,
                1,
                1024,
            ),
            envelope_unwrap: lookup_bool(&lookup, "LLMJSON_ENVELOPE_UNWRAP", true),
            reconcile: lookup_bool(&lookup, "LLMJSON_RECONCILE", true),
            repairer,
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup_usize(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: usize,
    min: usize,
    max: usize,
) -> usize {
    lookup(name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
        .clamp(min, max)
}

fn lookup_bool(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
    match lookup(name).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_vars(vars: &[(&str, &str)]) -> DecoderConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        DecoderConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = from_vars(&[]);
        assert_eq!(cfg.max_candidates, DEFAULT_MAX_CANDIDATES);
        assert!(cfg.envelope_unwrap);
        assert!(cfg.reconcile);
        match cfg.repairer {
            RepairerConfig::Lenient(lenient) => {
                assert_eq!(lenient.max_depth, DEFAULT_REPAIR_MAX_DEPTH);
                assert!(lenient.language_literals);
            }
            RepairerConfig::Strict => panic!("lenient repair is the default"),
        }
    }

    #[test]
    fn reads_and_clamps_overrides() {
        let cfg = from_vars(&[
            ("LLMJSON_MAX_CANDIDATES", "0"),
            ("LLMJSON_ENVELOPE_UNWRAP", "off"),
            ("LLMJSON_RECONCILE", "FALSE"),
            ("LLMJSON_REPAIR_MAX_DEPTH", "999999"),
            ("LLMJSON_LANGUAGE_LITERALS", "0"),
        ]);
        assert_eq!(cfg.max_candidates, 1);
        assert!(!cfg.envelope_unwrap);
        assert!(!cfg.reconcile);
        match cfg.repairer {
            RepairerConfig::Lenient(lenient) => {
                assert_eq!(lenient.max_depth, MAX_NESTING_DEPTH);
                assert!(!lenient.language_literals);
            }
            RepairerConfig::Strict => panic!("expected lenient repair"),
        }
    }

    #[test]
    fn unparsable_values_fall_back_to_defaults() {
        let cfg = from_vars(&[
            ("LLMJSON_MAX_CANDIDATES", "many"),
            ("LLMJSON_RECONCILE", "maybe"),
        ]);
        assert_eq!(cfg.max_candidates, DEFAULT_MAX_CANDIDATES);
        assert!(cfg.reconcile);
    }

    #[test]
    fn selects_strict_repair() {
        let cfg = from_vars(&[("LLMJSON_REPAIR", " Strict ")]);
        assert_eq!(cfg.repairer.label(), "strict");
    }
}

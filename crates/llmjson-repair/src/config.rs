/// Deepest nesting the lenient reader accepts. serde_json refuses to parse
/// anything deeper, so a repaired document past this could never decode.
pub const MAX_NESTING_DEPTH: usize = 127;

#[derive(Debug, Clone)]
pub struct LenientConfig {
    pub max_depth: usize,
    /// Map `True`/`False`/`None`, `undefined`, `NaN` and `Infinity` to JSON literals.
    pub language_literals: bool,
    pub strip_code_fences: bool,
    pub allow_comments: bool,
}

impl LenientConfig {
    pub fn new() -> Self {
        Self {
            max_depth: MAX_NESTING_DEPTH,
            language_literals: true,
            strip_code_fences: true,
            allow_comments: true,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl Default for LenientConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub enum RepairerConfig {
    Lenient(LenientConfig),
    Strict,
}

impl RepairerConfig {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Lenient(_) => "lenient",
            Self::Strict => "strict",
        }
    }
}

impl Default for RepairerConfig {
    fn default() -> Self {
        Self::Lenient(LenientConfig::default())
    }
}

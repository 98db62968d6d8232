//! Metrics from a single resolution attempt.  The resolver builds this
//! structure rather than updating the process-wide metrics directly; the
//! listener folds it into its exporters.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metrics {
    /// Answers satisfied from the exact-label table.
    pub exact_hits: u64,
    /// Answers satisfied through a wildcard label.
    pub wildcard_hits: u64,
    /// Aliases followed, including through overrides.
    pub alias_follows: u64,
    /// Override-store consultations attempted.
    pub rop_lookups: u64,
    /// Consultations which disabled the target and took the fallback.
    pub rop_overrides: u64,
    /// Lookups which matched a label but satisfied no accepted type.
    pub empty_answers: u64,
    /// Lookups which matched nothing at all.
    pub name_errors: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

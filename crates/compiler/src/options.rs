//! Compiler configuration.

/// Options controlling how statements are compiled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Drop ORDER BY clauses that have no LIMIT; with a LIMIT, stop after
    /// the top-k and return the rows unordered.
    pub ignore_order_by: bool,
    /// Record the rows written by INSERT and DELETE statements.
    pub track_table_contents: bool,
    /// Initial value of the "generate output for next view" switch.
    pub generate_outputs: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            ignore_order_by: false,
            track_table_contents: true,
            generate_outputs: true,
        }
    }
}

impl CompilerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ignore_order_by(mut self, ignore: bool) -> Self {
        self.ignore_order_by = ignore;
        self
    }

    pub fn with_track_table_contents(mut self, track: bool) -> Self {
        self.track_table_contents = track;
        self
    }

    pub fn with_generate_outputs(mut self, generate: bool) -> Self {
        self.generate_outputs = generate;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CompilerOptions::default();
        assert!(!options.ignore_order_by);
        assert!(options.track_table_contents);
        assert!(options.generate_outputs);
    }

    #[test]
    fn test_builder() {
        let options = CompilerOptions::new()
            .with_ignore_order_by(true)
            .with_generate_outputs(false);
        assert!(options.ignore_order_by);
        assert!(!options.generate_outputs);
        assert!(options.track_table_contents);
    }
}

//! The generator plug-in interface.

use weave_source::{GeneratedArtifact, SourceUnit};

use crate::context::{GenerationContext, ModuleView};

/// Error type returned by generator callbacks.
pub type GeneratorError = Box<dyn std::error::Error + Send + Sync>;

/// Result of one generator callback.
pub type GeneratorResult = Result<Vec<GeneratedArtifact>, GeneratorError>;

/// Flags a generator declares about how it takes part in a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Capabilities {
    /// Runs once after all other generation and sees the complete file set.
    pub private: bool,
    /// Gets a final callback once generation rounds have settled.
    pub flushing: bool,
}

impl Capabilities {
    /// Participates in ordinary rounds only.
    pub const ORDINARY: Self = Self {
        private: false,
        flushing: false,
    };

    /// Runs in ordinary rounds and is flushed afterwards.
    pub const FLUSHING: Self = Self {
        private: false,
        flushing: true,
    };

    /// Runs only in the private phase.
    pub const PRIVATE: Self = Self {
        private: true,
        flushing: false,
    };
}

/// The phase a generator is scheduled in.
///
/// Variant order is the execution order within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GeneratorKind {
    /// Runs every round.
    Ordinary,
    /// Runs every round, then once more in the flush phase.
    Flushing,
    /// Runs once after the flush phase.
    Private,
}

impl GeneratorKind {
    /// Classifies a generator by its capabilities.
    ///
    /// Returns `None` for a generator that claims to be both private and
    /// flushing.
    pub fn from_capabilities(caps: Capabilities) -> Option<Self> {
        match (caps.private, caps.flushing) {
            (false, false) => Some(Self::Ordinary),
            (false, true) => Some(Self::Flushing),
            (true, false) => Some(Self::Private),
            (true, true) => None,
        }
    }

    /// Returns `true` if generators of this kind take part in rounds.
    pub fn runs_in_rounds(self) -> bool {
        !matches!(self, Self::Private)
    }
}

/// A code generator driven by the orchestrator.
///
/// Generators are called sequentially and never concurrently. They may keep
/// state across rounds of one pass, e.g. to aggregate what they have seen
/// until [`flush`](CodeGenerator::flush).
pub trait CodeGenerator: Send {
    /// Stable, unique identity. Used for ordering and in error reports.
    fn id(&self) -> &str;

    /// Declares how the generator takes part in a pass.
    fn capabilities(&self) -> Capabilities {
        Capabilities::ORDINARY
    }

    /// Returns `false` to skip the generator for this pass.
    ///
    /// Evaluated once at the start of every pass.
    fn is_applicable(&self, _ctx: &GenerationContext) -> bool {
        true
    }

    /// Processes `sources` and returns new artifacts.
    ///
    /// In a round, `sources` holds only the files that are new to the round.
    /// In the private phase it holds every file the pass has seen.
    fn generate(
        &mut self,
        ctx: &GenerationContext,
        module: &ModuleView<'_>,
        sources: &[SourceUnit],
    ) -> GeneratorResult;

    /// Emits final artifacts once rounds have settled.
    ///
    /// Only called for generators declaring [`Capabilities::flushing`].
    fn flush(&mut self, _ctx: &GenerationContext, _module: &ModuleView<'_>) -> GeneratorResult {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_capabilities() {
        assert_eq!(
            GeneratorKind::from_capabilities(Capabilities::ORDINARY),
            Some(GeneratorKind::Ordinary)
        );
        assert_eq!(
            GeneratorKind::from_capabilities(Capabilities::FLUSHING),
            Some(GeneratorKind::Flushing)
        );
        assert_eq!(
            GeneratorKind::from_capabilities(Capabilities::PRIVATE),
            Some(GeneratorKind::Private)
        );
        let both = Capabilities {
            private: true,
            flushing: true,
        };
        assert_eq!(GeneratorKind::from_capabilities(both), None);
    }

    #[test]
    fn ordinary_runs_before_flushing() {
        assert!(GeneratorKind::Ordinary < GeneratorKind::Flushing);
        assert!(GeneratorKind::Flushing.runs_in_rounds());
        assert!(!GeneratorKind::Private.runs_in_rounds());
    }
}

//! Registration and scheduling of code generators.
//!
//! The [`GeneratorRegistry`] validates generators as they are registered,
//! keeps them in execution order, and answers which generators run in each
//! phase of a pass.

use std::collections::BTreeSet;

use crate::context::GenerationContext;
use crate::error::GenerationError;
use crate::generator::{CodeGenerator, GeneratorKind};

/// A registered generator together with its resolved kind.
struct Registered {
    kind: GeneratorKind,
    generator: Box<dyn CodeGenerator>,
}

/// The phases of a pass a generator can be selected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Rounds,
    Flush,
    Private,
}

/// The set of generators a session drives.
///
/// Generators are kept sorted by kind (ordinary before flushing before
/// private) and then by identity, which is the order they run in.
#[derive(Default)]
pub struct GeneratorRegistry {
    generators: Vec<Registered>,
    /// Identities that are never run.
    disabled: BTreeSet<String>,
}

impl GeneratorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a generator.
    ///
    /// Rejects generators with an empty identity and generators that claim to
    /// be both private and flushing. A second generator with an identity that
    /// is already registered is dropped with a warning.
    pub fn register(&mut self, generator: Box<dyn CodeGenerator>) -> Result<(), GenerationError> {
        let id = generator.id().to_string();
        if id.is_empty() {
            return Err(GenerationError::InvalidGenerator {
                id,
                reason: "identity must not be empty".into(),
            });
        }
        let kind = GeneratorKind::from_capabilities(generator.capabilities()).ok_or_else(|| {
            GenerationError::InvalidGenerator {
                id: id.clone(),
                reason: "a generator cannot be both private and flushing".into(),
            }
        })?;

        if self.generators.iter().any(|r| r.generator.id() == id) {
            tracing::warn!(generator = %id, "generator registered twice, keeping the first");
            return Ok(());
        }

        let key = (kind, id.as_str());
        let at = self
            .generators
            .partition_point(|r| (r.kind, r.generator.id()) < key);
        tracing::debug!(generator = %id, ?kind, "registered generator");
        self.generators.insert(at, Registered { kind, generator });
        Ok(())
    }

    /// Excludes the generator `id` from every pass.
    pub fn disable(&mut self, id: impl Into<String>) {
        self.disabled.insert(id.into());
    }

    /// Returns `true` if `id` is disabled.
    pub fn is_disabled(&self, id: &str) -> bool {
        self.disabled.contains(id)
    }

    /// Returns the number of registered generators.
    pub fn len(&self) -> usize {
        self.generators.len()
    }

    /// Returns `true` if no generator is registered.
    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Returns the identities of all generators in execution order.
    pub fn ids(&self) -> Vec<&str> {
        self.generators.iter().map(|r| r.generator.id()).collect()
    }

    /// Returns the kind of the generator `id`, if registered.
    pub fn kind_of(&self, id: &str) -> Option<GeneratorKind> {
        self.generators
            .iter()
            .find(|r| r.generator.id() == id)
            .map(|r| r.kind)
    }

    /// Selects the generators taking part in `phase`, as indices in
    /// execution order.
    ///
    /// Disabled generators and generators that are not applicable in `ctx`
    /// are left out.
    pub(crate) fn select(&self, ctx: &GenerationContext, phase: Phase) -> Vec<usize> {
        self.generators
            .iter()
            .enumerate()
            .filter(|(_, r)| match phase {
                Phase::Rounds => r.kind.runs_in_rounds(),
                Phase::Flush => r.kind == GeneratorKind::Flushing,
                Phase::Private => r.kind == GeneratorKind::Private,
            })
            .filter(|(_, r)| {
                let id = r.generator.id();
                if self.disabled.contains(id) {
                    tracing::trace!(generator = %id, "generator disabled");
                    return false;
                }
                r.generator.is_applicable(ctx)
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Returns the generator at `index` as produced by [`select`](Self::select).
    pub(crate) fn generator_mut(&mut self, index: usize) -> &mut dyn CodeGenerator {
        self.generators[index].generator.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ModuleView;
    use crate::generator::{Capabilities, GeneratorResult};
    use std::path::PathBuf;
    use weave_source::SourceUnit;

    struct Named {
        id: &'static str,
        caps: Capabilities,
        applicable: bool,
    }

    impl Named {
        fn boxed(id: &'static str, caps: Capabilities) -> Box<dyn CodeGenerator> {
            Box::new(Self {
                id,
                caps,
                applicable: true,
            })
        }
    }

    impl CodeGenerator for Named {
        fn id(&self) -> &str {
            self.id
        }
        fn capabilities(&self) -> Capabilities {
            self.caps
        }
        fn is_applicable(&self, _ctx: &GenerationContext) -> bool {
            self.applicable
        }
        fn generate(
            &mut self,
            _ctx: &GenerationContext,
            _module: &ModuleView<'_>,
            _sources: &[SourceUnit],
        ) -> GeneratorResult {
            Ok(Vec::new())
        }
    }

    fn ctx() -> GenerationContext {
        GenerationContext {
            output_root: PathBuf::from("/out"),
            module_name: "main".into(),
            track_source_files: true,
        }
    }

    #[test]
    fn ordered_by_kind_then_id() {
        let mut registry = GeneratorRegistry::new();
        registry.register(Named::boxed("zeta", Capabilities::PRIVATE)).unwrap();
        registry.register(Named::boxed("beta", Capabilities::FLUSHING)).unwrap();
        registry.register(Named::boxed("gamma", Capabilities::ORDINARY)).unwrap();
        registry.register(Named::boxed("alpha", Capabilities::FLUSHING)).unwrap();
        registry.register(Named::boxed("delta", Capabilities::ORDINARY)).unwrap();
        assert_eq!(registry.ids(), vec!["delta", "gamma", "alpha", "beta", "zeta"]);
    }

    #[test]
    fn duplicate_identity_keeps_first() {
        let mut registry = GeneratorRegistry::new();
        registry.register(Named::boxed("dup", Capabilities::ORDINARY)).unwrap();
        registry.register(Named::boxed("dup", Capabilities::FLUSHING)).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.kind_of("dup"), Some(GeneratorKind::Ordinary));
    }

    #[test]
    fn rejects_private_flushing() {
        let mut registry = GeneratorRegistry::new();
        let caps = Capabilities {
            private: true,
            flushing: true,
        };
        let err = registry.register(Named::boxed("both", caps)).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidGenerator { id, .. } if id == "both"));
        assert!(registry.is_empty());
    }

    #[test]
    fn rejects_empty_identity() {
        let mut registry = GeneratorRegistry::new();
        let err = registry.register(Named::boxed("", Capabilities::ORDINARY)).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidGenerator { .. }));
    }

    #[test]
    fn select_by_phase() {
        let mut registry = GeneratorRegistry::new();
        registry.register(Named::boxed("o", Capabilities::ORDINARY)).unwrap();
        registry.register(Named::boxed("f", Capabilities::FLUSHING)).unwrap();
        registry.register(Named::boxed("p", Capabilities::PRIVATE)).unwrap();
        let ctx = ctx();
        assert_eq!(registry.select(&ctx, Phase::Rounds), vec![0, 1]);
        assert_eq!(registry.select(&ctx, Phase::Flush), vec![1]);
        assert_eq!(registry.select(&ctx, Phase::Private), vec![2]);
    }

    #[test]
    fn select_skips_disabled_and_inapplicable() {
        let mut registry = GeneratorRegistry::new();
        registry.register(Named::boxed("kept", Capabilities::ORDINARY)).unwrap();
        registry.register(Named::boxed("off", Capabilities::ORDINARY)).unwrap();
        registry
            .register(Box::new(Named {
                id: "idle",
                caps: Capabilities::ORDINARY,
                applicable: false,
            }))
            .unwrap();
        registry.disable("off");
        assert!(registry.is_disabled("off"));

        let selected = registry.select(&ctx(), Phase::Rounds);
        let ids: Vec<&str> = selected
            .into_iter()
            .map(|i| registry.generators[i].generator.id())
            .collect();
        assert_eq!(ids, vec!["kept"]);
    }
}

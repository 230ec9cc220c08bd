//! Integration tests for output ownership, phase ordering, and registration.

use weave_codegen::{Capabilities, GenerationError, GenerationSession, GeneratorRegistry};
use weave_conformance::{
    registry, CallLog, FactoryGenerator, FixedGenerator, IndexGenerator, ManifestGenerator,
    MembersInjectorGenerator, ObserverGenerator, Workspace, MARKER,
};

fn annotated_project() -> Workspace {
    let ws = Workspace::new();
    ws.write_source("A.kt", &format!("{MARKER} class A"));
    ws.write_source("B.kt", &format!("{MARKER} class B"));
    ws.write_source("C.kt", "class C");
    ws
}

// ===========================================================================
// Duplicate outputs
// ===========================================================================

#[test]
fn identical_outputs_from_two_generators_are_accepted() {
    let ws = annotated_project();
    let mut session = ws.session(registry(vec![
        Box::new(FixedGenerator::new("alpha", "Shared.kt", "object Shared")),
        Box::new(FixedGenerator::new("beta", "Shared.kt", "object Shared")),
    ]));

    let outcome = session.run_pass(ws.sources()).unwrap();
    assert_eq!(outcome.generated.len(), 1);
    assert_eq!(ws.output("Shared.kt").as_deref(), Some("object Shared"));
}

#[test]
fn conflicting_outputs_abort_the_pass() {
    let ws = annotated_project();
    let mut session = ws.session(registry(vec![
        Box::new(FixedGenerator::new("alpha", "Shared.kt", "object One")),
        Box::new(FixedGenerator::new("beta", "Shared.kt", "object Two")),
    ]));

    let err = session.run_pass(ws.sources()).unwrap_err();
    match err {
        GenerationError::ConflictingOutput {
            path,
            first_generator,
            second_generator,
            first_content,
            second_content,
        } => {
            assert_eq!(path.as_str(), "Shared.kt");
            assert_eq!(first_generator, "alpha");
            assert_eq!(second_generator, "beta");
            assert_eq!(first_content, "object One");
            assert_eq!(second_content, "object Two");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!ws.cache_file().exists());
}

#[test]
fn conflict_report_ignores_registration_order() {
    let ws = annotated_project();
    let mut session = ws.session(registry(vec![
        Box::new(FixedGenerator::new("beta", "Shared.kt", "object Two")),
        Box::new(FixedGenerator::new("alpha", "Shared.kt", "object One")),
    ]));

    let err = session.run_pass(ws.sources()).unwrap_err();
    assert!(matches!(
        err,
        GenerationError::ConflictingOutput { first_generator, .. } if first_generator == "alpha"
    ));
}

#[test]
fn generator_cannot_overwrite_a_cached_output() {
    let ws = annotated_project();
    let log = CallLog::new();
    ws.session(registry(vec![Box::new(FactoryGenerator::new(&log))]))
        .run_pass(ws.sources())
        .unwrap();

    // C is new to the cache and the rogue writes over A's retained factory.
    ws.write_source("C.kt", "class C(val a: A)");
    let err = ws
        .session(registry(vec![
            Box::new(FactoryGenerator::new(&log)),
            Box::new(FixedGenerator::new("rogue", "A_Factory.kt", "class Rogue")),
        ]))
        .run_pass(ws.sources())
        .unwrap_err();
    match err {
        GenerationError::ConflictingOutput {
            first_generator,
            first_content,
            ..
        } => {
            assert!(first_generator.contains("A.kt"));
            assert!(first_content.contains("class A_Factory"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(ws.output("A_Factory.kt").unwrap().contains("class A_Factory"));
}

#[test]
fn untracked_output_is_rejected_while_tracking() {
    let ws = annotated_project();
    let mut session = ws.session(registry(vec![Box::new(
        FixedGenerator::new("loose", "Loose.kt", "class Loose").untracked(),
    )]));

    let err = session.run_pass(ws.sources()).unwrap_err();
    assert!(matches!(
        err,
        GenerationError::UntrackedArtifact { ref generator, ref path }
            if generator == "loose" && path.as_str() == "Loose.kt"
    ));
    assert!(ws.output("Loose.kt").is_none());
}

// ===========================================================================
// Flush and private phases
// ===========================================================================

#[test]
fn flushing_generator_replaces_its_own_output() {
    let ws = annotated_project();
    let log = CallLog::new();
    let mut session = ws.session(registry(vec![
        Box::new(FactoryGenerator::new(&log)),
        Box::new(IndexGenerator::new(&log).early()),
    ]));

    let outcome = session.run_pass(ws.sources()).unwrap();
    let index = ws.output("Index.kt").unwrap();
    assert!(index.starts_with("object Index"));
    assert!(!index.contains("pending"));
    let written = outcome
        .generated
        .iter()
        .find(|a| a.path.as_str() == "Index.kt")
        .unwrap();
    assert_eq!(written.content, index);
    assert!(written.aggregating);
    assert_eq!(log.entries_for("index:"), vec!["index:flush:2"]);
}

#[test]
fn flushing_generator_cannot_replace_foreign_output() {
    let ws = annotated_project();
    let log = CallLog::new();
    let mut session = ws.session(registry(vec![
        Box::new(FixedGenerator::new("alpha", "Index.kt", "object Index")),
        Box::new(IndexGenerator::new(&log)),
    ]));

    let err = session.run_pass(ws.sources()).unwrap_err();
    assert!(matches!(
        err,
        GenerationError::ConflictingOutput { first_generator, second_generator, .. }
            if first_generator == "alpha" && second_generator == "index"
    ));
}

#[test]
fn private_generator_sees_everything_and_feeds_nothing() {
    let ws = annotated_project();
    let log = CallLog::new();
    let mut session = ws.session(registry(vec![
        Box::new(FactoryGenerator::new(&log)),
        Box::new(MembersInjectorGenerator::new(&log)),
        Box::new(IndexGenerator::new(&log)),
        Box::new(ManifestGenerator::new(&log)),
    ]));

    session.run_pass(ws.sources()).unwrap();

    let manifest = ws.output("manifest.txt").unwrap();
    let names: Vec<&str> = manifest.lines().collect();
    assert_eq!(
        names,
        vec![
            "A.kt",
            "A_Factory.kt",
            "A_MembersInjector.kt",
            "B.kt",
            "B_Factory.kt",
            "B_MembersInjector.kt",
            "C.kt",
            "Index.kt",
        ]
    );
    assert!(!log
        .entries()
        .iter()
        .any(|e| e.ends_with("manifest.txt")));
    assert_eq!(log.entries_for("manifest:"), vec!["manifest:8"]);
}

#[test]
fn phases_run_in_order() {
    let ws = annotated_project();
    let log = CallLog::new();
    let mut session = ws.session(registry(vec![
        Box::new(ObserverGenerator::new("p", Capabilities::PRIVATE, &log)),
        Box::new(ObserverGenerator::new("f", Capabilities::FLUSHING, &log)),
        Box::new(ObserverGenerator::new("o", Capabilities::ORDINARY, &log)),
    ]));

    session.run_pass(ws.sources()).unwrap();
    assert_eq!(
        log.entries(),
        vec![
            "o:generate:3:3",
            "f:generate:3:3",
            "f:flush:3",
            "p:generate:3:3",
        ]
    );
}

// ===========================================================================
// Registration
// ===========================================================================

#[test]
fn private_flushing_generator_is_rejected() {
    let mut registry = GeneratorRegistry::new();
    let both = Capabilities {
        private: true,
        flushing: true,
    };
    let err = registry
        .register(Box::new(
            FixedGenerator::new("both", "X.kt", "x").with_capabilities(both),
        ))
        .unwrap_err();
    assert!(matches!(err, GenerationError::InvalidGenerator { id, .. } if id == "both"));
    assert!(registry.is_empty());
}

#[test]
fn duplicate_registration_keeps_the_first() {
    let ws = annotated_project();
    let mut registry = GeneratorRegistry::new();
    registry
        .register(Box::new(FixedGenerator::new("gen", "First.kt", "first")))
        .unwrap();
    registry
        .register(Box::new(FixedGenerator::new("gen", "Second.kt", "second")))
        .unwrap();
    assert_eq!(registry.ids(), vec!["gen"]);

    ws.session(registry).run_pass(ws.sources()).unwrap();
    assert_eq!(ws.output_files(), vec!["First.kt"]);
}

#[test]
fn generators_disabled_in_config_do_not_run() {
    let ws = annotated_project();
    std::fs::write(
        ws.root().join("weave.toml"),
        "[generation]\ndisabled = [\"injectors\"]\n",
    )
    .unwrap();
    let log = CallLog::new();
    let generators = registry(vec![
        Box::new(FactoryGenerator::new(&log)),
        Box::new(MembersInjectorGenerator::new(&log)),
    ]);

    let mut session = GenerationSession::load(ws.root(), generators).unwrap();
    session.run_pass(ws.sources()).unwrap();

    assert_eq!(ws.output_files(), vec!["A_Factory.kt", "B_Factory.kt"]);
    assert!(log.entries_for("injectors:").is_empty());
}

#[test]
fn invalid_config_is_reported() {
    let ws = Workspace::new();
    std::fs::write(
        ws.root().join("weave.toml"),
        "[generation]\nmax_rounds = 0\n",
    )
    .unwrap();
    let result = GenerationSession::load(ws.root(), GeneratorRegistry::new());
    assert!(matches!(result, Err(GenerationError::Config(_))));
}

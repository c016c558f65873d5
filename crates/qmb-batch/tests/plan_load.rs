use std::path::PathBuf;

use qmb_batch::{
    load_plan, parse_sbatch_output, DependencyKind, MissingDependencyPolicy, ParamRole,
    SubmissionId,
};

fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

#[test]
fn plan_fixture_builds_a_batch() {
    let path = fixture_path("heisenberg.yaml");
    let plan = load_plan(&path).expect("load plan");
    assert_eq!(plan.parameters.names()[..3], ["L", "J1", "dW"]);
    assert_eq!(plan.parameters.get("disorder").map(|v| v.len()), Some(1));
    assert_eq!(plan.settings.resources.cpus_per_task, 4);
    assert_eq!(plan.settings.resources.nodes, 1);
    assert_eq!(plan.settings.resources.module, "Anaconda3/5.3.0");
    assert_eq!(
        plan.settings.missing_dependency,
        MissingDependencyPolicy::DropDependency
    );
    let sff = &plan.settings.stages[1];
    assert!(!sff.seeded);
    assert_eq!(sff.after.as_ref().map(|edge| edge.kind), Some(DependencyKind::AfterOk));
    assert_eq!(plan.storage_root(), path.parent().expect("dir").join("runs/heisenberg"));

    let batch = plan.into_batch().expect("batch");
    assert_eq!(batch.jobs().len(), 6);
    assert_eq!(batch.classification().role("sff_eta"), Some(ParamRole::Auxiliary));
    let range = batch.classification().seed_range().expect("seeds");
    assert_eq!(range.array_spec(), "1-381:20");
    let first = &batch.jobs()[0];
    assert_eq!(first.descriptor(), "L_8_J1_1.0_dW_0.50_disorder_uniform");
    assert_eq!(first.rendered("dW"), Some("0.5"));
    assert!(!batch.layout().root.exists());
}

#[test]
fn plan_round_trips_through_yaml() {
    let plan = load_plan(fixture_path("heisenberg.yaml")).expect("load plan");
    let yaml = plan.to_yaml_string().expect("serialize");
    let reparsed: qmb_batch::BatchPlan =
        qmb_core::from_yaml_slice(yaml.as_bytes()).expect("reparse");
    assert_eq!(reparsed.parameters, plan.parameters);
    assert_eq!(reparsed.keys, plan.keys);
    assert_eq!(reparsed.settings, plan.settings);
}

#[test]
fn duplicate_parameters_are_rejected_by_the_loader() {
    let yaml = b"parameters:\n  L: [8]\n  L: [10]\nkeys: {system: [L]}\nstorage: s\nstages: []\n";
    assert!(qmb_core::from_yaml_slice::<qmb_batch::BatchPlan>(yaml).is_err());
}

#[test]
fn sbatch_parsable_output_is_parsed() {
    assert_eq!(parse_sbatch_output("123456\n"), Some(SubmissionId::new("123456")));
    assert_eq!(
        parse_sbatch_output("98765;cluster-a\n"),
        Some(SubmissionId::new("98765"))
    );
    assert_eq!(parse_sbatch_output("sbatch: error: invalid account"), None);
    assert_eq!(parse_sbatch_output(""), None);
}

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use proptest::prelude::*;
use qmb_batch::{
    classify, expand, extract_disorder, parse_descriptor, Job, KeyRoles, ParameterSet,
    Redefinition, SeedArg,
};
use serde_json::json;

fn jobs(params: &ParameterSet, keys: &KeyRoles) -> Vec<Job> {
    let classification = Arc::new(classify(params, keys).expect("classify"));
    expand(params, classification).expect("expand").jobs
}

fn heisenberg() -> (ParameterSet, KeyRoles) {
    let params = ParameterSet::new()
        .with("L", vec![json!(8)])
        .with("J1", vec![json!(1.0)])
        .with("dW", vec![json!(2.5)])
        .with("sff_eta", vec![json!(0.5)])
        .with("min_seed", vec![json!(1)])
        .with("max_seed", vec![json!(3)]);
    let keys = KeyRoles::new(["L"], ["J1", "dW"], ["sff_eta"]);
    (params, keys)
}

#[test]
fn command_args_cover_every_classified_key() {
    let (params, keys) = heisenberg();
    let job = &jobs(&params, &keys)[0];
    let extra = vec!["-eps_nev 100".to_string()];
    let args = job.command_args(Path::new("/store/results"), SeedArg::Fixed(2), &extra);
    assert_eq!(
        args,
        vec![
            "--L=8",
            "--J1=1.0",
            "--dW=2.5",
            "--sff_eta=0.5",
            "--results=/store/results/L_8/J1_1.0_dW_2.5",
            "--seed=2",
            "-eps_nev 100",
        ]
    );
    let array_args = job.command_args(Path::new("r"), SeedArg::ArrayTask, &[]);
    assert!(array_args.contains(&"--seed=$SLURM_ARRAY_TASK_ID".to_string()));
    let unseeded = job.command_args(Path::new("r"), SeedArg::None, &[]);
    assert!(unseeded.iter().all(|arg| !arg.starts_with("--seed")));
}

#[test]
fn override_changes_command_line_but_not_descriptor() {
    let (params, keys) = heisenberg();
    let mut job = jobs(&params, &keys).remove(0);
    let before = job.descriptor();
    job.apply_override("dW", "2.50").expect("override");
    assert_eq!(job.descriptor(), before);
    assert_eq!(job.rendered("dW"), Some("2.50"));
    assert_eq!(job.value("dW"), Some(&json!(2.5)));
    let args = job.command_args(Path::new("r"), SeedArg::None, &[]);
    assert!(args.contains(&"--dW=2.50".to_string()));
    assert!(args.iter().any(|arg| arg.ends_with("J1_1.0_dW_2.5")));

    let err = job.apply_override("missing", "1").expect_err("unknown key");
    assert_eq!(err.info().code, "override_key");
}

#[test]
fn redefinition_table_supports_fixed_and_lookup_rules() {
    let params = ParameterSet::new()
        .with("L", vec![json!(8), json!(10)])
        .with("dW", vec![json!(1.0)]);
    let keys = KeyRoles::new(["L"], ["dW"], Vec::<&str>::new());
    let mut redef = BTreeMap::new();
    redef.insert(
        "L".to_string(),
        Redefinition::Lookup([("8".to_string(), "08".to_string())].into_iter().collect()),
    );
    redef.insert("dW".to_string(), Redefinition::Fixed("1.00".to_string()));
    let mut expanded = jobs(&params, &keys);
    for job in &mut expanded {
        job.apply_redefinitions(&redef).expect("redef");
    }
    assert_eq!(expanded[0].rendered("L"), Some("08"));
    assert_eq!(expanded[1].rendered("L"), Some("10"));
    assert_eq!(expanded[1].rendered("dW"), Some("1.00"));
    assert_eq!(expanded[0].descriptor(), "L_8_dW_1.0");
}

#[test]
fn fingerprint_separates_auxiliary_variants() {
    let params = ParameterSet::new()
        .with("L", vec![json!(8)])
        .with("sff_eta", vec![json!(0.1), json!(0.2)]);
    let keys = KeyRoles::new(["L"], Vec::<&str>::new(), ["sff_eta"]);
    let expanded = jobs(&params, &keys);
    assert_eq!(expanded[0].descriptor(), expanded[1].descriptor());
    let a = expanded[0].fingerprint("compute").expect("hash");
    let b = expanded[1].fingerprint("compute").expect("hash");
    assert_ne!(a, b);
    assert_eq!(a, expanded[0].fingerprint("compute").expect("hash"));
}

#[test]
fn descriptor_parses_back_into_pairs() {
    let (params, keys) = heisenberg();
    let job = &jobs(&params, &keys)[0];
    let pairs = parse_descriptor(&job.descriptor(), &["L", "J1", "dW"]).expect("parse");
    assert_eq!(
        pairs,
        vec![
            ("L".to_string(), "8".to_string()),
            ("J1".to_string(), "1.0".to_string()),
            ("dW".to_string(), "2.5".to_string()),
        ]
    );
    assert!(parse_descriptor("L_8_dW_1.0", &["dW", "L"]).is_err());
    let tail = parse_descriptor("L_8_dW_1.0_extra", &["L", "dW"]).expect("tail");
    assert_eq!(tail[1], ("dW".to_string(), "1.0_extra".to_string()));
    assert!(parse_descriptor("L_8", &["L", "dW"]).is_err());
}

#[test]
fn disorder_extraction_matches_postprocessing_contract() {
    let (rest, value) = extract_disorder("J1_1.0_J2_1.0_delta1_0.55_W_0.0_dW_1", "dW").expect("dW");
    assert_eq!(rest, "J1_1.0_J2_1.0_delta1_0.55_W_0.0");
    assert_eq!(value, 1.0);

    let (rest, value) = extract_disorder("L_8_dW_2.5_W_0.0", "_dW_").expect("dW");
    assert_eq!(rest, "L_8_W_0.0");
    assert_eq!(value, 2.5);

    let (rest, value) = extract_disorder("dW_3.0_L_8", "dW").expect("leading key");
    assert_eq!(rest, "L_8");
    assert_eq!(value, 3.0);

    assert_eq!(
        extract_disorder("L_8_W_1.0", "dW").expect_err("missing").info().code,
        "disorder_key"
    );
    assert_eq!(
        extract_disorder("L_8_dW_abc", "dW").expect_err("not numeric").info().code,
        "disorder_value"
    );
}

proptest! {
    #[test]
    fn descriptor_round_trip(
        size in 2u32..40,
        coupling in -10.0f64..10.0,
        disorder in 0.0f64..20.0,
        label in "[a-z]{1,8}",
    ) {
        let params = ParameterSet::new()
            .with("L", vec![json!(size)])
            .with("J", vec![json!(coupling)])
            .with("dW", vec![json!(disorder)])
            .with("disorder", vec![json!(label.clone())]);
        let keys = KeyRoles::new(["L"], ["J", "dW", "disorder"], Vec::<&str>::new());
        let job = jobs(&params, &keys).remove(0);
        let pairs = parse_descriptor(&job.descriptor(), &["L", "J", "dW", "disorder"]).unwrap();
        for (key, value) in &pairs {
            prop_assert_eq!(Some(value.as_str()), job.rendered(key));
        }
        let (_, extracted) = extract_disorder(&job.descriptor(), "dW").unwrap();
        prop_assert_eq!(extracted, disorder);
    }
}

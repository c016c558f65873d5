use qmb_batch::{classify, KeyRoles, ParamRole, ParameterSet};
use serde_json::json;

fn base_params() -> ParameterSet {
    ParameterSet::new()
        .with("L", vec![json!(8), json!(10)])
        .with("dW", vec![json!(1.0), json!(2.0)])
        .with("sff_eta", vec![json!(0.5)])
}

#[test]
fn every_key_gets_exactly_one_role() {
    let keys = KeyRoles::new(["L"], ["dW"], ["sff_eta"]);
    let classification = classify(&base_params(), &keys).expect("classify");
    assert_eq!(classification.role("L"), Some(ParamRole::System));
    assert_eq!(classification.role("dW"), Some(ParamRole::Module));
    assert_eq!(classification.role("sff_eta"), Some(ParamRole::Auxiliary));
    assert_eq!(classification.seed_range(), None);
    let descriptor_keys: Vec<_> = classification.descriptor_keys().collect();
    assert_eq!(descriptor_keys, vec!["L", "dW"]);
}

#[test]
fn unclassified_key_is_a_config_error() {
    let keys = KeyRoles::new(["L"], ["dW"], Vec::<&str>::new());
    let err = classify(&base_params(), &keys).expect_err("sff_eta has no role");
    assert!(err.is_fatal());
    assert_eq!(err.info().code, "unclassified_key");
    assert_eq!(err.info().context.get("key").map(String::as_str), Some("sff_eta"));
}

#[test]
fn key_in_two_roles_is_rejected() {
    let keys = KeyRoles::new(["L", "dW"], ["dW"], ["sff_eta"]);
    let err = classify(&base_params(), &keys).expect_err("dW listed twice");
    assert_eq!(err.info().code, "duplicate_role");
}

#[test]
fn listed_key_missing_from_parameters_is_rejected() {
    let keys = KeyRoles::new(["L"], ["dW", "J"], ["sff_eta"]);
    let err = classify(&base_params(), &keys).expect_err("J is unknown");
    assert_eq!(err.info().code, "unknown_key");
}

#[test]
fn seed_keys_are_implicit_and_ignored_in_role_lists() {
    let params = base_params()
        .with("min_seed", vec![json!(1)])
        .with("max_seed", vec![json!(5)])
        .with("step_seed", vec![json!(2)]);
    let keys = KeyRoles::new(["L"], ["dW", "min_seed", "max_seed"], ["sff_eta"]);
    let classification = classify(&params, &keys).expect("classify");
    assert_eq!(classification.role("min_seed"), Some(ParamRole::SeedMin));
    assert_eq!(classification.role("step_seed"), Some(ParamRole::SeedStep));
    assert_eq!(classification.module_keys(), &["dW".to_string()]);
    let range = classification.seed_range().expect("range");
    assert_eq!(range.seeds().collect::<Vec<_>>(), vec![1, 3]);
    assert_eq!(range.count(), 2);
}

#[test]
fn malformed_seed_ranges_are_rejected() {
    let keys = KeyRoles::new(["L"], ["dW"], ["sff_eta"]);
    let cases = [
        (vec![("min_seed", json!(1))], "seed_triple"),
        (vec![("step_seed", json!(2))], "seed_triple"),
        (vec![("min_seed", json!(5)), ("max_seed", json!(5))], "seed_range"),
        (vec![("min_seed", json!(1)), ("max_seed", json!(5)), ("step_seed", json!(0))], "seed_step"),
        (vec![("min_seed", json!(1.5)), ("max_seed", json!(5))], "seed_value"),
    ];
    for (seeds, code) in cases {
        let mut params = base_params();
        for (key, value) in seeds {
            params.insert(key, vec![value]);
        }
        let err = classify(&params, &keys).expect_err(code);
        assert_eq!(err.info().code, code);
    }

    let mut params = base_params();
    params.insert("min_seed", vec![json!(1), json!(2)]);
    params.insert("max_seed", vec![json!(5)]);
    let err = classify(&params, &keys).expect_err("two min seeds");
    assert_eq!(err.info().code, "seed_value");
}

#[test]
fn nested_values_are_rejected() {
    let params = ParameterSet::new().with("L", vec![json!([8, 10])]);
    let keys = KeyRoles::new(["L"], Vec::<&str>::new(), Vec::<&str>::new());
    let err = classify(&params, &keys).expect_err("array value");
    assert_eq!(err.info().code, "unsupported_value");
}

#[test]
fn descriptor_values_embedding_a_key_marker_are_rejected() {
    let params = ParameterSet::new()
        .with("L", vec![json!(8)])
        .with("model", vec![json!("xxz_dW_1")])
        .with("dW", vec![json!(1.0)]);
    let keys = KeyRoles::new(["L"], ["model", "dW"], Vec::<&str>::new());
    let err = classify(&params, &keys).expect_err("value contains _dW_");
    assert_eq!(err.info().code, "ambiguous_value");
    assert_eq!(err.info().context.get("marker").map(String::as_str), Some("dW"));

    let trailing = ParameterSet::new()
        .with("L", vec![json!("chain_dW")])
        .with("dW", vec![json!(1.0)]);
    let keys = KeyRoles::new(["L"], ["dW"], Vec::<&str>::new());
    assert!(classify(&trailing, &keys).is_err());

    let plain = ParameterSet::new()
        .with("L", vec![json!("open_chain")])
        .with("dW", vec![json!(1.0)]);
    classify(&plain, &keys).expect("underscores without markers are fine");
}

use std::sync::Arc;

use proptest::prelude::*;
use qmb_batch::{classify, expand, job_count, KeyRoles, ParameterSet};
use serde_json::json;

fn expand_descriptors(params: &ParameterSet, keys: &KeyRoles) -> Vec<String> {
    let classification = Arc::new(classify(params, keys).expect("classify"));
    expand(params, classification)
        .expect("expand")
        .jobs
        .iter()
        .map(|job| job.descriptor())
        .collect()
}

#[test]
fn grid_follows_declared_order() {
    let params = ParameterSet::new()
        .with("L", vec![json!(8), json!(10)])
        .with("dW", vec![json!(1.0), json!(2.0)]);
    let keys = KeyRoles::new(["L"], ["dW"], Vec::<&str>::new());
    assert_eq!(
        expand_descriptors(&params, &keys),
        vec!["L_8_dW_1.0", "L_8_dW_2.0", "L_10_dW_1.0", "L_10_dW_2.0"]
    );
}

#[test]
fn descriptor_uses_caller_key_order_not_declared_order() {
    let params = ParameterSet::new()
        .with("dW", vec![json!(1.0)])
        .with("W", vec![json!(0.0)])
        .with("L", vec![json!(12)]);
    let keys = KeyRoles::new(["L"], ["W", "dW"], Vec::<&str>::new());
    assert_eq!(expand_descriptors(&params, &keys), vec!["L_12_W_0.0_dW_1.0"]);
}

#[test]
fn seeds_do_not_multiply_jobs() {
    let params = ParameterSet::new()
        .with("L", vec![json!(8), json!(10)])
        .with("min_seed", vec![json!(1)])
        .with("max_seed", vec![json!(400)])
        .with("step_seed", vec![json!(20)]);
    let keys = KeyRoles::new(["L"], Vec::<&str>::new(), Vec::<&str>::new());
    assert_eq!(expand_descriptors(&params, &keys), vec!["L_8", "L_10"]);
}

#[test]
fn empty_value_list_yields_no_jobs_and_a_warning() {
    let params = ParameterSet::new()
        .with("L", vec![json!(8)])
        .with("dW", vec![]);
    let keys = KeyRoles::new(["L"], ["dW"], Vec::<&str>::new());
    let classification = Arc::new(classify(&params, &keys).expect("classify"));
    let expansion = expand(&params, classification).expect("expand");
    assert!(expansion.jobs.is_empty());
    assert_eq!(expansion.warnings.len(), 1);
    assert!(expansion.warnings[0].contains("dW"));
}

#[test]
fn expansion_is_reproducible() {
    let params = ParameterSet::new()
        .with("L", vec![json!(8), json!(10), json!(12)])
        .with("J", vec![json!(1.0)])
        .with("dW", vec![json!("0.50"), json!("1.00")])
        .with("pbc", vec![json!(true), json!(false)]);
    let keys = KeyRoles::new(["L"], ["J", "dW", "pbc"], Vec::<&str>::new());
    let classification = Arc::new(classify(&params, &keys).expect("classify"));
    let first = expand(&params, Arc::clone(&classification)).expect("expand");
    let second = expand(&params, classification).expect("expand");
    assert_eq!(first, second);
    assert_eq!(first.jobs.len(), 12);
    assert_eq!(first.jobs[0].descriptor(), "L_8_J_1.0_dW_0.50_pbc_true");
    let indices: Vec<_> = first.jobs.iter().map(|job| job.index()).collect();
    assert_eq!(indices, (0..12).collect::<Vec<_>>());
}

proptest! {
    #[test]
    fn job_count_is_product_of_list_lengths(lengths in proptest::collection::vec(1usize..4, 1..5)) {
        let mut params = ParameterSet::new();
        let mut module = Vec::new();
        for (idx, len) in lengths.iter().enumerate() {
            let name = format!("p{idx}");
            params.insert(name.clone(), (0..*len).map(|v| json!(v)).collect());
            module.push(name);
        }
        let keys = KeyRoles::new(Vec::<String>::new(), module, Vec::<String>::new());
        let classification = Arc::new(classify(&params, &keys).unwrap());
        let expansion = expand(&params, classification).unwrap();
        let expected: usize = lengths.iter().product();
        prop_assert_eq!(expansion.jobs.len(), expected);
        prop_assert_eq!(job_count(&params), expected);
    }
}

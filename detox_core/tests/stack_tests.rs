use chrono::{DateTime, TimeZone, Utc};
use detox_core::{Decision, Inventory, PolicyStack, ReplicaDecision, StackConfig};
use Decision::{Delete, Protect};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn stacks_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../stacks")
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn inventory() -> Inventory {
    Inventory::from_file(stacks_dir().join("inventory.json")).unwrap()
}

fn build(file: &str) -> PolicyStack {
    init_tracing();
    StackConfig::from_file(stacks_dir().join(file))
        .unwrap()
        .build(now())
        .unwrap()
}

fn decisions(stack: &PolicyStack) -> Vec<Decision> {
    stack
        .evaluate_all(&inventory())
        .into_iter()
        .map(|d| d.decision)
        .collect()
}

fn find<'a>(decisions: &'a [ReplicaDecision], site: &str, dataset: &str) -> &'a ReplicaDecision {
    decisions
        .iter()
        .find(|d| d.replica.site == site && d.replica.dataset == dataset)
        .unwrap()
}

const RECO: &str = "/SingleMuon/Run2016B-PromptReco-v1/RECO";
const RAW: &str = "/ZeroBias/Run2016C-v1/RAW";
const AODSIM: &str = "/GenericTTbar/RunIISpring16-v1/AODSIM";
const MINIAOD: &str = "/Tau/Run2016D-v2/MINIAOD";
const AOD: &str = "/JetHT/Run2016E-v1/AOD";

#[test]
fn test_inventory_order() {
    let inventory = inventory();
    let replicas: Vec<String> = inventory
        .replicas()
        .iter()
        .map(|(replica, _)| replica.id().to_string())
        .collect();

    assert_eq!(replicas.len(), 11);
    assert_eq!(replicas[0], format!("T2_US_MIT:{}", RECO));
    assert_eq!(replicas[10], format!("T2_CH_CERN:{}", AOD));
}

#[test]
fn test_locked_stack() {
    let stack = build("locked.toml");
    assert_eq!(stack.default_decision(), Delete);
    assert_eq!(
        decisions(&stack),
        vec![
            Protect, Protect, Protect, Delete, Delete, Delete, Protect, Protect, Protect,
            Protect, Protect
        ]
    );

    let all = stack.evaluate_all(&inventory());
    assert_eq!(
        find(&all, "T1_US_FNAL", RECO).reason,
        "Pattern match: (action, site, dataset) = (Keep, *, /*/*-PromptReco-*/*)"
    );
    assert_eq!(
        find(&all, "T2_US_MIT", AODSIM).reason,
        "Pattern match: (action, site, dataset) = (Delete, T2_US_MIT, /GenericTTbar/*/AODSIM)"
    );
    assert_eq!(find(&all, "T2_CH_CERN", AODSIM).reason, "Dataset is deprecated.");
    assert_eq!(
        find(&all, "T2_US_MIT", MINIAOD).reason,
        "Replica has no full tape copy and has a block newer than 2024-05-18."
    );
    assert_eq!(find(&all, "T2_DE_DESY", MINIAOD).reason, "Site is not in ready state.");
    assert_eq!(find(&all, "T2_US_MIT", AOD).reason, "Locked block exists.");
    assert_eq!(
        find(&all, "T2_US_MIT", RAW).reason,
        "No rule matched; default decision applies."
    );
}

#[test]
fn test_minimum_copies_stack() {
    let stack = build("minimum_copies.toml");
    assert_eq!(
        decisions(&stack),
        vec![
            Delete, Delete, Delete, Delete, Delete, Protect, Protect, Protect, Protect, Delete,
            Protect
        ]
    );

    let all = stack.evaluate_all(&inventory());
    assert_eq!(
        find(&all, "T2_US_MIT", RECO).reason,
        "Replica was updated more than 30.0d ago."
    );
    assert_eq!(find(&all, "T2_US_MIT", MINIAOD).reason, "Dataset has <= 2 copies.");
    assert_eq!(
        find(&all, "T2_US_MIT", AOD).reason,
        "Global usage rank is above 400.000000."
    );
    assert_eq!(
        find(&all, "T2_CH_CERN", AOD).reason,
        "Pattern match: (action, site, dataset) = (Keep, T2_CH_CERN, /*/*/*)"
    );
}

#[test]
fn test_reco_cleanup_stack() {
    let stack = build("reco_cleanup.toml");
    assert_eq!(stack.default_decision(), Protect);
    assert_eq!(
        decisions(&stack),
        vec![
            Delete, Delete, Protect, Protect, Delete, Protect, Protect, Protect, Protect,
            Protect, Protect
        ]
    );

    let all = stack.evaluate_all(&inventory());
    assert_eq!(
        find(&all, "T1_US_FNAL", RECO).reason,
        "Replica was updated more than 90.0d ago."
    );
    assert_eq!(
        find(&all, "T2_US_MIT", RAW).reason,
        "Dataset has no complete tape copy."
    );
    assert_eq!(
        find(&all, "T1_US_FNAL", RAW).reason,
        "Pattern match: (action, site, dataset) = (Keep, T1_*, /*/*/RAW)"
    );
}

#[test]
fn test_condition_stack() {
    let config = StackConfig::from_str(
        r#"
        name = "full_sites"
        default = "protect"
        partition = "AnalysisOps"

        [[rules]]
        kind = "condition"
        expr = "site.occupancy > 0.9 and replica.num_access == 0 and not replica.is_custodial"
        decision = "delete"
        reason = "Site is full and replica is unused."
        "#,
    )
    .unwrap();
    let stack = config.build(now()).unwrap();
    let all = stack.evaluate_all(&inventory());

    assert_eq!(find(&all, "T2_US_MIT", RECO).decision, Delete);
    assert_eq!(find(&all, "T2_US_MIT", RECO).reason, "Site is full and replica is unused.");
    assert_eq!(find(&all, "T1_US_FNAL", RECO).decision, Protect);
    assert_eq!(find(&all, "T1_US_FNAL", RAW).decision, Delete);
    assert_eq!(find(&all, "T2_DE_DESY", MINIAOD).decision, Delete);
    assert_eq!(find(&all, "T2_US_MIT", AOD).decision, Protect);
    assert_eq!(find(&all, "T2_CH_CERN", AOD).decision, Protect);
}

#[test]
fn test_status_symbols_in_conditions() {
    let config = StackConfig::from_str(
        r#"
        name = "symbols"
        default = "protect"

        [[rules]]
        kind = "condition"
        expr = "dataset.status == DEPRECATED"
        decision = "delete"

        [[rules]]
        kind = "condition"
        expr = "dataset.on_tape != FULL and site.name == T1_*"
        decision = "delete"
        "#,
    )
    .unwrap();
    let all = config.build(now()).unwrap().evaluate_all(&inventory());

    assert_eq!(
        find(&all, "T2_CH_CERN", AODSIM).reason,
        "Condition matched: dataset.status == DEPRECATED"
    );
    assert_eq!(find(&all, "T1_US_FNAL", RAW).decision, Delete);
    assert_eq!(find(&all, "T2_US_MIT", RAW).decision, Protect);
    assert_eq!(find(&all, "T1_US_FNAL", RECO).decision, Protect);
}

#[test]
fn test_rebuilt_stacks_agree() {
    let first = build("locked.toml").evaluate_all(&inventory());
    let second = build("locked.toml").evaluate_all(&inventory());
    assert_eq!(first, second);
}

//! Policy stack execution.
//!
//! A stack is an ordered list of rules plus a default decision. Rules are
//! consulted in order and the first one that takes a position decides; the
//! position in the stack is the only precedence there is.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::decision::{Decision, ReplicaDecision, Verdict};
use crate::model::{Demand, Inventory, ReplicaRef};
use crate::rule::Rule;

/// Reason reported when no rule took a position.
pub const DEFAULT_REASON: &str = "No rule matched; default decision applies.";

/// Immutable, ordered rule pipeline.
#[derive(Clone)]
pub struct PolicyStack {
    name: String,
    rules: Vec<Arc<dyn Rule>>,
    default_decision: Decision,
}

impl PolicyStack {
    pub fn builder(default_decision: Decision) -> PolicyStackBuilder {
        PolicyStackBuilder {
            name: "policy".to_string(),
            rules: Vec::new(),
            default_decision,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_decision(&self) -> Decision {
        self.default_decision
    }

    pub fn rules(&self) -> &[Arc<dyn Rule>] {
        &self.rules
    }

    /// Run the replica through the stack.
    pub fn evaluate(&self, replica: &ReplicaRef<'_>, demand: &Demand) -> Verdict {
        for rule in &self.rules {
            if let Some(mut verdict) = rule.evaluate(replica, demand) {
                debug!(
                    "{}: {} -> {} by {} ({})",
                    self.name,
                    replica.id(),
                    verdict.decision,
                    rule.name(),
                    verdict.reason
                );
                verdict.rule = Some(rule.name().to_string());
                return verdict;
            }
        }

        debug!(
            "{}: {} -> {} by default",
            self.name,
            replica.id(),
            self.default_decision
        );
        Verdict::new(self.default_decision, DEFAULT_REASON)
    }

    /// Evaluate and report the decision with the replica identity.
    pub fn decide(&self, replica: &ReplicaRef<'_>, demand: &Demand) -> ReplicaDecision {
        let verdict = self.evaluate(replica, demand);
        ReplicaDecision {
            replica: replica.id(),
            decision: verdict.decision,
            reason: verdict.reason,
        }
    }

    /// Decide every replica of an inventory, in inventory order.
    pub fn evaluate_all(&self, inventory: &Inventory) -> Vec<ReplicaDecision> {
        inventory
            .replicas()
            .into_iter()
            .map(|(replica, demand)| self.decide(&replica, demand))
            .collect()
    }
}

impl fmt::Debug for PolicyStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyStack")
            .field("name", &self.name)
            .field(
                "rules",
                &self.rules.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .field("default_decision", &self.default_decision)
            .finish()
    }
}

/// Collects rules before freezing them into a [`PolicyStack`].
pub struct PolicyStackBuilder {
    name: String,
    rules: Vec<Arc<dyn Rule>>,
    default_decision: Decision,
}

impl PolicyStackBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn push(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    pub fn push_shared(mut self, rule: Arc<dyn Rule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn build(self) -> PolicyStack {
        info!(
            "Built policy stack {} with {} rules, default {}",
            self.name,
            self.rules.len(),
            self.default_decision
        );
        PolicyStack {
            name: self.name,
            rules: self.rules,
            default_decision: self.default_decision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action_list::ActionList;
    use crate::condition::{Condition, ConditionRule};
    use crate::model::{Dataset, DatasetReplica, DatasetStatus, Site};
    use crate::rules::{DeleteDeprecated, ProtectCustodial, ProtectNonreadySite};
    use chrono::Utc;

    struct Abstain;

    impl Rule for Abstain {
        fn name(&self) -> &str {
            "Abstain"
        }

        fn evaluate(&self, _replica: &ReplicaRef<'_>, _demand: &Demand) -> Option<Verdict> {
            None
        }
    }

    fn fixture(site: &str, dataset: &str) -> (Dataset, Site) {
        let mut dataset = Dataset::new(dataset, Utc::now());
        dataset.replicas.push(DatasetReplica::new(site, Utc::now()));
        (dataset, Site::new(site))
    }

    #[test]
    fn test_default_fallback() {
        let (dataset, site) = fixture("T2_US_MIT", "/A/B/AOD");
        let view = ReplicaRef::new(&dataset, &dataset.replicas[0], &site);

        for default in [Decision::Protect, Decision::Delete] {
            let stack = PolicyStack::builder(default)
                .push(Abstain)
                .push(Abstain)
                .build();
            let verdict = stack.evaluate(&view, &Demand::default());
            assert_eq!(verdict.decision, default);
            assert_eq!(verdict.reason, DEFAULT_REASON);
            assert!(verdict.rule.is_none());
        }
    }

    #[test]
    fn test_position_beats_decision_kind() {
        let (mut dataset, site) = fixture("T2_US_MIT", "/A/B/AOD");
        dataset.status = DatasetStatus::Deprecated;
        dataset.replicas[0].is_custodial = true;
        let view = ReplicaRef::new(&dataset, &dataset.replicas[0], &site);
        let demand = Demand::default();

        let delete_first = PolicyStack::builder(Decision::Protect)
            .push(DeleteDeprecated)
            .push(ProtectCustodial)
            .build();
        let verdict = delete_first.evaluate(&view, &demand);
        assert_eq!(verdict.decision, Decision::Delete);
        assert_eq!(verdict.rule.as_deref(), Some("DeleteDeprecated"));

        let protect_first = PolicyStack::builder(Decision::Delete)
            .push(ProtectCustodial)
            .push(DeleteDeprecated)
            .build();
        assert_eq!(protect_first.evaluate(&view, &demand).decision, Decision::Protect);
    }

    #[test]
    fn test_mixed_entries() {
        let mut exceptions = ActionList::named("exceptions");
        exceptions.add_action("Keep", "*", "/*/*/RECO").unwrap();

        let stack = PolicyStack::builder(Decision::Delete)
            .name("mixed")
            .push(exceptions)
            .push(ProtectNonreadySite)
            .push(ConditionRule::new(
                Condition::new("replica.num_access == 0").unwrap(),
                Decision::Protect,
            ))
            .build();
        assert_eq!(stack.rules().len(), 3);

        let (reco, site) = fixture("T2_US_MIT", "/A/B/RECO");
        let view = ReplicaRef::new(&reco, &reco.replicas[0], &site);
        let verdict = stack.evaluate(&view, &Demand::default());
        assert_eq!(verdict.decision, Decision::Protect);
        assert_eq!(verdict.rule.as_deref(), Some("exceptions"));

        let (aod, site) = fixture("T2_US_MIT", "/A/B/AOD");
        let view = ReplicaRef::new(&aod, &aod.replicas[0], &site);
        let decision = stack.decide(&view, &Demand::default());
        assert_eq!(decision.decision, Decision::Protect);
        assert_eq!(decision.reason, "Condition matched: replica.num_access == 0");
        assert_eq!(decision.replica.dataset, "/A/B/AOD");
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let (dataset, site) = fixture("T1_US_FNAL", "/A/B/AOD");
        let view = ReplicaRef::new(&dataset, &dataset.replicas[0], &site);
        let stack = PolicyStack::builder(Decision::Delete)
            .push(ProtectCustodial)
            .build();

        let first = stack.decide(&view, &Demand::default());
        let second = stack.decide(&view, &Demand::default());
        assert_eq!(first, second);
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn test_shared_across_threads() {
        let stack = Arc::new(
            PolicyStack::builder(Decision::Delete)
                .push(ProtectCustodial)
                .build(),
        );

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let stack = Arc::clone(&stack);
                std::thread::spawn(move || {
                    let (mut dataset, site) = fixture("T2_US_MIT", "/A/B/AOD");
                    dataset.replicas[0].is_custodial = i % 2 == 0;
                    let view = ReplicaRef::new(&dataset, &dataset.replicas[0], &site);
                    stack.evaluate(&view, &Demand::default()).decision
                })
            })
            .collect();

        let decisions: Vec<Decision> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(
            decisions,
            vec![Decision::Protect, Decision::Delete, Decision::Protect, Decision::Delete]
        );
    }
}

//! Signal evaluation: shared trend classifier, rule predicates, rule-set
//! variants and the aggregating engine.

pub mod engine;
pub mod rules;
pub mod trend;
pub mod variants;

pub use engine::{
    Decider, MultiTfSnapshot, SignalDecision, SignalEngine, CONFLICTING_RULES, NO_RULE_MATCH,
};
pub use rules::{Rule, RuleContext, RuleParamError, RuleParams, VolatilityFloor};
pub use trend::pick_trend;
pub use variants::{ParamOverrides, RuleSet, VariantError, VariantKey};

//! Rule table keyed by (operation class, priority)
//!
//! Lookup is exact `(class, priority)` first, then the class-wide rule that
//! omits priority. No match is a first-class outcome: the router never
//! guesses a route.

use crate::config::RoutingRule;
use crate::operation::{OperationClass, Priority, Route};
use std::collections::HashMap;

/// Composite rule key; `None` priority matches any priority
type RuleKey = (OperationClass, Option<Priority>);

/// Preferred route per operation class and priority
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    rules: HashMap<RuleKey, Route>,
}

impl RoutingTable {
    /// Build the table from configured rules
    ///
    /// Duplicate keys are rejected by config validation; if any reach here
    /// the last one wins.
    pub fn from_rules(rules: &[RoutingRule]) -> Self {
        let rules = rules
            .iter()
            .map(|rule| ((rule.operation_class, rule.priority), rule.route))
            .collect();
        Self { rules }
    }

    /// Preferred route for the class and priority, if any rule matches
    pub fn lookup(&self, class: OperationClass, priority: Priority) -> Option<Route> {
        self.rules
            .get(&(class, Some(priority)))
            .or_else(|| self.rules.get(&(class, None)))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

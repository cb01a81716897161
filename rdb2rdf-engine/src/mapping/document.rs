//! Validated mapping document
//!
//! Holds every [`MappingRule`] of a run in declaration order, indexed by id,
//! and computes the order they execute in.

use std::collections::{BTreeSet, HashMap};

use super::{MappingRule, Prefixes};
use crate::error::{R2rmlError, R2rmlResult};

/// The complete, validated set of mapping rules
///
/// Construction checks that ids are unique, that every reference names a
/// mapping in the document, and that each rule is internally consistent.
#[derive(Debug, Clone, Default)]
pub struct MappingDocument {
    rules: Vec<MappingRule>,
    /// Index: mapping id → position in `rules`
    by_id: HashMap<String, usize>,
    prefixes: Prefixes,
}

impl MappingDocument {
    pub fn new(rules: Vec<MappingRule>) -> R2rmlResult<Self> {
        Self::with_prefixes(rules, Prefixes::new())
    }

    pub fn with_prefixes(rules: Vec<MappingRule>, prefixes: Prefixes) -> R2rmlResult<Self> {
        let mut by_id = HashMap::with_capacity(rules.len());
        for (idx, rule) in rules.iter().enumerate() {
            rule.validate()?;
            if by_id.insert(rule.id().to_string(), idx).is_some() {
                return Err(R2rmlError::invalid_value(
                    "id",
                    format!("duplicate mapping id {}", rule.id()),
                ));
            }
        }

        for rule in &rules {
            for parent in rule.parents() {
                if !by_id.contains_key(parent) {
                    return Err(R2rmlError::UnknownMapping(format!(
                        "{parent} (referenced from {})",
                        rule.id()
                    )));
                }
            }
        }

        Ok(Self {
            rules,
            by_id,
            prefixes,
        })
    }

    pub fn get(&self, id: &str) -> Option<&MappingRule> {
        self.by_id.get(id).map(|&idx| &self.rules[idx])
    }

    /// Rules in declaration order
    pub fn rules(&self) -> &[MappingRule] {
        &self.rules
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.id())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn prefixes(&self) -> &Prefixes {
        &self.prefixes
    }

    /// Rules that reference `parent_id`, in declaration order
    pub fn find_rules_referencing(&self, parent_id: &str) -> Vec<&MappingRule> {
        self.rules
            .iter()
            .filter(|r| r.id() != parent_id && r.parents().contains(&parent_id))
            .collect()
    }

    /// Rules in execution order: every parent before the rules referencing it,
    /// declaration order among independent rules. Self references are allowed.
    pub fn execution_order(&self) -> R2rmlResult<Vec<&MappingRule>> {
        let n = self.rules.len();
        let mut in_degree = vec![0usize; n];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (child, rule) in self.rules.iter().enumerate() {
            for parent in rule.parents() {
                let Some(&parent) = self.by_id.get(parent) else {
                    return Err(R2rmlError::UnknownMapping(parent.to_string()));
                };
                if parent != child {
                    children[parent].push(child);
                    in_degree[child] += 1;
                }
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(next) = ready.pop_first() {
            order.push(&self.rules[next]);
            for &child in &children[next] {
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    ready.insert(child);
                }
            }
        }

        if order.len() < n {
            let stuck: Vec<&str> = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.rules[i].id())
                .collect();
            return Err(R2rmlError::DependencyCycle(stuck.join(", ")));
        }

        Ok(order)
    }
}

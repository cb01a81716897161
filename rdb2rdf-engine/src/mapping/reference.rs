//! Cross-mapping references
//!
//! A [`Reference`] makes the objects of one mapping the subjects generated by
//! another (the parent). With join conditions the parent's query is re-run per
//! child row, restricted to matching parent rows. Without join conditions every
//! subject the parent produced becomes an object.

use serde::{Deserialize, Serialize};

/// Reference to another mapping's subjects
///
/// ```text
/// orders:  SELECT id, customer_id FROM orders
///   predicate  ex:hasCustomer
///   reference  parent = <#Customers>, child customer_id = parent id
/// ```
///
/// For each order this yields the customer subject whose `id` equals the
/// order's `customer_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Id of the parent mapping
    pub parent: String,
    /// Join conditions (empty means direct subject reuse)
    pub join_conditions: Vec<JoinCondition>,
}

impl Reference {
    /// Reference with a single join condition
    pub fn new(
        parent: impl Into<String>,
        child_column: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        Self {
            parent: parent.into(),
            join_conditions: vec![JoinCondition::new(child_column, parent_column)],
        }
    }

    /// Reference reusing every subject of the parent
    pub fn to_subjects(parent: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            join_conditions: Vec::new(),
        }
    }

    /// Reference with several join conditions (composite key)
    pub fn with_conditions(parent: impl Into<String>, conditions: Vec<JoinCondition>) -> Self {
        Self {
            parent: parent.into(),
            join_conditions: conditions,
        }
    }

    pub fn add_condition(&mut self, child: impl Into<String>, parent: impl Into<String>) {
        self.join_conditions.push(JoinCondition::new(child, parent));
    }

    pub fn child_columns(&self) -> Vec<&str> {
        self.join_conditions
            .iter()
            .map(|jc| jc.child_column.as_str())
            .collect()
    }

    pub fn parent_columns(&self) -> Vec<&str> {
        self.join_conditions
            .iter()
            .map(|jc| jc.parent_column.as_str())
            .collect()
    }

    /// True when objects come from a derived parent query
    pub fn has_conditions(&self) -> bool {
        !self.join_conditions.is_empty()
    }
}

/// Child column must equal parent column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinCondition {
    pub child_column: String,
    pub parent_column: String,
}

impl JoinCondition {
    pub fn new(child: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            child_column: child.into(),
            parent_column: parent.into(),
        }
    }
}

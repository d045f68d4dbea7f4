//! Purchasable credit plans.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tally_core::{Credits, Error, PlanId, Result};

/// A one-time credit package sold through the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub credits: Credits,
    /// Provider price id that checkout sessions may carry instead of the plan id.
    #[serde(default)]
    pub price_id: Option<String>,
}

impl Plan {
    pub fn new(id: &str, name: impl Into<String>, credits: Credits) -> Result<Self> {
        Ok(Self {
            id: PlanId::new(id)?,
            name: name.into(),
            credits,
            price_id: None,
        })
    }

    pub fn with_price_id(mut self, price_id: impl Into<String>) -> Self {
        self.price_id = Some(price_id.into());
        self
    }

    fn matches(&self, key: &str) -> bool {
        self.id.as_str() == key || self.price_id.as_deref() == Some(key)
    }
}

/// Immutable plan table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Plan>", into = "Vec<Plan>")]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    /// Build a catalog, rejecting zero-credit plans and duplicate keys.
    pub fn new(plans: Vec<Plan>) -> Result<Self> {
        let mut keys = HashSet::new();
        for plan in &plans {
            if plan.credits == 0 {
                return Err(Error::InvalidRequest(format!(
                    "plan {} grants no credits",
                    plan.id
                )));
            }
            let plan_keys = std::iter::once(plan.id.as_str()).chain(plan.price_id.as_deref());
            for key in plan_keys {
                if !keys.insert(key.to_string()) {
                    return Err(Error::InvalidRequest(format!("duplicate plan key {key}")));
                }
            }
        }
        Ok(Self { plans })
    }

    /// Find a plan by its id or its provider price id.
    pub fn get(&self, key: &str) -> Option<&Plan> {
        self.plans.iter().find(|plan| plan.matches(key))
    }

    /// Like [`get`](Self::get), failing with `PlanNotFound`.
    pub fn resolve(&self, key: &str) -> Result<&Plan> {
        self.get(key)
            .ok_or_else(|| Error::PlanNotFound(key.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Plan> {
        self.plans.iter()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        let plan = |id: &'static str, name: &str, credits: Credits| Plan {
            id: PlanId::from_static(id),
            name: name.to_string(),
            credits,
            price_id: Some(format!("price_{id}")),
        };
        Self {
            plans: vec![
                plan("starter", "Starter", 200),
                plan("pro", "Pro", 1000),
                plan("enterprise", "Enterprise", 3000),
            ],
        }
    }
}

impl TryFrom<Vec<Plan>> for PlanCatalog {
    type Error = Error;

    fn try_from(plans: Vec<Plan>) -> Result<Self> {
        Self::new(plans)
    }
}

impl From<PlanCatalog> for Vec<Plan> {
    fn from(catalog: PlanCatalog) -> Self {
        catalog.plans
    }
}

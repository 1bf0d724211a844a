//! Fixture data served by the upstreams

use edge_core::domain::{Customer, Order};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::HashMap;

const NAMES: [&str; 8] = [
    "Mario", "Zhouyue", "Zhen", "Mia", "Stéphane", "Valerie", "Mike", "Julia",
];

/// Fixed customer list, ids assigned 1..=8 in name order.
#[derive(Debug, Clone)]
pub struct CustomerCatalog {
    customers: Vec<Customer>,
}

impl CustomerCatalog {
    pub fn standard() -> Self {
        let customers = NAMES
            .iter()
            .zip(1..)
            .map(|(name, id)| Customer {
                id,
                name: name.to_string(),
            })
            .collect();
        Self { customers }
    }

    pub fn customers(&self) -> &[Customer] {
        &self.customers
    }

    pub fn ids(&self) -> Vec<i32> {
        self.customers.iter().map(|c| c.id).collect()
    }
}

impl Default for CustomerCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

/// Orders per customer, generated once from a seed.
///
/// The same seed, ids and bound always give the same fixtures.
#[derive(Debug, Clone, Default)]
pub struct OrderFixtures {
    by_customer: HashMap<i32, Vec<Order>>,
}

impl OrderFixtures {
    /// Give each customer `0..max_orders` orders with ids `1..=n`.
    pub fn generate(seed: u64, customer_ids: &[i32], max_orders: i32) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let by_customer = customer_ids
            .iter()
            .map(|&customer_id| {
                let count = if max_orders > 0 {
                    rng.gen_range(0..max_orders)
                } else {
                    0
                };
                let orders = (1..=count).map(|id| Order { id, customer_id }).collect();
                (customer_id, orders)
            })
            .collect();
        Self { by_customer }
    }

    /// Orders for `customer_id`, empty for unknown customers.
    pub fn orders_for(&self, customer_id: i32) -> &[Order] {
        self.by_customer
            .get(&customer_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.by_customer.values().map(Vec::len).sum()
    }
}

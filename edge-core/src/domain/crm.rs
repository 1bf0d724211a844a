//! Customer and order domain models

use serde::{Deserialize, Serialize};

/// A customer as returned by the collection upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Customer {
    pub id: i32,
    pub name: String,
}

/// One order belonging to a customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i32,
    pub customer_id: i32,
}

/// Join record of a customer and every order fetched for it.
///
/// Built once by the aggregator and never mutated afterwards; every order's
/// `customer_id` equals `customer.id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerOrders {
    pub customer: Customer,
    pub orders: Vec<Order>,
}

impl CustomerOrders {
    pub fn new(customer: Customer, orders: Vec<Order>) -> Self {
        debug_assert!(orders.iter().all(|o| o.customer_id == customer.id));
        Self { customer, orders }
    }

    /// Record for a customer whose orders could not be fetched.
    pub fn without_orders(customer: Customer) -> Self {
        Self {
            customer,
            orders: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_json_shape() {
        let customer: Customer = serde_json::from_str(r#"{"id":1,"name":"Mario"}"#).unwrap();
        assert_eq!(customer, Customer { id: 1, name: "Mario".to_string() });
    }

    #[test]
    fn test_order_uses_camel_case() {
        let order = Order { id: 7, customer_id: 3 };
        let json = serde_json::to_value(order).unwrap();
        assert_eq!(json, serde_json::json!({ "id": 7, "customerId": 3 }));
    }

    #[test]
    fn test_customer_orders_serialization() {
        let record = CustomerOrders::new(
            Customer { id: 2, name: "Zhen".to_string() },
            vec![Order { id: 1, customer_id: 2 }],
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["customer"]["name"], "Zhen");
        assert_eq!(json["orders"][0]["customerId"], 2);
    }

    #[test]
    fn test_without_orders_is_empty() {
        let record = CustomerOrders::without_orders(Customer { id: 4, name: "Mia".to_string() });
        assert!(record.orders.is_empty());
    }
}

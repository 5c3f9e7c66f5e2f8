use serde::{Deserialize, Serialize};

/// One synthesized invoice row (one per product line item).
/// Field names are the wire contract consumed by the table UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub serial_number: String,
    pub customer_name: String,
    pub product_name: String,
    pub quantity: f64,
    pub price_with_tax: f64,
    /// Serialized as `null` when the source document carried no date.
    pub date: Option<String>,
    pub bank_details: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub product_name: String,
    pub quantity: f64,
    pub unit_price: f64,
    /// Percentage as a plain number (any "%" suffix stripped during normalization).
    pub tax: f64,
    pub price_with_tax: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub customer_name: String,
    pub phone_number: String,
    pub address: String,
    pub total_purchase_amount: f64,
}

/// The aggregate handed to the table UI. Built fresh on every extraction;
/// rows are only ever edited downstream, keyed by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    pub invoices: Vec<Invoice>,
    pub products: Vec<Product>,
    pub customers: Vec<Customer>,
}

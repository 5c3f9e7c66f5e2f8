//! Invoice workbook parsing: turns a spreadsheet into the pre-structured
//! payload (one invoice row per product line, plus aggregated customers).

use calamine::{open_workbook_auto, Data, DataType, Reader};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::Path;

/// Fields a worksheet column can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    SerialNumber,
    CustomerName,
    PhoneNumber,
    Address,
    ProductName,
    Quantity,
    UnitPrice,
    Tax,
    PriceWithTax,
    Date,
    BankDetails,
}

/// Map a header cell to a field by keyword. First match wins; headers that
/// match nothing are ignored.
fn classify_header(text: &str) -> Option<Column> {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    if lower.contains("serial") || (lower.contains("invoice") && !lower.contains("date")) {
        return Some(Column::SerialNumber);
    }
    if lower.contains("phone") || lower.contains("mobile") {
        return Some(Column::PhoneNumber);
    }
    if lower.contains("address") {
        return Some(Column::Address);
    }
    if lower.contains("customer") || lower.contains("buyer") || lower.contains("party") {
        return Some(Column::CustomerName);
    }
    if lower.contains("product") || lower.contains("item") || lower.contains("description") {
        return Some(Column::ProductName);
    }
    if lower.contains("qty") || lower.contains("quantity") {
        return Some(Column::Quantity);
    }
    if lower.contains("tax") || lower.contains("gst") || lower.contains("vat") {
        // "price with tax" / "amount with tax" are totals, not rates.
        if lower.contains("price") || lower.contains("amount") || lower.contains("total") {
            return Some(Column::PriceWithTax);
        }
        return Some(Column::Tax);
    }
    if lower.contains("unit price") || lower.contains("rate") || lower.contains("unit cost") {
        return Some(Column::UnitPrice);
    }
    if lower.contains("date") {
        return Some(Column::Date);
    }
    if lower.contains("bank") || lower.contains("ifsc") || lower.contains("account") {
        return Some(Column::BankDetails);
    }
    if lower.contains("total") || lower.contains("amount") || lower.contains("price") {
        return Some(Column::PriceWithTax);
    }
    None
}

/// Detect the header row by scanning the first rows for cells that map to
/// known fields. A row with 3 or more matches is the header.
fn detect_header_row(rows: &[Vec<Data>]) -> Option<usize> {
    for (idx, row) in rows.iter().take(20).enumerate() {
        let matches = row
            .iter()
            .filter_map(|cell| cell.as_string())
            .filter(|text| classify_header(text).is_some())
            .count();
        if matches >= 3 {
            return Some(idx);
        }
    }
    None
}

fn map_columns(header: &[Data]) -> HashMap<Column, usize> {
    let mut columns = HashMap::new();
    for (idx, cell) in header.iter().enumerate() {
        if let Some(text) = cell.as_string() {
            if let Some(column) = classify_header(&text) {
                columns.entry(column).or_insert(idx);
            }
        }
    }
    columns
}

fn cell<'a>(row: &'a [Data], idx: Option<&usize>) -> Option<&'a Data> {
    idx.and_then(|i| row.get(*i))
}

fn cell_text(row: &[Data], idx: Option<&usize>) -> String {
    cell(row, idx)
        .and_then(|c| c.as_string())
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Numeric cell value; numeric strings parse, a trailing "%" is stripped.
fn cell_number(row: &[Data], idx: Option<&usize>) -> f64 {
    match cell(row, idx) {
        Some(Data::String(s)) => s
            .trim()
            .trim_end_matches('%')
            .trim()
            .replace(',', "")
            .parse::<f64>()
            .unwrap_or(0.0),
        Some(Data::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Some(other) => other.as_f64().unwrap_or(0.0),
        None => 0.0,
    }
}

/// Date cell as YYYY-MM-DD. Excel stores dates as serial day counts; text
/// cells pass through as written.
fn cell_date(row: &[Data], idx: Option<&usize>) -> String {
    let value = cell(row, idx);
    if value.map_or(false, |c| c.is_datetime()) {
        return value
            .and_then(|c| c.as_date())
            .map(|d: chrono::NaiveDate| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
    }
    value
        .and_then(|c| c.as_string())
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Parse the first worksheet of an invoice workbook into the pre-structured
/// payload consumed by the extraction pipeline.
pub fn process_workbook(path: &Path) -> Result<Value, String> {
    if !path.exists() {
        return Err("File not found.".to_string());
    }
    let mut workbook =
        open_workbook_auto(path).map_err(|e| format!("Could not open Excel file: {}", e))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or("Workbook has no sheets")?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| format!("Sheet not found: {}", e))?;
    let rows: Vec<Vec<Data>> = range.rows().map(|row| row.to_vec()).collect();
    build_payload(&rows)
}

/// Build `{ products, invoices, customers }` from worksheet rows.
///
/// Serial number, customer, date and bank details often appear only on the
/// first line of a multi-line invoice; blank cells inherit the value above.
/// Ids are left absent; the pipeline assigns them.
pub fn build_payload(rows: &[Vec<Data>]) -> Result<Value, String> {
    let header_row = detect_header_row(rows)
        .ok_or("Could not find a header row in the sheet. Is this an invoice worksheet?")?;
    let columns = map_columns(&rows[header_row]);
    if !columns.contains_key(&Column::ProductName) {
        return Err("No product column found in the sheet.".to_string());
    }

    let mut products = Vec::new();
    let mut invoices = Vec::new();
    let mut customer_order: Vec<String> = Vec::new();
    let mut customers: HashMap<String, Map<String, Value>> = HashMap::new();

    let mut serial = String::new();
    let mut customer = String::new();
    let mut date = String::new();
    let mut bank = String::new();

    for row in rows.iter().skip(header_row + 1) {
        if row.iter().all(|c| c.is_empty()) {
            continue;
        }
        carry_forward(&mut serial, cell_text(row, columns.get(&Column::SerialNumber)));
        carry_forward(&mut customer, cell_text(row, columns.get(&Column::CustomerName)));
        carry_forward(&mut date, cell_date(row, columns.get(&Column::Date)));
        carry_forward(&mut bank, cell_text(row, columns.get(&Column::BankDetails)));

        let product_name = cell_text(row, columns.get(&Column::ProductName));
        if product_name.is_empty() {
            // Not a line item (totals row, note, ...).
            continue;
        }

        let quantity = cell_number(row, columns.get(&Column::Quantity));
        let unit_price = cell_number(row, columns.get(&Column::UnitPrice));
        let tax = cell_number(row, columns.get(&Column::Tax));
        let price_with_tax = if columns.contains_key(&Column::PriceWithTax) {
            cell_number(row, columns.get(&Column::PriceWithTax))
        } else {
            quantity * unit_price * (1.0 + tax / 100.0)
        };

        products.push(json!({
            "productName": product_name,
            "quantity": quantity,
            "unitPrice": unit_price,
            "tax": tax,
            "priceWithTax": price_with_tax,
        }));

        let mut invoice = Map::new();
        invoice.insert("serialNumber".to_string(), json!(serial));
        invoice.insert("customerName".to_string(), json!(customer));
        invoice.insert("productName".to_string(), json!(product_name));
        invoice.insert("quantity".to_string(), json!(quantity));
        invoice.insert("priceWithTax".to_string(), json!(price_with_tax));
        if !date.is_empty() {
            invoice.insert("date".to_string(), json!(date));
        }
        if !bank.is_empty() {
            invoice.insert("bankDetails".to_string(), json!(bank));
        }
        invoices.push(Value::Object(invoice));

        if !customer.is_empty() {
            let entry = customers.entry(customer.clone()).or_insert_with(|| {
                customer_order.push(customer.clone());
                let mut record = Map::new();
                record.insert("customerName".to_string(), json!(customer));
                record.insert(
                    "phoneNumber".to_string(),
                    json!(cell_text(row, columns.get(&Column::PhoneNumber))),
                );
                record.insert(
                    "address".to_string(),
                    json!(cell_text(row, columns.get(&Column::Address))),
                );
                record.insert("totalPurchaseAmount".to_string(), json!(0.0));
                record
            });
            let total = entry
                .get("totalPurchaseAmount")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            entry.insert(
                "totalPurchaseAmount".to_string(),
                json!(total + price_with_tax),
            );
        }
    }

    let customer_rows: Vec<Value> = customer_order
        .iter()
        .filter_map(|name| customers.get(name).cloned())
        .map(Value::Object)
        .collect();

    Ok(json!({
        "products": products,
        "invoices": invoices,
        "customers": customer_rows,
    }))
}

fn carry_forward(current: &mut String, next: String) {
    if !next.is_empty() {
        *current = next;
    }
}

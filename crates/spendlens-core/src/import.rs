//! Ledger providers
//!
//! The engine consumes an already-normalized ledger. These providers read one
//! from a CSV export (`date, merchant, amount, category[, is_recurring_hint]`)
//! or wrap transactions that arrived as JSON.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{Ledger, Transaction};

/// Source of normalized transactions
pub trait LedgerProvider {
    fn load(&self) -> Result<Ledger>;
}

/// CSV file on disk
pub struct CsvLedger {
    path: PathBuf,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerProvider for CsvLedger {
    fn load(&self) -> Result<Ledger> {
        let file = File::open(&self.path)?;
        let transactions = parse_csv(file)?;
        debug!(
            path = %self.path.display(),
            count = transactions.len(),
            "Loaded ledger CSV"
        );
        Ok(Ledger::new(transactions))
    }
}

/// Transactions already in memory (e.g. a JSON upload)
pub struct JsonLedger {
    transactions: Vec<Transaction>,
}

impl JsonLedger {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self { transactions }
    }
}

impl LedgerProvider for JsonLedger {
    fn load(&self) -> Result<Ledger> {
        for (i, t) in self.transactions.iter().enumerate() {
            if !t.amount.is_finite() {
                return Err(Error::InvalidData(format!(
                    "Transaction {} has a non-finite amount",
                    i
                )));
            }
            if t.merchant.trim().is_empty() {
                return Err(Error::InvalidData(format!(
                    "Transaction {} has no merchant",
                    i
                )));
            }
        }
        Ok(Ledger::new(self.transactions.clone()))
    }
}

/// Column positions resolved from the header row
struct Columns {
    date: usize,
    merchant: usize,
    amount: usize,
    category: Option<usize>,
    recurring: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.contains(&h.trim().to_lowercase().as_str()))
        };

        let date = find(&["date", "transaction date"])
            .ok_or_else(|| Error::Import("Missing 'date' column".into()))?;
        let merchant = find(&["merchant", "description", "payee"])
            .ok_or_else(|| Error::Import("Missing 'merchant' column".into()))?;
        let amount = find(&["amount"])
            .ok_or_else(|| Error::Import("Missing 'amount' column".into()))?;

        Ok(Self {
            date,
            merchant,
            amount,
            category: find(&["category"]),
            recurring: find(&["is_recurring_hint", "recurring"]),
        })
    }
}

/// Parse a normalized ledger CSV into transactions
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<Transaction>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let columns = Columns::from_headers(rdr.headers()?)?;
    let mut transactions = Vec::new();

    for (line, result) in rdr.records().enumerate() {
        let record = result?;
        let field = |idx: usize| record.get(idx).unwrap_or("").trim();

        let date_str = field(columns.date);
        if date_str.is_empty() {
            continue;
        }
        let date = parse_date(date_str)
            .map_err(|e| Error::Import(format!("Row {}: {}", line + 2, e)))?;
        let amount = parse_amount(field(columns.amount))
            .map_err(|e| Error::Import(format!("Row {}: {}", line + 2, e)))?;

        let merchant = field(columns.merchant).to_string();
        if merchant.is_empty() {
            return Err(Error::Import(format!("Row {}: empty merchant", line + 2)));
        }

        let category = columns
            .category
            .map(|i| field(i).to_string())
            .unwrap_or_default();
        let is_recurring_hint = columns
            .recurring
            .map(|i| matches!(field(i).to_lowercase().as_str(), "true" | "1" | "yes" | "y"))
            .unwrap_or(false);

        transactions.push(Transaction {
            date,
            merchant,
            amount,
            category,
            is_recurring_hint,
        });
    }

    Ok(transactions)
}

/// Parse a date string in the formats normalized exports use
fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    let s = s.trim();

    let formats = [
        "%Y-%m-%d", // 2024-01-15
        "%m/%d/%Y", // 01/15/2024
        "%m/%d/%y", // 01/15/24
    ];

    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    Err(format!("Unable to parse date: {}", s))
}

/// Parse an amount string, handling currency symbols and commas
fn parse_amount(s: &str) -> std::result::Result<f64, String> {
    let cleaned: String = s
        .trim()
        .replace(['$', ',', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    let value = cleaned
        .parse::<f64>()
        .map_err(|_| format!("Unable to parse amount: {}", s))?;

    if !value.is_finite() {
        return Err(format!("Amount is not finite: {}", s));
    }
    Ok(value)
}

//! Domain models for spendlens

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Categories treated as essential spend (never suggested as cuts)
pub const ESSENTIAL_CATEGORIES: &[&str] = &[
    "groceries",
    "grocery",
    "rent & housing",
    "health",
    "insurance",
    "bills & utilities",
    "education",
];

/// Categories treated as discretionary spend
pub const DISCRETIONARY_CATEGORIES: &[&str] = &[
    "dining",
    "delivery",
    "shopping",
    "entertainment",
    "personal care",
];

/// Category label for income deposits
pub const INCOME_CATEGORY: &str = "income";

/// Category label for transfers between own accounts
pub const TRANSFER_CATEGORY: &str = "transfer";

pub fn is_essential(category: &str) -> bool {
    ESSENTIAL_CATEGORIES.contains(&category_key(category).as_str())
}

pub fn is_discretionary(category: &str) -> bool {
    DISCRETIONARY_CATEGORIES.contains(&category_key(category).as_str())
}

/// A single normalized ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    #[serde(alias = "description")]
    pub merchant: String,
    /// Signed amount, expenses positive
    pub amount: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub is_recurring_hint: bool,
}

impl Transaction {
    pub fn new(
        date: NaiveDate,
        merchant: impl Into<String>,
        amount: f64,
        category: impl Into<String>,
    ) -> Self {
        Self {
            date,
            merchant: merchant.into(),
            amount,
            category: category.into(),
            is_recurring_hint: false,
        }
    }

    /// Mark as a provider-hinted recurring charge
    pub fn with_recurring_hint(mut self) -> Self {
        self.is_recurring_hint = true;
        self
    }

    pub fn is_income(&self) -> bool {
        self.category.trim().eq_ignore_ascii_case(INCOME_CATEGORY)
    }

    pub fn is_transfer(&self) -> bool {
        self.category.trim().eq_ignore_ascii_case(TRANSFER_CATEGORY)
    }

    /// Counted as spending: categorized, and neither income nor transfer
    pub fn is_spend(&self) -> bool {
        !self.category.trim().is_empty() && !self.is_income() && !self.is_transfer()
    }

    pub fn month(&self) -> YearMonth {
        YearMonth::of(self.date)
    }
}

/// Normalize a merchant description for grouping
///
/// Uppercases, strips processor noise (`*`, `#`) and keeps the first three words.
pub fn normalize_merchant(description: &str) -> String {
    description
        .to_uppercase()
        .replace(['*', '#'], " ")
        .split_whitespace()
        .take(3)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Calendar month used as the key for monthly aggregates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// First day of the month
    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    /// Long label such as "March 2024"
    pub fn label(&self) -> String {
        self.first_day()
            .map(|d| d.format("%B %Y").to_string())
            .unwrap_or_else(|| self.to_string())
    }

    /// Zero-based month index, for computing distances between months
    pub fn index(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("Invalid month: {}", s))?;
        let year: i32 = year.parse().map_err(|_| format!("Invalid month: {}", s))?;
        let month: u32 = month.parse().map_err(|_| format!("Invalid month: {}", s))?;
        if !(1..=12).contains(&month) {
            return Err(format!("Invalid month: {}", s));
        }
        Ok(Self { year, month })
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Confidence attached to a tool result or insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "HIGH",
            Confidence::Medium => "MEDIUM",
            Confidence::Low => "LOW",
        }
    }

    /// Numeric priority for sorting (higher = more trustworthy)
    pub fn priority(&self) -> u8 {
        match self {
            Confidence::High => 3,
            Confidence::Medium => 2,
            Confidence::Low => 1,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HIGH" => Ok(Confidence::High),
            "MEDIUM" => Ok(Confidence::Medium),
            "LOW" => Ok(Confidence::Low),
            _ => Err(format!("Unknown confidence: {}", s)),
        }
    }
}

/// An immutable, canonically ordered set of transactions
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    transactions: Vec<Transaction>,
}

impl Ledger {
    /// Build a ledger. Rows are sorted so results never depend on input order,
    /// and category spellings are unified.
    pub fn new(mut transactions: Vec<Transaction>) -> Self {
        transactions.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.merchant.cmp(&b.merchant))
                .then_with(|| a.amount.total_cmp(&b.amount))
                .then_with(|| a.category.cmp(&b.category))
        });
        unify_categories(&mut transactions);
        Self { transactions }
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn spending(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|t| t.is_spend())
    }

    pub fn income(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|t| t.is_income())
    }

    /// First and last transaction dates
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.transactions.first()?.date;
        let last = self.transactions.last()?.date;
        Some((first, last))
    }

    /// SHA-256 over the canonical rows
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for t in &self.transactions {
            hasher.update(
                format!(
                    "{}|{}|{:.2}|{}|{}\n",
                    t.date, t.merchant, t.amount, t.category, t.is_recurring_hint
                )
                .as_bytes(),
            );
        }
        hex::encode(hasher.finalize())
    }

    /// Seed for resampling, derived from the fingerprint
    pub fn seed(&self) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.fingerprint().as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Month x category spend totals over the months that contain spending
    pub fn monthly_pivot(&self) -> MonthlyPivot {
        MonthlyPivot::from_transactions(self.spending())
    }
}

/// Grouping key for a category: trimmed and lowercased
pub fn category_key(category: &str) -> String {
    category.trim().to_lowercase()
}

/// Rewrite categories that differ only by case or padding to the first
/// spelling seen in canonical order
fn unify_categories(transactions: &mut [Transaction]) {
    let mut spellings: HashMap<String, String> = HashMap::new();
    for t in transactions.iter_mut() {
        let trimmed = t.category.trim().to_string();
        let canonical = spellings
            .entry(category_key(&trimmed))
            .or_insert(trimmed)
            .clone();
        if t.category != canonical {
            t.category = canonical;
        }
    }
}

/// Monthly spend per category, aligned on a shared month index
///
/// Months are those with at least one spend row; categories missing in a month
/// are filled with zero.
#[derive(Debug, Clone, Default)]
pub struct MonthlyPivot {
    pub months: Vec<YearMonth>,
    pub columns: BTreeMap<String, Vec<f64>>,
}

impl MonthlyPivot {
    pub fn from_transactions<'a>(rows: impl Iterator<Item = &'a Transaction>) -> Self {
        let mut cells: BTreeMap<(String, YearMonth), f64> = BTreeMap::new();
        let mut months = BTreeSet::new();
        let mut categories = BTreeSet::new();

        for t in rows {
            let month = t.month();
            months.insert(month);
            categories.insert(t.category.clone());
            *cells.entry((t.category.clone(), month)).or_insert(0.0) += t.amount;
        }

        let months: Vec<YearMonth> = months.into_iter().collect();
        let columns = categories
            .into_iter()
            .map(|cat| {
                let series = months
                    .iter()
                    .map(|m| cells.get(&(cat.clone(), *m)).copied().unwrap_or(0.0))
                    .collect();
                (cat, series)
            })
            .collect();

        Self { months, columns }
    }

    pub fn series(&self, category: &str) -> Option<&[f64]> {
        self.columns.get(category).map(|v| v.as_slice())
    }

    /// Total spend per month across all categories
    pub fn totals(&self) -> Vec<f64> {
        (0..self.months.len())
            .map(|i| self.columns.values().map(|col| col[i]).sum())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }
}

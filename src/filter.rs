use crate::types::{
    ChurnStatus, CustomerRecord, CustomerTable, COL_BRANCH, COL_CONTRACT_ID, COL_CUSTOMER_NAME,
    COL_MONTHLY_FEE, COL_SALES_ZONE, COL_TECH_ZONE, COL_ZONE,
};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Monthly-fee band selected in the sidebar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PriceBucket {
    #[default]
    All,
    Under100k,
    Under300k,
    Over500k,
}

impl PriceBucket {
    pub const ALL: [PriceBucket; 4] = [
        PriceBucket::All,
        PriceBucket::Under100k,
        PriceBucket::Under300k,
        PriceBucket::Over500k,
    ];

    /// "Under" buckets keep `fee < bound`, "over" buckets keep `fee >= bound`.
    pub fn matches(&self, fee: f64) -> bool {
        match self {
            PriceBucket::All => true,
            PriceBucket::Under100k => fee < 100_000.0,
            PriceBucket::Under300k => fee < 300_000.0,
            PriceBucket::Over500k => fee >= 500_000.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PriceBucket::All => "전체",
            PriceBucket::Under100k => "10만 미만",
            PriceBucket::Under300k => "30만 미만",
            PriceBucket::Over500k => "50만 이상",
        }
    }
}

impl fmt::Display for PriceBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PriceBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "전체" | "all" => Ok(PriceBucket::All),
            "10만 미만" | "under-100k" => Ok(PriceBucket::Under100k),
            "30만 미만" | "under-300k" => Ok(PriceBucket::Under300k),
            "50만 이상" | "over-500k" => Ok(PriceBucket::Over500k),
            other => Err(format!("unknown price bucket: {other}")),
        }
    }
}

/// Every selection that narrows the customer table. The default keeps every
/// row. Used as a cache key, so it must stay `Hash + Eq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterParams {
    /// Keep only rows with a blank exclusion note.
    pub exclude_notes: bool,
    /// When false, pending-churn rows are hidden.
    pub include_churned: bool,
    /// Case-insensitive substring on customer name or contract id.
    pub search_text: String,
    pub price_bucket: PriceBucket,
    /// Membership filters. An empty set means "no restriction".
    pub branches: BTreeSet<String>,
    pub sales_zones: BTreeSet<String>,
    pub tech_zones: BTreeSet<String>,
    pub zones: BTreeSet<String>,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            exclude_notes: false,
            include_churned: true,
            search_text: String::new(),
            price_bucket: PriceBucket::All,
            branches: BTreeSet::new(),
            sales_zones: BTreeSet::new(),
            tech_zones: BTreeSet::new(),
            zones: BTreeSet::new(),
        }
    }
}

/// Which predicates can run against this table. A filter whose column is
/// missing from the source is switched off instead of failing.
struct ActiveColumns {
    customer_name: bool,
    contract_id: bool,
    fee: bool,
    branch: bool,
    sales_zone: bool,
    tech_zone: bool,
    zone: bool,
}

impl ActiveColumns {
    fn of(table: &CustomerTable) -> Self {
        Self {
            customer_name: table.has_column(COL_CUSTOMER_NAME),
            contract_id: table.has_column(COL_CONTRACT_ID),
            fee: table.has_column(COL_MONTHLY_FEE),
            branch: table.has_column(COL_BRANCH),
            sales_zone: table.has_column(COL_SALES_ZONE),
            tech_zone: table.has_column(COL_TECH_ZONE),
            zone: table.has_column(COL_ZONE),
        }
    }
}

/// Return indices (in table order) of the records that pass every active
/// filter. Pure: the table is never touched.
pub fn filtered_indices(table: &CustomerTable, params: &FilterParams) -> Vec<usize> {
    let cols = ActiveColumns::of(table);
    let needle = params.search_text.to_lowercase();
    table
        .records
        .iter()
        .enumerate()
        .filter(|(_, r)| passes(r, params, &cols, &needle))
        .map(|(i, _)| i)
        .collect()
}

fn passes(r: &CustomerRecord, p: &FilterParams, cols: &ActiveColumns, needle: &str) -> bool {
    if p.exclude_notes && r.is_excluded() {
        return false;
    }
    if !p.include_churned && r.churn_status != ChurnStatus::Active {
        return false;
    }
    if !needle.is_empty() && (cols.customer_name || cols.contract_id) {
        let hit = |present: bool, field: &str| present && field.to_lowercase().contains(needle);
        if !hit(cols.customer_name, &r.customer_name) && !hit(cols.contract_id, &r.contract_id) {
            return false;
        }
    }
    if cols.fee && !p.price_bucket.matches(r.numeric_fee) {
        return false;
    }
    member(cols.branch, &p.branches, &r.branch)
        && member(cols.sales_zone, &p.sales_zones, &r.sales_zone)
        && member(cols.tech_zone, &p.tech_zones, &r.tech_zone)
        && member(cols.zone, &p.zones, &r.zone)
}

fn member(column_present: bool, selected: &BTreeSet<String>, value: &str) -> bool {
    !column_present || selected.is_empty() || selected.contains(value)
}

/// Distinct non-empty branch names, sorted by name.
pub fn branch_options(table: &CustomerTable) -> Vec<String> {
    distinct(table, |r| &r.branch)
}

/// Distinct non-empty sales zones, sorted.
pub fn sales_zone_options(table: &CustomerTable) -> Vec<String> {
    distinct(table, |r| &r.sales_zone)
}

pub fn tech_zone_options(table: &CustomerTable) -> Vec<String> {
    distinct(table, |r| &r.tech_zone)
}

pub fn zone_options(table: &CustomerTable) -> Vec<String> {
    distinct(table, |r| &r.zone)
}

fn distinct<F>(table: &CustomerTable, field: F) -> Vec<String>
where
    F: Fn(&CustomerRecord) -> &String,
{
    table
        .records
        .iter()
        .map(field)
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

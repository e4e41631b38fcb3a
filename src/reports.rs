use crate::types::{
    BranchCountRow, ChurnStatus, CustomerPreviewRow, CustomerRecord, CustomerTable, KpiSummary,
    LegacyRegionRow, LegacyTable, MapMarker, COL_RETENTION_RATE,
};
use crate::util::{average, branch_rank, format_int, format_number};
use std::collections::{HashMap, HashSet};

fn rows<'a>(table: &'a CustomerTable, view: &'a [usize]) -> impl Iterator<Item = &'a CustomerRecord> {
    view.iter().filter_map(move |&i| table.records.get(i))
}

/// Headline figures for the filtered view.
pub fn kpis(table: &CustomerTable, view: &[usize]) -> KpiSummary {
    let mut contracts: HashSet<&str> = HashSet::new();
    let mut total_fee = 0.0;
    let mut pending = 0usize;
    let mut on_map = 0usize;
    let mut total_rows = 0usize;
    for r in rows(table, view) {
        total_rows += 1;
        if !r.contract_id.is_empty() {
            contracts.insert(r.contract_id.as_str());
        }
        total_fee += r.numeric_fee;
        if r.churn_status == ChurnStatus::PendingChurn {
            pending += 1;
        }
        if r.is_map_eligible() {
            on_map += 1;
        }
    }
    KpiSummary {
        total_rows,
        distinct_contracts: contracts.len(),
        total_monthly_fee: total_fee,
        total_monthly_fee_10k: total_fee / 10_000.0,
        pending_churn: pending,
        map_eligible: on_map,
    }
}

/// Customer count per branch, largest first. Ties keep branch priority.
pub fn branch_counts(table: &CustomerTable, view: &[usize]) -> Vec<BranchCountRow> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for r in rows(table, view) {
        *counts.entry(r.branch.as_str()).or_default() += 1;
    }
    let mut out: Vec<BranchCountRow> = counts
        .into_iter()
        .map(|(branch, customers)| BranchCountRow {
            branch: branch.to_string(),
            customers,
        })
        .collect();
    out.sort_by(|a, b| {
        b.customers
            .cmp(&a.customers)
            .then_with(|| branch_rank(&a.branch).cmp(&branch_rank(&b.branch)))
            .then_with(|| a.branch.cmp(&b.branch))
    });
    out
}

/// Markers for rows that have a real location. Pending-churn contracts are
/// drawn red, the rest blue.
pub fn map_markers(table: &CustomerTable, view: &[usize]) -> Vec<MapMarker> {
    rows(table, view)
        .filter(|r| r.is_map_eligible())
        .map(|r| {
            let pending = r.churn_status == ChurnStatus::PendingChurn;
            MapMarker {
                lat: r.latitude,
                lon: r.longitude,
                label: r.business_name.clone(),
                pending_churn: pending,
                color: if pending { "red" } else { "blue" },
            }
        })
        .collect()
}

pub fn preview_rows(table: &CustomerTable, view: &[usize]) -> Vec<CustomerPreviewRow> {
    rows(table, view)
        .map(|r| CustomerPreviewRow {
            customer_name: r.customer_name.clone(),
            business_name: r.business_name.clone(),
            contract_id: r.contract_id.clone(),
            branch: r.branch.clone(),
            monthly_fee: r.combined_monthly_fee.clone(),
            churn_status: r.churn_status.label().to_string(),
        })
        .collect()
}

/// Per-region totals of the legacy table, in region priority order.
///
/// The churn rate is recomputed from the summed counts; retention is the
/// mean of the per-zone rates (`-` when the table has none).
pub fn legacy_region_summary(table: &LegacyTable) -> Vec<LegacyRegionRow> {
    #[derive(Default)]
    struct Acc {
        zones: usize,
        target: u64,
        churn: u64,
        retention: Vec<f64>,
    }

    // Records are already sorted by region rank; keep first-seen order.
    let mut order: Vec<&str> = Vec::new();
    let mut map: HashMap<&str, Acc> = HashMap::new();
    for r in &table.records {
        let e = map.entry(r.region.as_str()).or_insert_with(|| {
            order.push(r.region.as_str());
            Acc::default()
        });
        e.zones += 1;
        e.target += r.target_count;
        e.churn += r.churn_count;
        if let Some(v) = r.retention_rate {
            e.retention.push(v);
        }
    }

    let has_retention = table.has_column(COL_RETENTION_RATE)
        || table.records.iter().any(|r| r.retention_rate.is_some());
    order
        .into_iter()
        .filter_map(|region| map.remove(region).map(|acc| (region, acc)))
        .map(|(region, acc)| {
            let rate = if acc.target == 0 {
                0.0
            } else {
                acc.churn as f64 / acc.target as f64 * 100.0
            };
            LegacyRegionRow {
                region: region.to_string(),
                zones: acc.zones,
                target: format_int(acc.target),
                churn: format_int(acc.churn),
                churn_rate: format_number(rate, 1),
                avg_retention: if has_retention && !acc.retention.is_empty() {
                    format_number(average(&acc.retention), 1)
                } else {
                    "-".to_string()
                },
            }
        })
        .collect()
}

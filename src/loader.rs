use crate::error::LoadError;
use crate::types::{
    ChurnStatus, CustomerRecord, CustomerTable, LegacyRecord, LegacyTable, RawCustomerRow,
    RawLegacyRow, COL_CHURN_RATE, COL_REGION, COL_RETENTION_RATE, COL_SUB_DISTRICT,
    COL_SUB_REGION, SUBTOTAL_MARKER,
};
use crate::util::{
    branch_rank, normalize_contract_id, parse_coordinate, parse_fee, parse_number_lenient, round1,
    strip_branch_suffix, to_count,
};
use calamine::{open_workbook_auto, Reader};
use chrono::Local;
use csv::{ReaderBuilder, StringRecord};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// First candidate that exists on disk.
pub fn resolve_source(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_file()).cloned()
}

/// Load the legacy regional performance table from the first existing
/// candidate (CSV is listed before XLSX).
pub fn load_legacy(candidates: &[PathBuf]) -> Result<LegacyTable, LoadError> {
    let Some(path) = resolve_source(candidates) else {
        return Err(LoadError::NotFound(candidates.to_vec()));
    };
    info!("loading legacy table from {}", path.display());
    let (columns, rows) = read_rows::<RawLegacyRow>(&path).map_err(|e| {
        warn!("{}", e);
        e
    })?;
    let total = rows.len();
    let (records, subtotals_dropped) = clean_legacy(&columns, rows);
    debug!(
        "legacy table: {} rows read, {} subtotal rows dropped",
        total, subtotals_dropped
    );
    Ok(LegacyTable {
        source: path,
        loaded_at: Local::now(),
        columns,
        records,
        subtotals_dropped,
    })
}

/// Turn raw legacy rows into typed records.
///
/// Returns the records sorted by region priority and the number of subtotal
/// rows that were dropped.
pub fn clean_legacy(
    columns: &HashSet<String>,
    rows: Vec<RawLegacyRow>,
) -> (Vec<LegacyRecord>, usize) {
    let has_region = columns.contains(COL_REGION);
    let has_churn_rate = columns.contains(COL_CHURN_RATE);
    let has_retention = columns.contains(COL_RETENTION_RATE);

    let mut dropped = 0usize;
    let kept: Vec<RawLegacyRow> = rows
        .into_iter()
        .filter(|row| {
            let subtotal =
                has_region && row.region.as_deref().map(str::trim) == Some(SUBTOTAL_MARKER);
            if subtotal {
                dropped += 1;
            }
            !subtotal
        })
        .collect();

    let mut churn_rates: Vec<f64> = kept
        .iter()
        .map(|r| parse_number_lenient(r.churn_rate.as_deref()))
        .collect();
    let mut retention_rates: Vec<f64> = kept
        .iter()
        .map(|r| parse_number_lenient(r.retention_rate.as_deref()))
        .collect();
    if has_churn_rate {
        normalize_percent_column(&mut churn_rates);
    }
    if has_retention {
        normalize_percent_column(&mut retention_rates);
    }

    let mut records: Vec<LegacyRecord> = kept
        .into_iter()
        .zip(churn_rates.into_iter().zip(retention_rates))
        .map(|(row, (churn_rate, retention_rate))| {
            let churn_rate = has_churn_rate.then_some(churn_rate);
            let retention_rate = if has_retention {
                Some(retention_rate)
            } else {
                churn_rate.map(|c| round1(100.0 - c))
            };
            LegacyRecord {
                region: row.region.unwrap_or_default().trim().to_string(),
                zone_code: row.zone_code.unwrap_or_default().trim().to_string(),
                target_count: to_count(parse_number_lenient(row.target.as_deref())),
                churn_count: to_count(parse_number_lenient(row.churn.as_deref())),
                churn_rate,
                retention_rate,
            }
        })
        .collect();

    records.sort_by_key(|r| branch_rank(&r.region));
    (records, dropped)
}

/// Rate columns arrive either as percentages (`5`, `5%`) or as fractions
/// (`0.05`). A column whose largest value is at most 1.0 is taken to be a
/// fraction and scaled to a percentage. A column of genuinely tiny
/// percentages (all ≤ 1%) is scaled too; that ambiguity is accepted.
pub fn normalize_percent_column(values: &mut [f64]) {
    let Some(max) = values.iter().copied().reduce(f64::max) else {
        return;
    };
    if max <= 1.0 {
        for v in values.iter_mut() {
            *v *= 100.0;
        }
    }
}

/// Load and enrich the customer DB.
pub fn load_customers(path: &Path) -> Result<CustomerTable, LoadError> {
    if !path.is_file() {
        return Err(LoadError::NotFound(vec![path.to_path_buf()]));
    }
    info!("loading customer DB from {}", path.display());
    let (columns, rows) = read_rows::<RawCustomerRow>(path).map_err(|e| {
        warn!("{}", e);
        e
    })?;
    let records = clean_customers(&columns, rows);
    debug!("customer DB: {} rows", records.len());
    Ok(CustomerTable {
        source: path.to_path_buf(),
        loaded_at: Local::now(),
        columns,
        records,
    })
}

/// Derive status, address, numeric fee and normalized branch for every raw
/// row, then order the rows by branch priority.
pub fn clean_customers(columns: &HashSet<String>, rows: Vec<RawCustomerRow>) -> Vec<CustomerRecord> {
    let has_sub_address = columns.contains(COL_SUB_REGION) && columns.contains(COL_SUB_DISTRICT);

    let mut records: Vec<CustomerRecord> = rows
        .into_iter()
        .map(|row| {
            let change_request = row.change_request.unwrap_or_default();
            let churn_status = ChurnStatus::from_change_request(&change_request);
            let district_address = if has_sub_address {
                format!(
                    "{} {}",
                    row.sub_region.unwrap_or_default(),
                    row.sub_district.unwrap_or_default()
                )
                .trim()
                .to_string()
            } else {
                row.install_address.unwrap_or_default()
            };
            let combined_monthly_fee = row.monthly_fee.unwrap_or_default();
            CustomerRecord {
                customer_name: row.customer_name.unwrap_or_default(),
                business_name: row.business_name.unwrap_or_default(),
                contract_id: normalize_contract_id(&row.contract_id.unwrap_or_default()),
                latitude: parse_coordinate(row.latitude.as_deref()),
                longitude: parse_coordinate(row.longitude.as_deref()),
                numeric_fee: parse_fee(&combined_monthly_fee),
                combined_monthly_fee,
                change_request,
                churn_status,
                exclusion_note: row.exclusion_note.unwrap_or_default(),
                district_address,
                branch: strip_branch_suffix(&row.branch.unwrap_or_default())
                    .trim()
                    .to_string(),
                sales_zone: row.sales_zone.unwrap_or_default(),
                tech_zone: row.tech_zone.unwrap_or_default(),
                zone: row.zone.unwrap_or_default(),
                map_link: row.map_link.unwrap_or_default(),
            }
        })
        .collect();

    records.sort_by_key(|r| branch_rank(&r.branch));
    records
}

/// Read every row of a CSV or XLSX file into `T`, along with the set of
/// headers the file carries.
fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<(HashSet<String>, Vec<T>), LoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "xlsx" | "xls" | "xlsm" | "ods" => read_workbook_rows(path),
        _ => read_csv_rows(path),
    }
}

fn read_csv_rows<T: DeserializeOwned>(path: &Path) -> Result<(HashSet<String>, Vec<T>), LoadError> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| LoadError::parse(path, e))?;
    let headers = dedupe_headers(rdr.headers().map_err(|e| LoadError::parse(path, e))?);
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| LoadError::parse(path, e))?;
        rows.push(
            record
                .deserialize::<T>(Some(&headers))
                .map_err(|e| LoadError::parse(path, e))?,
        );
    }
    Ok((header_set(&headers), rows))
}

/// The first worksheet is the table; its first row holds the headers.
/// Cells are rendered to text and deserialized through the same serde
/// models as the CSV path.
fn read_workbook_rows<T: DeserializeOwned>(
    path: &Path,
) -> Result<(HashSet<String>, Vec<T>), LoadError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| LoadError::parse(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| LoadError::parse(path, "workbook has no sheets"))?
        .map_err(|e| LoadError::parse(path, e))?;

    let mut sheet_rows = range.rows();
    let Some(header_cells) = sheet_rows.next() else {
        return Ok((HashSet::new(), Vec::new()));
    };
    let headers: StringRecord = header_cells.iter().map(|c| c.to_string()).collect();
    let headers = dedupe_headers(&headers);

    let mut rows = Vec::new();
    for cells in sheet_rows {
        let record: StringRecord = cells.iter().map(|c| c.to_string()).collect();
        rows.push(
            record
                .deserialize::<T>(Some(&headers))
                .map_err(|e| LoadError::parse(path, e))?,
        );
    }
    Ok((header_set(&headers), rows))
}

/// Rename repeated headers to `name.1`, `name.2`, ... so the first column
/// with a given name is the one that maps onto the row model. Also drops a
/// leading UTF-8 BOM from the names.
fn dedupe_headers(headers: &StringRecord) -> StringRecord {
    let mut seen: HashSet<String> = HashSet::new();
    headers
        .iter()
        .map(|h| {
            let name = h.trim_start_matches('\u{feff}');
            let mut candidate = name.to_string();
            let mut n = 0usize;
            while seen.contains(&candidate) {
                n += 1;
                candidate = format!("{name}.{n}");
            }
            seen.insert(candidate.clone());
            candidate
        })
        .collect()
}

fn header_set(headers: &StringRecord) -> HashSet<String> {
    headers.iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn legacy_end_to_end_row() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "papp.csv",
            "구분,대상,해지,해지율\n중앙,\"1,000\",50,5%\n소계,\"1,000\",50,5%\n",
        );
        let table = load_legacy(&[path]).unwrap();
        assert_eq!(table.subtotals_dropped, 1);
        assert_eq!(
            table.records,
            vec![LegacyRecord {
                region: "중앙".into(),
                zone_code: String::new(),
                target_count: 1000,
                churn_count: 50,
                churn_rate: Some(5.0),
                retention_rate: Some(95.0),
            }]
        );
    }

    #[test]
    fn legacy_prefers_csv_and_reports_missing() {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("papp.csv");
        let xlsx = dir.path().join("papp.xlsx");
        match load_legacy(&[csv.clone(), xlsx.clone()]) {
            Err(LoadError::NotFound(tried)) => assert_eq!(tried, vec![csv.clone(), xlsx.clone()]),
            other => panic!("expected NotFound, got {other:?}"),
        }
        write(&dir, "papp.csv", "구분,대상\n강북,10\n");
        assert_eq!(resolve_source(&[csv.clone(), xlsx]), Some(csv));
    }

    #[test]
    fn legacy_malformed_workbook_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "papp.xlsx", "this is not a zip archive");
        assert!(matches!(load_legacy(&[path]), Err(LoadError::Parse { .. })));
    }

    #[test]
    fn no_subtotal_rows_survive() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "papp.csv",
            "구분,구역,대상\n소계,,300\n고양,G1,100\n소계,,300\n원주,W1,200\n",
        );
        let table = load_legacy(&[path]).unwrap();
        assert!(table.records.iter().all(|r| r.region != SUBTOTAL_MARKER));
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records[0].zone_code, "G1");
    }

    #[test]
    fn padded_subtotal_rows_are_dropped() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "papp.csv",
            "구분,구역,대상\n강북,K1,100\n 소계 ,,100\n소계 ,,100\n",
        );
        let table = load_legacy(&[path]).unwrap();
        assert_eq!(table.subtotals_dropped, 2);
        assert_eq!(table.records.len(), 1);
        assert!(table.records.iter().all(|r| r.region != SUBTOTAL_MARKER));
    }

    #[test]
    fn workbook_rates_are_scaled_and_sorted() {
        use rust_xlsxwriter::Workbook;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("papp.xlsx");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, header) in ["구분", "구역", "대상", "해지율"].iter().enumerate() {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        let rows = [("원주", 201.0, 80.0, 0.05), ("소계", 0.0, 180.0, 0.1), ("중앙", 101.0, 100.0, 0.1)];
        for (i, (region, zone, target, rate)) in rows.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_string(row, 0, *region).unwrap();
            sheet.write_number(row, 1, *zone).unwrap();
            sheet.write_number(row, 2, *target).unwrap();
            sheet.write_number(row, 3, *rate).unwrap();
        }
        workbook.save(&path).unwrap();

        let table = load_legacy(&[dir.path().join("papp.csv"), path]).unwrap();
        assert_eq!(table.subtotals_dropped, 1);
        let regions: Vec<&str> = table.records.iter().map(|r| r.region.as_str()).collect();
        assert_eq!(regions, vec!["중앙", "원주"]);
        assert_eq!(table.records[0].zone_code, "101");
        assert_eq!(table.records[0].target_count, 100);
        assert_eq!(table.records[1].churn_rate, Some(5.0));
        assert_eq!(table.records[1].retention_rate, Some(95.0));
    }

    #[test]
    fn fractional_rate_column_is_scaled() {
        let columns: HashSet<String> = [COL_REGION, COL_CHURN_RATE].map(String::from).into();
        let rows = vec![
            RawLegacyRow { region: Some("중앙".into()), churn_rate: Some("0.05".into()), ..Default::default() },
            RawLegacyRow { region: Some("강북".into()), churn_rate: Some("0.125".into()), ..Default::default() },
        ];
        let (records, _) = clean_legacy(&columns, rows);
        assert_eq!(records[0].churn_rate, Some(5.0));
        assert_eq!(records[1].churn_rate, Some(12.5));
        assert_eq!(records[0].retention_rate, Some(95.0));
        assert_eq!(records[1].retention_rate, Some(87.5));
    }

    #[test]
    fn percentage_rate_column_is_left_alone() {
        let columns: HashSet<String> = [COL_CHURN_RATE].map(String::from).into();
        let rows = vec![
            RawLegacyRow { churn_rate: Some("0.5".into()), ..Default::default() },
            RawLegacyRow { churn_rate: Some("3.3%".into()), ..Default::default() },
        ];
        let (records, _) = clean_legacy(&columns, rows);
        assert_eq!(records[0].churn_rate, Some(0.5));
        assert_eq!(records[1].churn_rate, Some(3.3));
        assert_eq!(records[1].retention_rate, Some(96.7));
    }

    #[test]
    fn tiny_percentages_are_indistinguishable_from_fractions() {
        // Every churn rate is at most 1%, so the column reads as fractions.
        let columns: HashSet<String> = [COL_CHURN_RATE].map(String::from).into();
        let rows = vec![
            RawLegacyRow { churn_rate: Some("0.8%".into()), ..Default::default() },
            RawLegacyRow { churn_rate: Some("1%".into()), ..Default::default() },
        ];
        let (records, _) = clean_legacy(&columns, rows);
        assert_eq!(records[0].churn_rate, Some(80.0));
        assert_eq!(records[1].churn_rate, Some(100.0));
    }

    #[test]
    fn each_rate_column_is_judged_on_its_own() {
        let columns: HashSet<String> = [COL_CHURN_RATE, COL_RETENTION_RATE].map(String::from).into();
        let rows = vec![RawLegacyRow {
            churn_rate: Some("0.04".into()),
            retention_rate: Some("96".into()),
            ..Default::default()
        }];
        let (records, _) = clean_legacy(&columns, rows);
        assert_eq!(records[0].churn_rate, Some(4.0));
        assert_eq!(records[0].retention_rate, Some(96.0));
    }

    #[test]
    fn derived_retention_is_rounded_to_one_decimal() {
        let columns: HashSet<String> = [COL_CHURN_RATE].map(String::from).into();
        let rows = vec![RawLegacyRow { churn_rate: Some("12.345".into()), ..Default::default() }];
        let (records, _) = clean_legacy(&columns, rows);
        let churn = records[0].churn_rate.unwrap();
        assert_eq!(records[0].retention_rate, Some(round1(100.0 - churn)));
        assert_eq!(records[0].retention_rate, Some(87.7));
    }

    #[test]
    fn retention_stays_absent_without_churn_rate() {
        let columns: HashSet<String> = [COL_REGION].map(String::from).into();
        let rows = vec![RawLegacyRow { region: Some("중앙".into()), ..Default::default() }];
        let (records, _) = clean_legacy(&columns, rows);
        assert_eq!(records[0].churn_rate, None);
        assert_eq!(records[0].retention_rate, None);
    }

    #[test]
    fn unparsable_counts_become_zero() {
        let columns: HashSet<String> = [COL_REGION].map(String::from).into();
        let rows = vec![RawLegacyRow {
            region: Some("중앙".into()),
            target: Some("many".into()),
            churn: Some("-4".into()),
            ..Default::default()
        }];
        let (records, _) = clean_legacy(&columns, rows);
        assert_eq!(records[0].target_count, 0);
        assert_eq!(records[0].churn_count, 0);
    }

    #[test]
    fn empty_rate_column_is_untouched() {
        let mut empty: Vec<f64> = Vec::new();
        normalize_percent_column(&mut empty);
        assert!(empty.is_empty());
    }

    const DB_HEADER: &str = "관리고객명,상호,계약번호,위도,경도,합산월정료(KTT+KT),변경요청,군구,읍면동,담당부서2,영업구역정보\n";

    #[test]
    fn customer_rows_are_enriched() {
        let dir = TempDir::new().unwrap();
        let body = format!(
            "{DB_HEADER}홍길동,길동상회,52308742.0,37.5,127.0,\"150,000\", 삭제 ,종로구,청운동,원주지사,S1\n\
             김철수,철수네,1234,abc,,\"90,000\",,중구,,중앙지사,S2\n"
        );
        let path = write(&dir, "db.csv", &body);
        let table = load_customers(&path).unwrap();
        assert_eq!(table.len(), 2);

        let first = &table.records[0];
        assert_eq!(first.branch, "중앙");
        assert_eq!(first.contract_id, "1234");
        assert_eq!(first.latitude, 0.0);
        assert_eq!(first.longitude, 0.0);
        assert!(!first.is_map_eligible());
        assert_eq!(first.churn_status, ChurnStatus::Active);
        assert_eq!(first.district_address, "중구");
        assert_eq!(first.numeric_fee, 90000.0);

        let second = &table.records[1];
        assert_eq!(second.branch, "원주");
        assert_eq!(second.contract_id, "52308742");
        assert_eq!(second.churn_status, ChurnStatus::PendingChurn);
        assert_eq!(second.district_address, "종로구 청운동");
        assert_eq!(second.combined_monthly_fee, "150,000");
        assert_eq!(second.numeric_fee, 150000.0);
        assert!(second.is_map_eligible());
        assert_eq!(second.exclusion_note, "");
        assert_eq!(second.map_link, "");
    }

    #[test]
    fn repeated_header_keeps_first_column() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "db.csv",
            "관리고객명,상호,상호,계약번호\n홍길동,길동상회,길동상회(구),7\n",
        );
        let table = load_customers(&path).unwrap();
        assert_eq!(table.records[0].business_name, "길동상회");
        assert_eq!(table.records[0].contract_id, "7");
        assert!(table.has_column("상호"));
        assert!(table.has_column("상호.1"));
    }

    #[test]
    fn percent_fee_is_not_a_number() {
        let dir = TempDir::new().unwrap();
        let body = format!("{DB_HEADER}홍길동,길동상회,1,,,50%,,,,중앙지사,S1\n");
        let path = write(&dir, "db.csv", &body);
        let table = load_customers(&path).unwrap();
        assert_eq!(table.records[0].combined_monthly_fee, "50%");
        assert_eq!(table.records[0].numeric_fee, 0.0);
    }

    #[test]
    fn missing_change_request_column_means_active() {
        let columns: HashSet<String> = HashSet::new();
        let records = clean_customers(&columns, vec![RawCustomerRow::default()]);
        assert_eq!(records[0].churn_status, ChurnStatus::Active);
        assert_eq!(records[0].district_address, "");
    }

    #[test]
    fn address_falls_back_to_install_address() {
        let columns: HashSet<String> = [COL_SUB_REGION].map(String::from).into();
        let rows = vec![RawCustomerRow {
            sub_region: Some("종로구".into()),
            install_address: Some("서울 종로구 세종대로 1".into()),
            ..Default::default()
        }];
        let records = clean_customers(&columns, rows);
        assert_eq!(records[0].district_address, "서울 종로구 세종대로 1");
    }

    #[test]
    fn branches_follow_priority_then_source_order() {
        let rows: Vec<RawCustomerRow> = ["원주지사", "부산", "중앙지사", "강북", "대구", "중앙"]
            .iter()
            .enumerate()
            .map(|(i, b)| RawCustomerRow {
                branch: Some(b.to_string()),
                contract_id: Some(i.to_string()),
                ..Default::default()
            })
            .collect();
        let records = clean_customers(&HashSet::new(), rows);
        let order: Vec<(&str, &str)> = records
            .iter()
            .map(|r| (r.branch.as_str(), r.contract_id.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![("중앙", "2"), ("중앙", "5"), ("강북", "3"), ("원주", "0"), ("부산", "1"), ("대구", "4")]
        );
        assert!(records.iter().all(|r| !r.branch.contains("지사")));
    }

    #[test]
    fn missing_customer_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.csv");
        assert!(matches!(load_customers(&path), Err(LoadError::NotFound(_))));
    }
}

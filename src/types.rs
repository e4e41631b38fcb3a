use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tabled::Tabled;

// Source headers of the legacy regional performance file.
pub const COL_REGION: &str = "구분";
pub const COL_CHURN_RATE: &str = "해지율";
pub const COL_RETENTION_RATE: &str = "유지(방어)율";
/// Region value of aggregation rows.
pub const SUBTOTAL_MARKER: &str = "소계";

// Source headers of the customer DB.
pub const COL_CUSTOMER_NAME: &str = "관리고객명";
pub const COL_CONTRACT_ID: &str = "계약번호";
pub const COL_MONTHLY_FEE: &str = "합산월정료(KTT+KT)";
pub const COL_SUB_REGION: &str = "군구";
pub const COL_SUB_DISTRICT: &str = "읍면동";
pub const COL_BRANCH: &str = "담당부서2";
pub const COL_SALES_ZONE: &str = "영업구역정보";
pub const COL_TECH_ZONE: &str = "기술구역정보";
pub const COL_ZONE: &str = "구역정보";
/// Change-request text that marks a contract for cancellation.
pub const DELETION_MARKER: &str = "삭제";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawLegacyRow {
    #[serde(rename = "구분")]
    pub region: Option<String>,
    #[serde(rename = "구역", alias = "zone_code")]
    pub zone_code: Option<String>,
    #[serde(rename = "대상")]
    pub target: Option<String>,
    #[serde(rename = "해지")]
    pub churn: Option<String>,
    #[serde(rename = "해지율")]
    pub churn_rate: Option<String>,
    #[serde(rename = "유지(방어)율")]
    pub retention_rate: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyRecord {
    pub region: String,
    pub zone_code: String,
    pub target_count: u64,
    pub churn_count: u64,
    /// Percentage, 0..=100. `None` when the source has no churn-rate column.
    pub churn_rate: Option<f64>,
    /// Percentage, 0..=100. Derived from `churn_rate` when the source has
    /// no retention column.
    pub retention_rate: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct LegacyTable {
    pub source: PathBuf,
    pub loaded_at: DateTime<Local>,
    /// Headers present in the source file.
    pub columns: HashSet<String>,
    pub records: Vec<LegacyRecord>,
    /// Rows dropped as subtotals.
    pub subtotals_dropped: usize,
}

impl LegacyTable {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawCustomerRow {
    #[serde(rename = "관리고객명")]
    pub customer_name: Option<String>,
    #[serde(rename = "상호")]
    pub business_name: Option<String>,
    #[serde(rename = "계약번호")]
    pub contract_id: Option<String>,
    #[serde(rename = "위도")]
    pub latitude: Option<String>,
    #[serde(rename = "경도")]
    pub longitude: Option<String>,
    #[serde(rename = "합산월정료(KTT+KT)")]
    pub monthly_fee: Option<String>,
    #[serde(rename = "변경요청")]
    pub change_request: Option<String>,
    #[serde(rename = "비고(관리고객 제외)")]
    pub exclusion_note: Option<String>,
    #[serde(rename = "군구")]
    pub sub_region: Option<String>,
    #[serde(rename = "읍면동")]
    pub sub_district: Option<String>,
    #[serde(rename = "설치주소")]
    pub install_address: Option<String>,
    #[serde(rename = "담당부서2")]
    pub branch: Option<String>,
    #[serde(rename = "영업구역정보")]
    pub sales_zone: Option<String>,
    #[serde(rename = "기술구역정보")]
    pub tech_zone: Option<String>,
    #[serde(rename = "구역정보")]
    pub zone: Option<String>,
    #[serde(rename = "지도링크_URL")]
    pub map_link: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChurnStatus {
    #[serde(rename = "유지")]
    Active,
    #[serde(rename = "해지예정")]
    PendingChurn,
}

impl ChurnStatus {
    pub fn from_change_request(change_request: &str) -> Self {
        if change_request.trim() == DELETION_MARKER {
            ChurnStatus::PendingChurn
        } else {
            ChurnStatus::Active
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChurnStatus::Active => "유지",
            ChurnStatus::PendingChurn => "해지예정",
        }
    }
}

/// One customer contract. Serializes with the source headers plus the
/// derived columns, so exports line up with `db.csv`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerRecord {
    #[serde(rename = "관리고객명")]
    pub customer_name: String,
    #[serde(rename = "상호")]
    pub business_name: String,
    #[serde(rename = "계약번호")]
    pub contract_id: String,
    /// `0.0` means "no location".
    #[serde(rename = "위도")]
    pub latitude: f64,
    #[serde(rename = "경도")]
    pub longitude: f64,
    /// Display string as it appears in the source, e.g. `150,000`.
    #[serde(rename = "합산월정료(KTT+KT)")]
    pub combined_monthly_fee: String,
    #[serde(rename = "월정료_숫자")]
    pub numeric_fee: f64,
    #[serde(rename = "변경요청")]
    pub change_request: String,
    #[serde(rename = "해지여부")]
    pub churn_status: ChurnStatus,
    #[serde(rename = "비고(관리고객 제외)")]
    pub exclusion_note: String,
    #[serde(rename = "주소(지역)")]
    pub district_address: String,
    #[serde(rename = "담당부서2")]
    pub branch: String,
    #[serde(rename = "영업구역정보")]
    pub sales_zone: String,
    #[serde(rename = "기술구역정보")]
    pub tech_zone: String,
    #[serde(rename = "구역정보")]
    pub zone: String,
    #[serde(rename = "지도링크_URL")]
    pub map_link: String,
}

impl CustomerRecord {
    pub fn is_map_eligible(&self) -> bool {
        self.latitude > 0.0 && self.longitude > 0.0
    }

    pub fn is_excluded(&self) -> bool {
        !self.exclusion_note.trim().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CustomerTable {
    pub source: PathBuf,
    pub loaded_at: DateTime<Local>,
    /// Headers present in the source file.
    pub columns: HashSet<String>,
    /// Sorted by branch priority.
    pub records: Vec<CustomerRecord>,
}

impl CustomerTable {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct CustomerPreviewRow {
    #[serde(rename = "관리고객명")]
    #[tabled(rename = "관리고객명")]
    pub customer_name: String,
    #[serde(rename = "상호")]
    #[tabled(rename = "상호")]
    pub business_name: String,
    #[serde(rename = "계약번호")]
    #[tabled(rename = "계약번호")]
    pub contract_id: String,
    #[serde(rename = "담당부서2")]
    #[tabled(rename = "담당부서2")]
    pub branch: String,
    #[serde(rename = "합산월정료(KTT+KT)")]
    #[tabled(rename = "합산월정료(KTT+KT)")]
    pub monthly_fee: String,
    #[serde(rename = "해지여부")]
    #[tabled(rename = "해지여부")]
    pub churn_status: String,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct BranchCountRow {
    #[serde(rename = "지사")]
    #[tabled(rename = "지사")]
    pub branch: String,
    #[serde(rename = "고객수")]
    #[tabled(rename = "고객수")]
    pub customers: usize,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct LegacyRegionRow {
    #[serde(rename = "Region")]
    #[tabled(rename = "Region")]
    pub region: String,
    #[serde(rename = "Zones")]
    #[tabled(rename = "Zones")]
    pub zones: usize,
    #[serde(rename = "Target")]
    #[tabled(rename = "Target")]
    pub target: String,
    #[serde(rename = "Churn")]
    #[tabled(rename = "Churn")]
    pub churn: String,
    #[serde(rename = "ChurnRate")]
    #[tabled(rename = "ChurnRate")]
    pub churn_rate: String,
    #[serde(rename = "AvgRetention")]
    #[tabled(rename = "AvgRetention")]
    pub avg_retention: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct KpiSummary {
    pub total_rows: usize,
    pub distinct_contracts: usize,
    pub total_monthly_fee: f64,
    /// `total_monthly_fee` in units of 10,000 won.
    pub total_monthly_fee_10k: f64,
    pub pending_churn: usize,
    pub map_eligible: usize,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MapMarker {
    pub lat: f64,
    pub lon: f64,
    pub label: String,
    pub pending_churn: bool,
    pub color: &'static str,
}

// Entry point and high-level CLI flow.
//
// The menu mirrors the dashboard's sidebar:
// - [1] reloads the source files (changed files are also picked up on every
//   interaction),
// - [2] shows the 2026 customer DB view for the current filters,
// - [3] shows the legacy regional dashboard,
// - [4] edits the filters, [5] selects rows, [6] exports the current view.
mod cache;
mod config;
mod error;
mod filter;
mod loader;
mod output;
mod reports;
mod session;
mod types;
mod util;

use cache::{DataStore, FilterCache};
use config::{Config, FILTERED_EXPORT, KPI_EXPORT, LEGACY_EXPORT, MARKERS_EXPORT};
use filter::{branch_options, sales_zone_options, tech_zone_options, zone_options, FilterParams, PriceBucket};
use log::{error, info};
use session::Session;
use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};
use types::CustomerRecord;

const PREVIEW_ROWS: usize = 10;
/// Zoom used when centering on a single customer.
const FOCUS_ZOOM: u8 = 15;

/// Next trimmed line from `input`. `None` once the input is exhausted.
fn next_line<R: BufRead>(input: &mut R) -> Option<String> {
    let mut buf = String::new();
    match input.read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

fn read_input(prompt: &str) -> Option<String> {
    print!("{prompt}");
    let _ = io::stdout().flush();
    next_line(&mut io::stdin().lock())
}

/// Read a single line of input after printing `prompt`. Closed input reads
/// as an empty answer, which keeps the current value in every prompt.
fn read_line(prompt: &str) -> String {
    read_input(prompt).unwrap_or_default()
}

fn read_choice() -> Option<String> {
    read_input("Enter choice: ")
}

/// Y/N question. Empty input keeps `current`.
fn prompt_toggle(question: &str, current: bool) -> bool {
    loop {
        let hint = if current { "Y" } else { "N" };
        let resp = read_line(&format!("{question} (Y/N) [{hint}]: ")).to_uppercase();
        match resp.as_str() {
            "" => return current,
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

/// Pick any number of values from `options`, by position or by name.
/// `-` clears the selection, empty input keeps `current`.
fn prompt_multiselect(label: &str, options: &[String], current: &BTreeSet<String>) -> BTreeSet<String> {
    if options.is_empty() {
        return current.clone();
    }
    println!("{label}:");
    for (i, opt) in options.iter().enumerate() {
        let mark = if current.contains(opt) { "*" } else { " " };
        println!("  [{mark}] {}. {}", i + 1, opt);
    }
    let resp = read_line("Select (comma separated, '-' for all): ");
    if resp.is_empty() {
        return current.clone();
    }
    if resp == "-" {
        return BTreeSet::new();
    }
    resp.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .filter_map(|t| match t.parse::<usize>() {
            Ok(n) if (1..=options.len()).contains(&n) => Some(options[n - 1].clone()),
            Ok(_) => None,
            Err(_) => Some(t.to_string()),
        })
        .collect()
}

fn prompt_price(current: PriceBucket) -> PriceBucket {
    println!("월정료:");
    for (i, b) in PriceBucket::ALL.iter().enumerate() {
        let mark = if *b == current { "*" } else { " " };
        println!("  [{mark}] {}. {}", i + 1, b);
    }
    loop {
        let resp = read_line("Select: ");
        if resp.is_empty() {
            return current;
        }
        if let Ok(n) = resp.parse::<usize>() {
            if let Some(b) = PriceBucket::ALL.get(n.wrapping_sub(1)) {
                return *b;
            }
        }
        match resp.parse::<PriceBucket>() {
            Ok(b) => return b,
            Err(e) => println!("{e}"),
        }
    }
}

/// Handle option [1]: re-read both sources and report what is available.
fn handle_load(store: &mut DataStore) {
    store.invalidate();
    match store.customers() {
        Ok(t) => println!(
            "2026 관리고객 DB: {} rows from {} (loaded {})",
            util::format_int(t.len()),
            t.source.display(),
            t.loaded_at.format("%Y-%m-%d %H:%M:%S")
        ),
        Err(e) => println!("2026 관리고객 DB: no data ({e})"),
    }
    match store.legacy() {
        Ok(t) => println!(
            "기존 대시보드: {} rows from {} ({} subtotal rows dropped)",
            util::format_int(t.records.len()),
            t.source.display(),
            t.subtotals_dropped
        ),
        Err(e) => println!("기존 대시보드: no data ({e})"),
    }
    println!();
}

/// Handle option [2]: KPIs, branch distribution, map markers and the table
/// for the current filters.
fn handle_customer_view(store: &DataStore, cache: &mut FilterCache, session: &Session) {
    let table = match store.customers() {
        Ok(t) => t,
        Err(e) => {
            println!("No customer data available ({e}).\n");
            return;
        }
    };
    if table.is_empty() {
        println!("The customer DB has no rows.\n");
        return;
    }
    let view = cache.get_or_compute(store.generation(), table, &session.filters);

    let k = reports::kpis(table, view);
    println!("총 Rows: {}", util::format_int(k.total_rows));
    println!("계약 수: {}", util::format_int(k.distinct_contracts));
    println!("총 월정료: {} 만원", util::format_number(k.total_monthly_fee_10k, 0));
    println!("해지예정: {}\n", util::format_int(k.pending_churn));

    let markers = reports::map_markers(table, view);
    let red = markers.iter().filter(|m| m.pending_churn).count();
    println!(
        "Map: {} markers ({} red / {} blue), center ({:.4}, {:.4}) zoom {}\n",
        markers.len(),
        red,
        markers.len() - red,
        session.map_center.0,
        session.map_center.1,
        session.map_zoom
    );

    println!("지사별 고객수");
    output::preview_table_rows(&reports::branch_counts(table, view), usize::MAX);

    println!("관리고객 목록");
    output::preview_table_rows(&reports::preview_rows(table, view), PREVIEW_ROWS);

    for &pos in session.selected_rows() {
        if let Some(r) = view.get(pos).and_then(|&i| table.records.get(i)) {
            print_selected(pos, r);
        }
    }
}

fn print_selected(pos: usize, r: &CustomerRecord) {
    println!(
        "#{} {} / {} [{}] {} {}",
        pos + 1,
        r.customer_name,
        r.business_name,
        r.churn_status.label(),
        r.district_address,
        r.map_link
    );
}

/// Handle option [3]: the legacy regional dashboard.
fn handle_legacy_view(store: &DataStore) {
    match store.legacy() {
        Ok(t) => {
            println!(
                "기존 대시보드 ({}, loaded {})\n",
                t.source.display(),
                t.loaded_at.format("%Y-%m-%d %H:%M:%S")
            );
            output::preview_table_rows(&reports::legacy_region_summary(t), usize::MAX);
        }
        Err(e) => println!("No legacy data available ({e}).\n"),
    }
}

/// Handle option [4]: walk through every filter. Empty input keeps a value.
fn handle_edit_filters(store: &DataStore, session: &mut Session) {
    let Ok(table) = store.customers() else {
        println!("No customer data available.\n");
        return;
    };
    let cur = &session.filters;
    let search = read_line(&format!("검색 (고객명/계약번호) [{}] ('-' clears): ", cur.search_text));
    let search_text = match search.as_str() {
        "" => cur.search_text.clone(),
        "-" => String::new(),
        s => s.to_string(),
    };
    let next = FilterParams {
        search_text,
        exclude_notes: prompt_toggle("비고 제외", cur.exclude_notes),
        include_churned: prompt_toggle("해지예정 포함", cur.include_churned),
        price_bucket: prompt_price(cur.price_bucket),
        branches: prompt_multiselect("지사", &branch_options(table), &cur.branches),
        sales_zones: prompt_multiselect("영업구역", &sales_zone_options(table), &cur.sales_zones),
        tech_zones: prompt_multiselect("기술구역", &tech_zone_options(table), &cur.tech_zones),
        zones: prompt_multiselect("구역", &zone_options(table), &cur.zones),
    };
    info!("filters updated: {:?}", next);
    session.set_filters(next);
    println!();
}

/// Handle option [5]: select rows of the current view; the map centers on
/// the first selected customer that has a location.
fn handle_select(store: &DataStore, cache: &mut FilterCache, session: &mut Session) {
    let Ok(table) = store.customers() else {
        println!("No customer data available.\n");
        return;
    };
    let view = cache.get_or_compute(store.generation(), table, &session.filters);
    let resp = read_line(&format!("Row numbers 1-{} (comma separated): ", view.len()));
    let picked: Vec<usize> = resp
        .split(',')
        .filter_map(|t| t.trim().parse::<usize>().ok())
        .filter_map(|n| n.checked_sub(1))
        .collect();
    let kept = session.select_rows(&picked, view.len()).to_vec();
    let focus = kept
        .iter()
        .filter_map(|&pos| table.records.get(view[pos]))
        .find(|r| r.is_map_eligible());
    if let Some(r) = focus {
        session.set_viewport((r.latitude, r.longitude), FOCUS_ZOOM);
    }
    println!("{} rows selected.\n", kept.len());
}

/// Handle option [6]: write the filtered rows, markers, KPIs and the legacy
/// summary next to each other in the output directory.
fn handle_export(store: &DataStore, cache: &mut FilterCache, session: &Session) {
    let cfg: &Config = store.config();
    match store.customers() {
        Ok(table) => {
            let view = cache.get_or_compute(store.generation(), table, &session.filters);
            let rows: Vec<&CustomerRecord> = view.iter().filter_map(|&i| table.records.get(i)).collect();
            report_write(FILTERED_EXPORT, output::write_csv(&cfg.out_path(FILTERED_EXPORT), &rows));
            let markers = reports::map_markers(table, view);
            report_write(MARKERS_EXPORT, output::write_json(&cfg.out_path(MARKERS_EXPORT), &markers));
            let kpis = reports::kpis(table, view);
            report_write(KPI_EXPORT, output::write_json(&cfg.out_path(KPI_EXPORT), &kpis));
        }
        Err(e) => println!("Customer exports skipped ({e})."),
    }
    match store.legacy() {
        Ok(table) => {
            let summary = reports::legacy_region_summary(table);
            report_write(LEGACY_EXPORT, output::write_csv(&cfg.out_path(LEGACY_EXPORT), &summary));
        }
        Err(e) => println!("Legacy export skipped ({e})."),
    }
    println!();
}

fn report_write(name: &str, result: Result<(), Box<dyn std::error::Error>>) {
    match result {
        Ok(()) => println!("Saved {name}"),
        Err(e) => {
            error!("writing {name} failed: {e}");
            eprintln!("Write error: {}", e);
        }
    }
}

fn main() {
    env_logger::init();

    let config = Config::from_env(std::env::args().skip(1));
    info!("data dir {}, output dir {}", config.data_dir.display(), config.out_dir.display());
    let mut store = DataStore::open(config);
    let mut cache = FilterCache::default();
    let mut session = Session::default();

    loop {
        println!("KTT Premium Management System");
        println!("[1] Load the files");
        println!("[2] 2026 관리고객 DB");
        println!("[3] 기존 대시보드");
        println!("[4] Filters");
        println!("[5] Select rows");
        println!("[6] Export current view");
        println!("[0] Exit\n");
        let Some(choice) = read_choice() else {
            println!("\nExiting the program.");
            break;
        };
        if choice != "1" {
            store.refresh();
        }
        session.sync_generation(store.generation());
        match choice.as_str() {
            "1" => {
                handle_load(&mut store);
                session.sync_generation(store.generation());
            }
            "2" => {
                println!();
                handle_customer_view(&store, &mut cache, &session);
            }
            "3" => handle_legacy_view(&store),
            "4" => handle_edit_filters(&store, &mut session),
            "5" => handle_select(&store, &mut cache, &mut session),
            "6" => handle_export(&store, &mut cache, &session),
            "0" => {
                println!("Exiting the program.");
                break;
            }
            _ => println!("Invalid choice. Please enter 0-6.\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn exhausted_input_ends_the_menu() {
        let mut input = Cursor::new("2\n  0 \n");
        assert_eq!(next_line(&mut input).as_deref(), Some("2"));
        assert_eq!(next_line(&mut input).as_deref(), Some("0"));
        assert_eq!(next_line(&mut input), None);
        assert_eq!(next_line(&mut input), None);
    }

    #[test]
    fn blank_line_is_not_end_of_input() {
        let mut input = Cursor::new("\n");
        assert_eq!(next_line(&mut input).as_deref(), Some(""));
        assert_eq!(next_line(&mut input), None);
    }
}

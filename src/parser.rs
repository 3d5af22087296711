use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::types::{PropertyDetail, PropertyRecord};

static SEL_TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("invalid selector: table"));
static SEL_RESULTS_CLASS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.SearchResults").expect("invalid selector: results class"));
static SEL_RESULTS_ID: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table#SearchResults").expect("invalid selector: results id"));
static SEL_RESULTS_SUMMARY: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"table[summary*="Search Results"]"#).expect("invalid selector: results summary")
});
static SEL_TR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("invalid selector: tr"));
static SEL_TD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("invalid selector: td"));
static SEL_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td, th").expect("invalid selector: cell"));
static SEL_ROW_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("invalid selector: row link"));
static SEL_DIV: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div").expect("invalid selector: div"));

static RE_RESULT_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("(?i)result").expect("invalid regex: result class"));
static RE_NO_RESULTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("(?i)no.*records.*found|no.*results").expect("invalid regex: no results")
});
static RE_KEY_SEP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-z0-9]+").expect("invalid regex: key separator"));

/// Named detail-page sections pulled out as flattened long text.
const SECTION_NAMES: [&str; 5] = ["assessment", "ownership", "property", "tax", "legal"];
const SECTION_TEXT_LIMIT: usize = 500;

/// How the results-table lookup concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultsOutcome {
    /// A results table was located and parsed.
    Parsed,
    /// The portal reported that no records matched.
    NoRecordsMessage,
    /// Neither a results table nor a no-results message was present; the
    /// portal markup may have changed.
    TableMissing,
}

#[derive(Debug)]
pub struct SearchResults {
    pub records: Vec<PropertyRecord>,
    pub outcome: ResultsOutcome,
}

/// Extracts property records from a list-results page. Always returns a
/// (possibly empty) sequence; a missing table or an unparseable row never
/// aborts the surrounding parse.
pub fn parse_search_results(html: &str, base_url: &str) -> SearchResults {
    let document = Html::parse_document(html);
    let Some(table) = find_results_table(&document) else {
        let text = document.root_element().text().collect::<String>();
        return if RE_NO_RESULTS.is_match(&text) {
            info!("no records found for search");
            SearchResults {
                records: Vec::new(),
                outcome: ResultsOutcome::NoRecordsMessage,
            }
        } else {
            warn!("could not locate results table in response");
            SearchResults {
                records: Vec::new(),
                outcome: ResultsOutcome::TableMissing,
            }
        };
    };

    let timestamp = Utc::now().to_rfc3339();
    let mut records = Vec::new();
    // First row is the header row.
    for row in table.select(&SEL_TR).skip(1) {
        match parse_result_row(row, base_url, &timestamp) {
            Some(record) => records.push(record),
            None => debug!("skipping result row with insufficient data"),
        }
    }
    SearchResults {
        records,
        outcome: ResultsOutcome::Parsed,
    }
}

fn find_results_table<'a>(document: &'a Html) -> Option<ElementRef<'a>> {
    if let Some(table) = document.select(&SEL_RESULTS_CLASS).next() {
        return Some(table);
    }
    if let Some(table) = document.select(&SEL_RESULTS_ID).next() {
        return Some(table);
    }
    if let Some(table) = document.select(&SEL_TABLE).find(|table| {
        table
            .value()
            .attr("class")
            .is_some_and(|class| RE_RESULT_CLASS.is_match(class))
    }) {
        return Some(table);
    }
    document.select(&SEL_RESULTS_SUMMARY).next()
}

/// Columns map positionally: parcel id, owner, address, tax value. Rows with
/// fewer than two data cells carry nothing usable and are dropped.
fn parse_result_row(row: ElementRef<'_>, base_url: &str, timestamp: &str) -> Option<PropertyRecord> {
    let mut cells = row.select(&SEL_TD).map(cell_text).fuse();
    let parcel_id = cells.next()?;
    let owner_name = cells.next()?;
    let property_address = cells.next();
    let tax_value = cells.next();

    let detail_url = row
        .select(&SEL_ROW_LINK)
        .next()
        .and_then(|link| link.value().attr("href"))
        .map(|href| resolve_detail_url(href, base_url));

    Some(PropertyRecord {
        parcel_id,
        owner_name,
        property_address,
        tax_value,
        detail_url,
        search_timestamp: timestamp.to_string(),
    })
}

fn resolve_detail_url(href: &str, base_url: &str) -> String {
    if href.starts_with('/') {
        format!("{base_url}{href}")
    } else if !href.starts_with("http") {
        format!("{base_url}/{href}")
    } else {
        href.to_string()
    }
}

/// Extracts a flat label/value mapping plus the named long-text sections
/// from a parcel detail page. Parsing itself cannot fail; fetch-level
/// failures are handled by the caller.
pub fn parse_property_detail(html: &str, detail_url: &str) -> PropertyDetail {
    let document = Html::parse_document(html);
    let mut detail = PropertyDetail::new(detail_url);

    for table in document.select(&SEL_TABLE) {
        for row in table.select(&SEL_TR) {
            let cells: Vec<ElementRef> = row.select(&SEL_CELL).collect();
            if cells.len() != 2 {
                continue;
            }
            let key = normalize_label(&cell_text(cells[0]));
            let value = cell_text(cells[1]);
            if !key.is_empty() && !value.is_empty() {
                // Later rows overwrite earlier ones; downstream consumers
                // rely on the last occurrence winning.
                detail.fields.insert(key, value);
            }
        }
    }

    for section in SECTION_NAMES {
        let container = document.select(&SEL_DIV).find(|div| {
            div.value()
                .attr("class")
                .is_some_and(|class| class.to_ascii_lowercase().contains(section))
        });
        if let Some(div) = container {
            let text = flatten_text(div);
            detail
                .fields
                .insert(format!("{section}_info"), truncate_chars(&text, SECTION_TEXT_LIMIT));
        }
    }

    detail
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

fn flatten_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `"Land Value:"` becomes `land_value`: trailing colon trimmed, lowercased,
/// runs of non-alphanumerics collapsed to a single underscore.
fn normalize_label(label: &str) -> String {
    let lowered = label.trim().trim_end_matches(':').to_lowercase();
    RE_KEY_SEP
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

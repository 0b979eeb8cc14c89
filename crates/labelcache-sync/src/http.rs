//! HTTP client for the TTB COLA public registry search.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use labelcache_core::normalize::COMPLETED_DATE_FORMAT;
use labelcache_core::{REGISTRY_BASE_URL, RawRow};
use scraper::{ElementRef, Html, Selector};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::registry::{ApprovalQuery, RegistryError, RegistrySource};

/// Columns in a registry result row, in page order.
const RESULT_COLUMNS: usize = 10;

const NO_RESULTS_MARKER: &str = "No results were found";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Minimum gap between successive requests.
    pub request_delay: Duration,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: REGISTRY_BASE_URL.to_string(),
            request_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
            user_agent: concat!("labelcache/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Registry search client.
///
/// Requests are serialised and spaced at least `request_delay` apart.
pub struct TtbClient {
    client: reqwest::Client,
    base_url: String,
    request_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl TtbClient {
    /// The registry serves a certificate chain that fails validation, so
    /// certificate checks are disabled for this client.
    pub fn new(config: ClientConfig) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_delay: config.request_delay,
            last_request: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.request_delay {
                tokio::time::sleep(self.request_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl RegistrySource for TtbClient {
    async fn fetch_approvals(&self, query: &ApprovalQuery) -> Result<Vec<RawRow>, RegistryError> {
        let url = format!(
            "{}/publicSearchColasBasicProcess.do?action=search",
            self.base_url
        );
        let form = search_form(query, Utc::now().date_naive());

        self.pace().await;
        info!(
            url = %url,
            category = ?query.category,
            brand = ?query.brand,
            months_back = query.months_back,
            limit = query.limit,
            "searching registry"
        );
        let resp = self.client.post(&url).form(&form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RegistryError::Server {
                status: status.as_u16(),
            });
        }

        let html = resp.text().await?;
        let rows = parse_search_results(&html, query.limit)?;
        info!(count = rows.len(), "registry rows retrieved");
        Ok(rows)
    }
}

/// Form fields for a completed-date search ending on `today`.
pub(crate) fn search_form(query: &ApprovalQuery, today: NaiveDate) -> Vec<(&'static str, String)> {
    let from = today - chrono::Duration::days(i64::from(query.months_back) * 30);
    let mut form = vec![
        (
            "searchCriteria.dateCompletedFrom",
            from.format(COMPLETED_DATE_FORMAT).to_string(),
        ),
        (
            "searchCriteria.dateCompletedTo",
            today.format(COMPLETED_DATE_FORMAT).to_string(),
        ),
        (
            "searchCriteria.productOrFancifulName",
            query.brand.clone().unwrap_or_default(),
        ),
        ("searchCriteria.productNameSearchType", "E".to_string()),
    ];
    if let Some(category) = query.category {
        let (lo, hi) = category.code_range();
        form.push(("searchCriteria.classTypeFrom", lo.to_string()));
        form.push(("searchCriteria.classTypeTo", hi.to_string()));
    }
    form
}

/// Extract up to `limit` raw rows from a registry results page.
///
/// A page without a results table is an empty result, not an error.
pub fn parse_search_results(html: &str, limit: usize) -> Result<Vec<RawRow>, RegistryError> {
    if html.contains(NO_RESULTS_MARKER) {
        return Ok(Vec::new());
    }

    let document = Html::parse_document(html);
    let table_sel = selector("table")?;
    let tr_sel = selector("tr")?;
    let td_sel = selector("td")?;
    let a_sel = selector("a")?;

    // Layout tables wrap the results table, so the innermost match wins.
    let Some(table) = document
        .select(&table_sel)
        .filter(|t| {
            let text: String = t.text().collect();
            text.contains("TTB ID") && text.contains("Brand Name") && text.contains("Class/Type")
        })
        .last()
    else {
        debug!("no results table on page");
        return Ok(Vec::new());
    };

    let mut rows = Vec::new();
    for tr in table.select(&tr_sel) {
        if rows.len() >= limit {
            break;
        }
        let cells: Vec<ElementRef> = tr.select(&td_sel).collect();
        if cells.len() < RESULT_COLUMNS {
            continue;
        }
        let detail_href = cells[0]
            .select(&a_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string);
        rows.push(RawRow {
            ttb_id: cell_text(cells[0]),
            permit_no: cell_text(cells[1]),
            serial_number: cell_text(cells[2]),
            completed_date: cell_text(cells[3]),
            fanciful_name: cell_text(cells[4]),
            brand_name: cell_text(cells[5]),
            origin_code: cell_text(cells[6]),
            origin_desc: cell_text(cells[7]),
            class_type_code: cell_text(cells[8]),
            class_type_desc: cell_text(cells[9]),
            detail_href,
        });
    }
    Ok(rows)
}

fn selector(css: &str) -> Result<Selector, RegistryError> {
    Selector::parse(css).map_err(|e| RegistryError::Parse(e.to_string()))
}

fn cell_text(cell: ElementRef) -> String {
    cell.text().collect::<String>().trim().to_string()
}

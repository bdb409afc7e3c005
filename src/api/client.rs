use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;

use crate::config::ApiSettings;
use crate::model::AreaLevel;

/// One raw row from the upstream API, shaped by our query structure.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiCaseRow {
    #[serde(rename = "Date")]
    pub date: String,
    pub name: String,
    pub code: String,
    #[serde(rename = "type")]
    pub area_type: String,
    #[serde(rename = "Cases")]
    pub cases: Option<f64>,
    #[serde(rename = "Tests")]
    pub tests: Option<f64>,
    #[serde(rename = "HospitalCases")]
    pub hospital_cases: Option<f64>,
    #[serde(rename = "Deaths28")]
    pub deaths_28d: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    next: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PaginatedResponse {
    data: Vec<ApiCaseRow>,
    pagination: Pagination,
}

/// Client for the upstream paginated statistics API.
///
/// Data fetches fail softly: any bad status, timeout or decode error
/// yields an empty result so the caller can retry, while a hard crash is
/// reserved for local faults. The freshness probe reads only the
/// Last-Modified header.
pub struct CasesApiClient {
    http: reqwest::Client,
    base_url: String,
    data_timeout: Duration,
    probe_timeout: Duration,
}

impl CasesApiClient {
    pub fn new(settings: &ApiSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: settings.base_url.clone(),
            data_timeout: Duration::from_secs(settings.data_timeout_secs),
            probe_timeout: Duration::from_secs(settings.probe_timeout_secs),
        })
    }

    /// API query structure (response field mapping) for a hierarchy level.
    ///
    /// Nation reports cases by publish date; every other level reports by
    /// specimen date.
    pub fn query_structure(level: AreaLevel) -> serde_json::Value {
        let cases_field = match level {
            AreaLevel::Nation => "newCasesByPublishDate",
            _ => "newCasesBySpecimenDate",
        };

        json!({
            "Date": "date",
            "name": "areaName",
            "code": "areaCode",
            "type": "areaType",
            "Cases": cases_field,
            "Tests": "newTestsByPublishDate",
            "HospitalCases": "hospitalCases",
            "Deaths28": "newDeaths28DaysByPublishDate",
        })
    }

    /// API filter predicates selecting one hierarchy level and one month
    /// (yyyy-mm).
    pub fn month_filters(level: AreaLevel, month: &str) -> Vec<String> {
        vec![
            format!("areaType={}", level.api_name()),
            format!("date>={month}-01"),
            format!("date<={month}-31"),
        ]
    }

    /// Fetches all pages for the given filters and structure, following
    /// the pagination cursor until it is null.
    ///
    /// Returns an empty vector on any upstream failure so the caller can
    /// distinguish "no data, retry" from a hard error.
    pub async fn fetch_paginated(
        &self,
        filters: &[String],
        structure: &serde_json::Value,
    ) -> Vec<ApiCaseRow> {
        let filters = filters.join(";");
        let structure = structure.to_string();

        let mut data = Vec::new();
        let mut page_number: u32 = 1;

        loop {
            let response = self
                .http
                .get(&self.base_url)
                .query(&[
                    ("filters", filters.as_str()),
                    ("structure", structure.as_str()),
                    ("format", "json"),
                    ("page", &page_number.to_string()),
                ])
                .timeout(self.data_timeout)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    warn!("API request failed: {e}");
                    return Vec::new();
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::NO_CONTENT {
                break;
            }
            if status.is_client_error() || status.is_server_error() {
                warn!(
                    "API request failed: {} {}",
                    status,
                    response.text().await.unwrap_or_default()
                );
                return Vec::new();
            }

            let current: PaginatedResponse = match response.json().await {
                Ok(body) => body,
                Err(e) => {
                    warn!("Failed to decode API response: {e}");
                    return Vec::new();
                }
            };

            data.extend(current.data);

            if current.pagination.next.is_none() {
                break;
            }

            page_number += 1;
        }

        data
    }

    /// Checks the upstream Last-Modified timestamp with a metadata-only
    /// query. Returns `None` when the API is unreachable or the header is
    /// missing/unparseable, which callers treat as "no new data".
    pub async fn last_modified(&self) -> Option<NaiveDateTime> {
        info!("Checking API data status...");

        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("filters", "areaType=nation;areaName=england"),
                ("structure", "{\"name\":\"areaName\"}"),
            ])
            .timeout(self.probe_timeout)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!("API status probe failed: {e}");
                return None;
            }
        };

        info!("API response code {}", response.status());
        if !response.status().is_success() {
            return None;
        }

        let header = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)?
            .to_str()
            .ok()?;

        match DateTime::parse_from_rfc2822(header) {
            Ok(ts) => Some(ts.naive_utc()),
            Err(e) => {
                warn!("Unparseable Last-Modified header {header:?}: {e}");
                None
            }
        }
    }
}

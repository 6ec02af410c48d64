#[macro_use] extern crate log;

pub mod task;
pub mod waterml;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use reqwest::Client;

pub use task::{spawn_cancellable, FetchHandle, FetchOutcome};
pub use waterml::{DataPoint, SiteInfo, TimeSeries};

/// CUAHSI WaterOneFlow 1.1 SOAP namespace
const WOF_NAMESPACE: &str = "http://www.cuahsi.org/his/1.1/ws/";

/// Default MWRA HydroServer endpoint
pub const MWRA_ENDPOINT: &str = "https://hydroportal.cuahsi.org/MWRA/cuahsi_1_1.asmx";

/// Which values to request: a site, a variable and an inclusive date range
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesQuery {
    pub site_code: String,
    pub variable_code: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl ValuesQuery {
    pub fn new(
        site_code: impl Into<String>,
        variable_code: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self> {
        let query = Self {
            site_code: site_code.into(),
            variable_code: variable_code.into(),
            start_date,
            end_date,
        };
        query.validate()?;
        Ok(query)
    }

    /// Parse `YYYY-MM-DD` dates, as passed on the command line or in config
    pub fn from_strings(site_code: &str, variable_code: &str, start: &str, end: &str) -> Result<Self> {
        let start_date = NaiveDate::parse_from_str(start, "%Y-%m-%d")
            .with_context(|| format!("invalid start date: {}", start))?;
        let end_date = NaiveDate::parse_from_str(end, "%Y-%m-%d")
            .with_context(|| format!("invalid end date: {}", end))?;
        Self::new(site_code, variable_code, start_date, end_date)
    }

    fn validate(&self) -> Result<()> {
        if self.site_code.trim().is_empty() {
            return Err(anyhow!("site code must not be empty"));
        }
        if self.variable_code.trim().is_empty() {
            return Err(anyhow!("variable code must not be empty"));
        }
        if self.start_date > self.end_date {
            return Err(anyhow!(
                "start date {} is after end date {}",
                self.start_date,
                self.end_date
            ));
        }
        Ok(())
    }
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn soap_envelope(body: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<soap:Envelope xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
            r#"xmlns:xsd="http://www.w3.org/2001/XMLSchema" "#,
            r#"xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">"#,
            "<soap:Body>{}</soap:Body></soap:Envelope>"
        ),
        body
    )
}

/// SOAP request body for `GetValuesObject`
pub fn build_get_values_envelope(query: &ValuesQuery) -> String {
    soap_envelope(&format!(
        concat!(
            r#"<GetValuesObject xmlns="{}">"#,
            "<location>{}</location>",
            "<variable>{}</variable>",
            "<startDate>{}</startDate>",
            "<endDate>{}</endDate>",
            "<authToken></authToken>",
            "</GetValuesObject>"
        ),
        WOF_NAMESPACE,
        xml_escape(&query.site_code),
        xml_escape(&query.variable_code),
        query.start_date.format("%Y-%m-%d"),
        query.end_date.format("%Y-%m-%d"),
    ))
}

/// SOAP request body for `GetSitesObject`, asking for every site
pub fn build_get_sites_envelope() -> String {
    soap_envelope(&format!(
        r#"<GetSitesObject xmlns="{}"><site></site><authToken></authToken></GetSitesObject>"#,
        WOF_NAMESPACE
    ))
}

/// Client for a CUAHSI HydroServer speaking WaterOneFlow 1.1
#[derive(Clone)]
pub struct HydroServerAPI {
    client: Client,
    endpoint: String,
}

impl HydroServerAPI {
    /// Create a client for `endpoint`; a trailing `?WSDL` is ignored
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = endpoint
            .trim()
            .trim_end_matches("?WSDL")
            .trim_end_matches("?wsdl")
            .to_string();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(anyhow!("HydroServer endpoint must be an http(s) URL: {}", endpoint));
        }
        Ok(Self {
            client: Client::new(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, action: &str, envelope: String) -> Result<String> {
        let soap_action = format!("\"{}{}\"", WOF_NAMESPACE, action);
        debug!("POST {} ({})", self.endpoint, action);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", soap_action)
            .body(envelope)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            error!("{} failed with status {}", action, status);
            return Err(anyhow!("{} request failed: HTTP {} - {}", action, status, error_text));
        }

        Ok(response.text().await?)
    }

    /// Fetch the values of one variable at one site over the query's date range
    pub async fn get_values(&self, query: &ValuesQuery) -> Result<TimeSeries> {
        query.validate()?;
        info!(
            "Fetching {} at {} from {} to {}",
            query.variable_code, query.site_code, query.start_date, query.end_date
        );
        let xml = self.call("GetValuesObject", build_get_values_envelope(query)).await?;
        let series = waterml::parse_values(&xml)
            .with_context(|| format!("failed to parse values for {}", query.site_code))?;
        info!("Received {} values", series.points.len());
        Ok(series)
    }

    /// List every site published by the server
    pub async fn get_sites(&self) -> Result<Vec<SiteInfo>> {
        let xml = self.call("GetSitesObject", build_get_sites_envelope()).await?;
        waterml::parse_sites(&xml)
    }
}

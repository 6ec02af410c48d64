//! WaterML 1.1 response parsing.
//!
//! Responses are walked with `scraper`, which lowercases element and
//! attribute names, so every selector below is written in lowercase.

use anyhow::{anyhow, Result};
use chrono::NaiveDateTime;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// One observation of a time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub date_time: NaiveDateTime,
    pub value: f64,
}

/// Values returned by `GetValuesObject` for one site and variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub site_code: String,
    pub variable_code: String,
    pub variable_name: Option<String>,
    pub unit: Option<String>,
    pub no_data_value: Option<f64>,
    pub points: Vec<DataPoint>,
}

impl TimeSeries {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn datetimes(&self) -> Vec<NaiveDateTime> {
        self.points.iter().map(|p| p.date_time).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Smallest and largest value, `None` for an empty series
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.points.iter().fold(None, |acc, p| match acc {
            None => Some((p.value, p.value)),
            Some((lo, hi)) => Some((lo.min(p.value), hi.max(p.value))),
        })
    }

    /// First and last timestamp, `None` for an empty series
    pub fn time_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let first = self.points.iter().map(|p| p.date_time).min()?;
        let last = self.points.iter().map(|p| p.date_time).max()?;
        Some((first, last))
    }
}

/// Site description returned by `GetSitesObject`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteInfo {
    pub site_code: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

fn selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| anyhow!("invalid selector {}: {:?}", s, e))
}

fn text_of(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(scope: ElementRef, sel: &Selector) -> Option<String> {
    scope.select(sel).next().map(text_of).filter(|s| !s.is_empty())
}

/// Join a code with its network/vocabulary prefix, the "full code" HydroServer expects
fn full_code(element: ElementRef, prefix_attr: &str) -> String {
    let code = text_of(element);
    match element.value().attr(prefix_attr) {
        Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, code),
        _ => code,
    }
}

/// Parse a WaterML `dateTime` attribute
pub fn parse_date_time(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    const FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| anyhow!("unrecognized dateTime: {}", raw))
}

/// Parse the body of a `GetValuesObject` response.
///
/// Points equal to the series' `noDataValue` are dropped, as are entries with
/// an unreadable timestamp or value. The returned points keep response order.
pub fn parse_values(xml: &str) -> Result<TimeSeries> {
    let document = Html::parse_document(xml);

    let series_sel = selector("timeseries")?;
    let series = document
        .select(&series_sel)
        .next()
        .ok_or_else(|| anyhow!("response contains no timeSeries element"))?;

    let site_code_sel = selector("sourceinfo sitecode")?;
    let variable_code_sel = selector("variable variablecode")?;
    let variable_name_sel = selector("variable variablename")?;
    let unit_sel = selector("variable unit unitabbreviation")?;
    let no_data_sel = selector("variable nodatavalue")?;
    let value_sel = selector("values > value")?;

    let site_code = series
        .select(&site_code_sel)
        .next()
        .map(|e| full_code(e, "network"))
        .unwrap_or_default();
    let variable_code = series
        .select(&variable_code_sel)
        .next()
        .map(|e| full_code(e, "vocabulary"))
        .unwrap_or_default();
    let variable_name = first_text(series, &variable_name_sel);
    let unit = first_text(series, &unit_sel);
    let no_data_value = first_text(series, &no_data_sel).and_then(|s| s.parse::<f64>().ok());

    let mut points = Vec::new();
    let mut skipped = 0usize;
    for element in series.select(&value_sel) {
        let date_time = match element.value().attr("datetime").map(parse_date_time) {
            Some(Ok(dt)) => dt,
            _ => {
                skipped += 1;
                continue;
            }
        };
        let value = match text_of(element).parse::<f64>() {
            Ok(v) => v,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        if no_data_value == Some(value) {
            skipped += 1;
            continue;
        }
        points.push(DataPoint { date_time, value });
    }

    if skipped > 0 {
        warn!("skipped {} unusable values for {} {}", skipped, site_code, variable_code);
    }
    debug!("parsed {} values for {} {}", points.len(), site_code, variable_code);

    Ok(TimeSeries {
        site_code,
        variable_code,
        variable_name,
        unit,
        no_data_value,
        points,
    })
}

/// Parse the body of a `GetSitesObject` response
pub fn parse_sites(xml: &str) -> Result<Vec<SiteInfo>> {
    let document = Html::parse_document(xml);

    let site_sel = selector("site > siteinfo")?;
    let name_sel = selector("sitename")?;
    let code_sel = selector("sitecode")?;
    let lat_sel = selector("geoglocation latitude")?;
    let lon_sel = selector("geoglocation longitude")?;

    let mut sites = Vec::new();
    for info in document.select(&site_sel) {
        let code = match info.select(&code_sel).next() {
            Some(e) => full_code(e, "network"),
            None => continue,
        };
        let lat = first_text(info, &lat_sel).and_then(|s| s.parse::<f64>().ok());
        let lon = first_text(info, &lon_sel).and_then(|s| s.parse::<f64>().ok());
        let (lat, lon) = match (lat, lon) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => {
                warn!("site {} has no usable location, skipping", code);
                continue;
            }
        };
        sites.push(SiteInfo {
            site_code: code,
            name: first_text(info, &name_sel).unwrap_or_default(),
            lat,
            lon,
        });
    }
    Ok(sites)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const VALUES_RESPONSE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <GetValuesObjectResponse xmlns="http://www.cuahsi.org/his/1.1/ws/">
      <timeSeriesResponse xmlns="http://www.cuahsi.org/waterML/1.1/">
        <queryInfo><criteria MethodCalled="GetValuesObject"/></queryInfo>
        <timeSeries>
          <sourceInfo>
            <siteName>Carson Beach</siteName>
            <siteCode network="MWRA" siteID="36">36</siteCode>
          </sourceInfo>
          <variable>
            <variableCode vocabulary="MWRA" variableID="4">Temp</variableCode>
            <variableName>Temperature</variableName>
            <unit><unitName>degree celsius</unitName><unitAbbreviation>degC</unitAbbreviation></unit>
            <noDataValue>-9999</noDataValue>
          </variable>
          <values>
            <value censorCode="nc" dateTime="2005-12-04T00:00:00" methodCode="1">3.5</value>
            <value censorCode="nc" dateTime="2005-12-05T00:00:00" methodCode="1">-9999</value>
            <value censorCode="nc" dateTime="2005-12-06T00:00:00.000" methodCode="1">2.25</value>
            <value censorCode="nc" dateTime="garbage" methodCode="1">1.0</value>
            <value censorCode="nc" dateTime="2005-12-07 12:30:00" methodCode="1">4</value>
            <method methodID="1"><methodDescription>Grab sample</methodDescription></method>
          </values>
        </timeSeries>
      </timeSeriesResponse>
    </GetValuesObjectResponse>
  </soap:Body>
</soap:Envelope>"#;

    #[test]
    fn test_parse_values_metadata() {
        let series = parse_values(VALUES_RESPONSE).unwrap();
        assert_eq!(series.site_code, "MWRA:36");
        assert_eq!(series.variable_code, "MWRA:Temp");
        assert_eq!(series.variable_name.as_deref(), Some("Temperature"));
        assert_eq!(series.unit.as_deref(), Some("degC"));
        assert_eq!(series.no_data_value, Some(-9999.0));
    }

    #[test]
    fn test_parse_values_drops_no_data_and_bad_entries() {
        let series = parse_values(VALUES_RESPONSE).unwrap();
        assert_eq!(series.values(), vec![3.5, 2.25, 4.0]);
        let day = |d| NaiveDate::from_ymd_opt(2005, 12, d).unwrap();
        assert_eq!(series.points[0].date_time, day(4).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(series.points[2].date_time, day(7).and_hms_opt(12, 30, 0).unwrap());
        assert_eq!(series.value_range(), Some((2.25, 4.0)));
    }

    #[test]
    fn test_parse_values_requires_time_series() {
        assert!(parse_values("<soap:Envelope><soap:Body/></soap:Envelope>").is_err());
    }

    #[test]
    fn test_empty_series_ranges() {
        let xml = "<timeSeries><variable><variableCode>T</variableCode></variable><values></values></timeSeries>";
        let series = parse_values(xml).unwrap();
        assert!(series.is_empty());
        assert_eq!(series.variable_code, "T");
        assert_eq!(series.value_range(), None);
        assert_eq!(series.time_range(), None);
    }

    #[test]
    fn test_parse_sites() {
        let xml = r#"<sitesResponse>
          <site><siteInfo>
            <siteName>Carson Beach</siteName>
            <siteCode network="MWRA" siteID="36">36</siteCode>
            <geoLocation><geogLocation srs="EPSG:4269">
              <latitude>42.3293</latitude><longitude>-71.0447</longitude>
            </geogLocation></geoLocation>
          </siteInfo></site>
          <site><siteInfo>
            <siteName>Nowhere</siteName>
            <siteCode network="MWRA">99</siteCode>
          </siteInfo></site>
        </sitesResponse>"#;
        let sites = parse_sites(xml).unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].site_code, "MWRA:36");
        assert_eq!(sites[0].name, "Carson Beach");
        assert_eq!(sites[0].lat, 42.3293);
        assert_eq!(sites[0].lon, -71.0447);
    }
}

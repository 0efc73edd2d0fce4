//! Decoding of a site's `/metrics` body.
//!
//! Sites report in one of three shapes:
//!
//! ```text
//! {"service_id":"S1","gas":3,"cost":4,"delay":8}            single record
//! [{"service_id":"S1",...},{"service_id":"S2",...}]         list of records
//! {"S1":{"gas":3,"cost":4,"delay":8},"S2":{...}}            keyed by service id
//! ```
//!
//! Whatever address a record claims, the site's configured address wins.

use std::collections::BTreeMap;

use serde::Deserialize;

use cats_core::{ServiceInstance, Site};

use crate::error::PollError;

/// One service record as a site reports it.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SiteMetric {
    #[serde(default, alias = "serviceID")]
    pub service_id: Option<String>,
    #[serde(default, rename = "csci_id", alias = "address")]
    pub address: Option<String>,
    #[serde(rename = "gas", alias = "capacity")]
    pub capacity: u32,
    pub cost: i64,
    #[serde(rename = "delay", alias = "base_delay")]
    pub base_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MetricsPayload {
    One(SiteMetric),
    Many(Vec<SiteMetric>),
    Keyed(BTreeMap<String, SiteMetric>),
}

/// Decode a metrics body into instances addressed at `site.address`.
pub fn decode_site_metrics(site: &Site, body: &[u8]) -> Result<Vec<ServiceInstance>, PollError> {
    let payload: MetricsPayload = serde_json::from_slice(body)?;
    let records: Vec<(String, SiteMetric)> = match payload {
        MetricsPayload::One(m) => vec![(record_service_id(&m)?, m)],
        MetricsPayload::Many(list) => list
            .into_iter()
            .map(|m| Ok((record_service_id(&m)?, m)))
            .collect::<Result<_, PollError>>()?,
        MetricsPayload::Keyed(map) => map.into_iter().collect(),
    };

    Ok(records
        .into_iter()
        .map(|(service_id, m)| ServiceInstance {
            service_id,
            address: site.address.clone(),
            capacity: m.capacity,
            cost: m.cost,
            base_delay_ms: m.base_delay_ms,
        })
        .collect())
}

fn record_service_id(m: &SiteMetric) -> Result<String, PollError> {
    match m.service_id.as_deref() {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(PollError::MissingServiceId),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> Site {
        Site {
            name: "site-1".to_string(),
            metrics_url: "http://192.168.0.5:5001/metrics".to_string(),
            address: "172.18.0.2:5000".to_string(),
        }
    }

    #[test]
    fn single_record_overrides_address() {
        let body = br#"{"service_id":"S1","gas":3,"cost":4,"csci_id":"172.17.0.8:5000","delay":8}"#;
        let instances = decode_site_metrics(&site(), body).unwrap();
        assert_eq!(instances.len(), 1);
        let inst = &instances[0];
        assert_eq!(inst.service_id, "S1");
        assert_eq!(inst.address, "172.18.0.2:5000");
        assert_eq!(inst.capacity, 3);
        assert_eq!(inst.cost, 4);
        assert_eq!(inst.base_delay_ms, 8);
    }

    #[test]
    fn list_of_records() {
        let body = br#"[{"service_id":"S1","gas":1,"cost":1,"delay":1},
                        {"service_id":"S2","capacity":0,"cost":9,"base_delay":2}]"#;
        let instances = decode_site_metrics(&site(), body).unwrap();
        let ids: Vec<&str> = instances.iter().map(|i| i.service_id.as_str()).collect();
        assert_eq!(ids, vec!["S1", "S2"]);
        assert_eq!(instances[1].capacity, 0);
        assert!(instances.iter().all(|i| i.address == "172.18.0.2:5000"));
    }

    #[test]
    fn keyed_map_takes_service_id_from_key() {
        let body = br#"{"S3":{"gas":1,"cost":2,"delay":15},"S1":{"service_id":"ignored","gas":2,"cost":3,"delay":4}}"#;
        let instances = decode_site_metrics(&site(), body).unwrap();
        let ids: Vec<&str> = instances.iter().map(|i| i.service_id.as_str()).collect();
        assert_eq!(ids, vec!["S1", "S3"]);
    }

    #[test]
    fn missing_service_id_is_rejected() {
        let body = br#"{"gas":1,"cost":2,"delay":3}"#;
        let err = decode_site_metrics(&site(), body).unwrap_err();
        assert!(matches!(err, PollError::MissingServiceId));
    }

    #[test]
    fn malformed_body_is_decode_error() {
        let bodies: [&[u8]; 3] = [b"not json", br#"{"service_id":"S1","gas":"lots"}"#, b"42"];
        for body in bodies {
            let err = decode_site_metrics(&site(), body).unwrap_err();
            assert!(matches!(err, PollError::Decode(_)), "body {:?}", body);
        }
    }
}

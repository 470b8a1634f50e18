//! Dose submission.
//!
//! A confirmed dose is posted to a remote treatments log. The core only
//! sees the `DoseSink` trait; `HttpDoseSink` is the production sink.

use crate::{DosingDecision, Error, Result};
use chrono::SecondsFormat;
use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, Serializer};
use std::time::Duration;

/// Wire record for the treatments log
#[derive(Clone, Debug, Serialize)]
pub struct DoseRecord {
    /// Epoch milliseconds
    pub time: i64,
    pub insulin: f64,
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub created_at: String,
    #[serde(rename = "dateString")]
    pub date_string: String,
    /// Opaque credential, passed through untouched
    #[serde(serialize_with = "serialize_secret")]
    pub secret: SecretString,
}

impl DoseRecord {
    pub fn new(decision: &DosingDecision, secret: SecretString) -> Self {
        let iso = decision
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        Self {
            time: decision.timestamp.timestamp_millis(),
            insulin: decision.insulin_units,
            event_type: decision.event_type.clone(),
            created_at: iso.clone(),
            date_string: iso,
            secret,
        }
    }
}

fn serialize_secret<S: Serializer>(secret: &SecretString, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// Destination for dosing records.
///
/// `Ok` means delivery was acknowledged. Any failure must come back as
/// `Error::Submission`; retry policy belongs to the implementation, not the
/// engine.
pub trait DoseSink {
    fn submit(&mut self, record: &DoseRecord) -> Result<()>;
}

/// Posts records as JSON over HTTP
pub struct HttpDoseSink {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpDoseSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

impl DoseSink for HttpDoseSink {
    fn submit(&mut self, record: &DoseRecord) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(record)
            .send()
            .map_err(|e| Error::Submission(format!("request to {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Submission(format!(
                "{} responded with status {}",
                self.url, status
            )));
        }

        tracing::debug!("Submitted {}U to {}", record.insulin, self.url);
        Ok(())
    }
}

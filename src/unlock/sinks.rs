//! External systems that receive a captured lead.
//!
//! A submission goes to both an email relay and a lead store. The two
//! requests run concurrently and the submission only succeeds when both do.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{LeadsConfig, read_env_secret};
use crate::models::LeadContact;

use super::controller::UnlockError;

const SINK_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Access key not configured ({0})")]
    MissingAccessKey(String),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The sink answered 2xx but reported failure in its body
    #[error("Submission rejected: {0}")]
    Rejected(String),
}

/// One lead, as sent to the sinks
#[derive(Debug, Clone, PartialEq)]
pub struct LeadSubmission {
    pub contact: LeadContact,
    /// Destination of the itinerary being unlocked
    pub destination: String,
    pub message: String,
}

impl LeadSubmission {
    pub fn new(contact: LeadContact, destination: impl Into<String>) -> Self {
        let destination = destination.into();
        let message = format!("Unlocked the full itinerary for {}", destination);
        Self {
            contact,
            destination,
            message,
        }
    }
}

/// Sends the lead as an email notification
#[async_trait]
pub trait ContactEmailSink: Send + Sync {
    async fn send_contact(&self, lead: &LeadSubmission) -> Result<(), SinkError>;
}

/// Stores the lead in a CRM-style record store
#[async_trait]
pub trait LeadRecordSink: Send + Sync {
    async fn record_lead(&self, lead: &LeadSubmission) -> Result<(), SinkError>;
}

fn http_client() -> Result<reqwest::Client, SinkError> {
    reqwest::Client::builder()
        .timeout(SINK_TIMEOUT)
        .build()
        .map_err(SinkError::from)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SinkError::Status {
        status: status.as_u16(),
        body,
    })
}

// ============================================================================
// Email relay
// ============================================================================

#[derive(Serialize)]
struct RelayPayload<'a> {
    access_key: &'a str,
    subject: &'a str,
    from_name: &'a str,
    name: &'a str,
    email: &'a str,
    phone: &'a str,
    destination: &'a str,
    message: &'a str,
    source: &'a str,
}

#[derive(Deserialize)]
struct RelayResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

fn default_success() -> bool {
    true
}

/// Web3Forms-style relay: a form POST that turns into an email
pub struct Web3FormsSink {
    client: reqwest::Client,
    url: String,
    access_key: Option<String>,
    access_key_env: String,
    subject: String,
    from_name: String,
}

impl Web3FormsSink {
    pub fn from_config(config: &LeadsConfig) -> Result<Self, SinkError> {
        Ok(Self {
            client: http_client()?,
            url: config.email_relay_url.clone(),
            access_key: read_env_secret(&config.access_key_env),
            access_key_env: config.access_key_env.clone(),
            subject: config.email_subject.clone(),
            from_name: config.from_name.clone(),
        })
    }

    pub fn with_access_key(mut self, access_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl ContactEmailSink for Web3FormsSink {
    async fn send_contact(&self, lead: &LeadSubmission) -> Result<(), SinkError> {
        let access_key = self
            .access_key
            .as_deref()
            .ok_or_else(|| SinkError::MissingAccessKey(self.access_key_env.clone()))?;

        let payload = RelayPayload {
            access_key,
            subject: &self.subject,
            from_name: &self.from_name,
            name: &lead.contact.name,
            email: &lead.contact.email,
            phone: &lead.contact.phone,
            destination: &lead.destination,
            message: &lead.message,
            source: &lead.contact.source_tag,
        };

        debug!("Sending lead to email relay {}", self.url);
        let response = self.client.post(&self.url).json(&payload).send().await?;
        let body: RelayResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| SinkError::Rejected(format!("unreadable relay response: {}", e)))?;

        if body.success {
            Ok(())
        } else {
            Err(SinkError::Rejected(
                body.message.unwrap_or_else(|| "relay reported failure".to_string()),
            ))
        }
    }
}

// ============================================================================
// Lead store
// ============================================================================

#[derive(Serialize)]
struct LeadRecord<'a> {
    name: &'a str,
    email: &'a str,
    phone: &'a str,
    destination: &'a str,
    message: &'a str,
    source: &'a str,
}

/// JSON lead API, optionally authenticated with an admin session cookie
pub struct LeadStoreSink {
    client: reqwest::Client,
    url: String,
    session_token: Option<String>,
}

impl LeadStoreSink {
    pub fn new(url: impl Into<String>) -> Result<Self, SinkError> {
        Ok(Self {
            client: http_client()?,
            url: url.into(),
            session_token: None,
        })
    }

    pub fn from_config(config: &LeadsConfig) -> Result<Self, SinkError> {
        let mut sink = Self::new(config.lead_store_url.clone())?;
        sink.session_token = config
            .lead_store_token_env
            .as_deref()
            .and_then(read_env_secret);
        Ok(sink)
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

#[async_trait]
impl LeadRecordSink for LeadStoreSink {
    async fn record_lead(&self, lead: &LeadSubmission) -> Result<(), SinkError> {
        let record = LeadRecord {
            name: &lead.contact.name,
            email: &lead.contact.email,
            phone: &lead.contact.phone,
            destination: &lead.destination,
            message: &lead.message,
            source: &lead.contact.source_tag,
        };

        debug!("Recording lead at {}", self.url);
        let mut request = self.client.post(&self.url).json(&record);
        if let Some(token) = &self.session_token {
            request = request.header(reqwest::header::COOKIE, format!("admin_session={}", token));
        }
        check_status(request.send().await?).await?;
        Ok(())
    }
}

// ============================================================================
// Both sinks
// ============================================================================

/// The email relay and lead store, submitted to together
#[derive(Clone)]
pub struct LeadSinks {
    email: Arc<dyn ContactEmailSink>,
    store: Arc<dyn LeadRecordSink>,
}

impl LeadSinks {
    pub fn new(email: Arc<dyn ContactEmailSink>, store: Arc<dyn LeadRecordSink>) -> Self {
        Self { email, store }
    }

    pub fn from_config(config: &LeadsConfig) -> Result<Self, SinkError> {
        Ok(Self::new(
            Arc::new(Web3FormsSink::from_config(config)?),
            Arc::new(LeadStoreSink::from_config(config)?),
        ))
    }

    /// Send `lead` to both sinks. Fails if either one fails.
    pub async fn submit(&self, lead: &LeadSubmission) -> Result<(), UnlockError> {
        let (email, store) = tokio::join!(self.email.send_contact(lead), self.store.record_lead(lead));

        if let Err(e) = &email {
            warn!(error = %e, "Email relay rejected lead");
        }
        if let Err(e) = &store {
            warn!(error = %e, "Lead store rejected lead");
        }

        match (email, store) {
            (Ok(()), Ok(())) => {
                info!(destination = %lead.destination, "Lead submitted to both sinks");
                Ok(())
            }
            (email, store) => Err(UnlockError::LeadSubmissionPartialFailure {
                email: email.err().map(|e| e.to_string()),
                store: store.err().map(|e| e.to_string()),
            }),
        }
    }
}

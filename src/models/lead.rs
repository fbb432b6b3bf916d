use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Contact captured by the unlock form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadContact {
    pub name: String,
    pub email: String,
    pub phone: String,
    /// Where the lead came from (e.g., "itinerary-unlock")
    pub source_tag: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum LeadContactError {
    #[error("Name is required")]
    MissingName,

    #[error("A valid email address is required")]
    InvalidEmail,

    #[error("A phone number is required")]
    MissingPhone,
}

impl LeadContact {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
        source_tag: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into().trim().to_string(),
            email: email.into().trim().to_string(),
            phone: phone.into().trim().to_string(),
            source_tag: source_tag.into(),
        }
    }

    /// Form-level checks run before anything is sent to a sink
    pub fn validate(&self) -> Result<(), LeadContactError> {
        if self.name.is_empty() {
            return Err(LeadContactError::MissingName);
        }
        let valid_email = self
            .email
            .split_once('@')
            .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'));
        if !valid_email {
            return Err(LeadContactError::InvalidEmail);
        }
        if self.phone.chars().filter(|c| c.is_ascii_digit()).count() < 6 {
            return Err(LeadContactError::MissingPhone);
        }
        Ok(())
    }
}

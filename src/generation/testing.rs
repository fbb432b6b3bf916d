//! In-process providers for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::TextProvider;
use super::error::ProviderError;

/// Answers every call with the same canned result
pub struct ScriptedProvider {
    name: String,
    response: Result<String, u16>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl ScriptedProvider {
    pub fn ok(name: &str, text: &str) -> Self {
        Self::with_response(name, Ok(text.to_string()))
    }

    pub fn failing(name: &str, status: u16) -> Self {
        Self::with_response(name, Err(status))
    }

    fn with_response(name: &str, response: Result<String, u16>) -> Self {
        Self {
            name: name.to_string(),
            response,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        match &self.response {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(ProviderError::Status {
                status: *status,
                body: "scripted failure".to_string(),
            }),
        }
    }
}

/// Never answers; only a timeout gets past it
pub struct StallingProvider {
    name: String,
}

impl StallingProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl TextProvider for StallingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        std::future::pending().await
    }
}

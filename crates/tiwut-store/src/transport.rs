//! HTTP access.
//!
//! Everything that leaves the machine goes through [`Transport`], one GET at a time.

use crate::error::StoreError;
use std::io::Read;
use std::time::Duration;

/// An open response body.
pub struct Download {
    /// Size announced by the server, if any.
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

/// Upper bound on the buffer reserved up front from an announced size.
const MAX_PREALLOCATION: u64 = 1 << 20;

impl Download {
    /// Read the whole body into memory.
    /// The announced size is only a hint, capped at [`MAX_PREALLOCATION`].
    pub fn into_bytes(mut self) -> Result<Vec<u8>, StoreError> {
        let hint = self.content_length.unwrap_or(0).min(MAX_PREALLOCATION);
        let mut bytes = Vec::with_capacity(hint as usize);
        self.body.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

pub trait Transport: Send + Sync {
    /// Issue a GET. Non-success statuses are errors.
    fn get(&self, url: &str) -> Result<Download, StoreError>;
}

/// [`Transport`] backed by a ureq agent.
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(timeout: Option<Duration>) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            agent: builder.build(),
        }
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Download, StoreError> {
        let response = self.agent.get(url).call()?;
        let content_length = response
            .header("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok());

        Ok(Download {
            content_length,
            body: Box::new(response.into_reader()),
        })
    }
}

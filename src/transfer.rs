//! Blocking HTTP client for the dumpling storage service.
//!
//! Every operation is a single independent request/response with no retry
//! or backoff; the tool is operator-invoked and one-shot. Upload and triage
//! update fail hard on a non-2xx status. Download is deliberately lenient:
//! it logs the failure and leaves the destination absent or partial, and
//! the CLI turns the missing archive into the terminal message.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;

use reqwest::blocking::{multipart, Client};

use crate::error::{Error, Result};
use crate::triage::TriageMetadata;

/// Default dumpling service endpoint.
pub const DEFAULT_SERVICE_URL: &str = "http://dotnetrp.azurewebsites.net";

/// Opaque handle issued by the service for one uploaded archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DumpId(pub u64);

impl fmt::Display for DumpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

pub struct DumplingClient {
    base: String,
    http: Client,
}

impl DumplingClient {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    /// Connectivity check against the service's hello endpoint.
    pub fn hello(&self, user: &str) -> Result<String> {
        let url = format!("{}/dumpling/test/hi/im/{}", self.base, user);
        let response = self.get(&url)?;
        response
            .text()
            .map_err(|e| Error::Remote(format!("read response from {}: {}", url, e)))
    }

    /// Upload an archive, yielding the dump identifier the service assigns.
    ///
    /// The response body is a quoted decimal integer.
    pub fn upload(
        &self,
        archive_path: &Path,
        user: &str,
        distro: &str,
        display_name: &str,
    ) -> Result<DumpId> {
        let url = format!(
            "{}/dumpling/store/chunk/{}/{}/0/0/{}",
            self.base, user, distro, display_name
        );
        let form = multipart::Form::new().file("file", archive_path)?;

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .map_err(|e| Error::Remote(format!("POST {}: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Remote(format!("HTTP {} from {}", status, url)));
        }

        let body = response
            .text()
            .map_err(|e| Error::Remote(format!("read response from {}: {}", url, e)))?;
        parse_dump_id(&body)
    }

    /// Attach triage metadata to an uploaded dump, replacing any prior
    /// attachment in full.
    pub fn update_triage(&self, id: DumpId, metadata: &TriageMetadata) -> Result<()> {
        let url = format!("{}/dumpling/triageinfo/add/{}", self.base, id);
        let response = self
            .http
            .put(&url)
            .json(metadata)
            .send()
            .map_err(|e| Error::Remote(format!("PUT {}: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Remote(format!("HTTP {} from {}", status, url)));
        }
        Ok(())
    }

    /// Canonical download URL for a dump identifier.
    pub fn download_url(&self, id: DumpId) -> String {
        format!("{}/dumpling/download/{}", self.base, id)
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|e| Error::Remote(format!("GET {}: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Remote(format!("HTTP {} from {}", status, url)));
        }
        Ok(response)
    }
}

/// Fetch `url` into `dest`, reporting rather than propagating failure.
///
/// On a connection or status error the destination is left absent or
/// partial; callers decide what a missing archive means.
pub fn download(url: &str, dest: &Path) {
    log::info!("downloading {}", url);
    let result = Client::new()
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::Remote(format!("GET {}: {}", url, e)))
        .and_then(|mut response| {
            let mut out = File::create(dest)?;
            io::copy(&mut response, &mut out)?;
            Ok(())
        });
    if let Err(e) = result {
        log::error!("download failed: {}", e);
    }
}

fn parse_dump_id(body: &str) -> Result<DumpId> {
    body.trim()
        .trim_matches('"')
        .parse::<u64>()
        .map(DumpId)
        .map_err(|_| Error::Remote(format!("unexpected upload response body: {:?}", body)))
}

//! Async file adapter around one bleach session
//!
//! Reads the input (a path, or `-` for stdin), runs the session on a blocking
//! worker, optionally under a deadline, and writes the output only once the
//! whole document has been sanitized.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{info, instrument, warn};

use crate::{
    config::BleachConfig,
    error::{Result, SanitizeError},
    report::SanitizeReport,
    sanitizer::{Sanitizer, SanitizerRegistry},
    session::BleachSession,
    utils::write_atomic,
};

/// Name standing for stdin or stdout
pub const STDIO: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Endpoint {
    Stdio,
    File(PathBuf),
}

impl Endpoint {
    fn parse(name: &str) -> Self {
        if name == STDIO {
            Endpoint::Stdio
        } else {
            Endpoint::File(PathBuf::from(name))
        }
    }
}

fn worker_failed(err: tokio::task::JoinError) -> SanitizeError {
    SanitizeError::IoError(io::Error::new(io::ErrorKind::Other, err))
}

/// Sanitizes files with a fixed configuration
#[derive(Debug)]
pub struct Pipeline {
    config: BleachConfig,
    root: Arc<dyn Sanitizer>,
    force: bool,
}

impl Pipeline {
    /// Builds the root sanitizer for `config`; fails on an invalid configuration
    pub fn new(config: BleachConfig) -> Result<Self> {
        let root = SanitizerRegistry::from_config(&config)?.build();
        Ok(Self {
            config,
            root,
            force: false,
        })
    }

    /// Allows an existing output file to be replaced
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn config(&self) -> &BleachConfig {
        &self.config
    }

    /// Sanitizes `input` into `output` and reports what was removed.
    ///
    /// On a timeout the worker is abandoned and nothing is written; the
    /// blocking task itself runs to completion in the background.
    #[instrument(skip(self))]
    pub async fn execute(&self, input: &str, output: &str) -> Result<SanitizeReport> {
        let destination = Endpoint::parse(output);
        if let Endpoint::File(path) = &destination {
            if !self.force && path.exists() {
                warn!(path = %path.display(), "Output exists, use --force to overwrite");
                return Err(SanitizeError::IoError(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} already exists", path.display()),
                )));
            }
        }

        let data = read_input(&Endpoint::parse(input)).await?;
        let root = Arc::clone(&self.root);
        let config = self.config.clone();

        let job = tokio::task::spawn_blocking(move || {
            let mut session = BleachSession::with_config(root, config);
            let clean = session.sanitize_bytes(&data)?;
            let report = SanitizeReport::from_session(&session, &data, &clean);
            Ok::<_, SanitizeError>((clean, report))
        });

        let joined = match self.config.timeout_secs {
            Some(secs) => {
                let limit = Duration::from_secs(secs);
                tokio::time::timeout(limit, job)
                    .await
                    .map_err(|_| SanitizeError::TimeoutError(limit))?
            }
            None => job.await,
        };
        let (clean, report) = joined.map_err(worker_failed)??;

        write_output(destination, clean, self.force).await?;
        info!(
            input,
            output,
            threats = report.threat_count,
            sanitizer = %report.sanitizer,
            "File sanitized"
        );
        Ok(report)
    }
}

async fn read_input(source: &Endpoint) -> Result<Vec<u8>> {
    match source {
        Endpoint::Stdio => {
            let mut buffer = Vec::new();
            tokio::io::stdin().read_to_end(&mut buffer).await?;
            Ok(buffer)
        }
        Endpoint::File(path) => Ok(tokio::fs::read(path).await?),
    }
}

async fn write_output(destination: Endpoint, data: Vec<u8>, force: bool) -> Result<()> {
    match destination {
        Endpoint::Stdio => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&data).await?;
            stdout.flush().await?;
            Ok(())
        }
        Endpoint::File(path) => tokio::task::spawn_blocking(move || write_atomic(Path::new(&path), &data, force))
            .await
            .map_err(worker_failed)?,
    }
}

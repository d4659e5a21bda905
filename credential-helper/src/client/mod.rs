//! Client for external credential helper executables.
//!
//! [`Client`] runs `<helper> get [extra...]`, writes the request to the
//! helper's standard input and reads the response from its standard output.
//!
//! # Example
//!
//! ```no_run
//! use credential_helper::{Client, CredentialHelper, GetCredentialsRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new("my-credential-helper")?;
//!
//! let response = client
//!     .get_credentials(
//!         &GetCredentialsRequest::new("grpcs://example.com"),
//!         &[],
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//!
//! for (name, values) in &response.headers {
//!     println!("{name}: {values:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod lookup;

use crate::error::Error;
use crate::helper::{CredentialHelper, CredentialsFuture};
use crate::prelude::debug;
use crate::protocol::{self, GetCredentialsRequest, GetCredentialsResponse, ProtocolError};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const GET_COMMAND: &str = "get";

/// Invokes a credential helper executable.
///
/// Every call spawns a new helper process; wrap the client in a
/// [`CachingCredentialHelper`](crate::CachingCredentialHelper) to avoid
/// invoking the helper for every request.
#[derive(Debug, Clone)]
pub struct Client {
    path: PathBuf,
}

impl Client {
    /// Creates a client for the helper at `path`.
    ///
    /// A bare name such as `my-helper` is searched in `PATH`, like a shell
    /// would.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolution`] if no executable file is found.
    pub fn new(path: impl AsRef<str>) -> Result<Self, Error> {
        let requested = path.as_ref();
        let path = lookup::look_path(requested).map_err(|source| Error::Resolution {
            path: requested.to_string(),
            source,
        })?;
        Ok(Self { path })
    }

    /// Returns the resolved path of the helper executable.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn invoke(
        &self,
        request: &GetCredentialsRequest,
        extra_parameters: &[String],
        cancel: &CancellationToken,
    ) -> Result<GetCredentialsResponse, Error> {
        let payload = protocol::encode_request(request)?;

        debug!(
            "Invoking credential helper: path={}, uri={}",
            self.path.display(),
            request.uri
        );

        let mut child = Command::new(&self.path)
            .arg(GET_COMMAND)
            .args(extra_parameters)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Start {
                path: self.path.clone(),
                source,
            })?;

        let (Some(stdin), Some(mut stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(Error::Start {
                path: self.path.clone(),
                source: io::Error::other("child process is missing a standard stream"),
            });
        };
        let stderr_task = tokio::spawn(read_to_string(stderr));

        let exchange = async {
            let ((), response) = tokio::join!(
                write_request(stdin, payload),
                protocol::read_message::<GetCredentialsResponse, _>(&mut stdout),
            );
            response
        };

        let response = tokio::select! {
            () = cancel.cancelled() => {
                return Err(self.cancelled(child, stderr_task).await);
            }
            response = exchange => response,
        };

        // A response that is malformed while the helper is still writing is
        // reported right away. If the output simply ended early, the exit
        // status is the better diagnostic, so wait for it first.
        let response = match response {
            Err(source) if !at_end_of_output(&source) => {
                stderr_task.abort();
                return Err(Error::ResponseDecode {
                    path: self.path.clone(),
                    source,
                });
            }
            response => response,
        };

        // Keep draining stdout so the helper never blocks on a full pipe.
        let finished = async {
            let mut sink = tokio::io::sink();
            let (_, status) = tokio::join!(tokio::io::copy(&mut stdout, &mut sink), child.wait());
            status
        };
        let status = tokio::select! {
            () = cancel.cancelled() => None,
            status = finished => Some(status),
        };
        let Some(status) = status else {
            return Err(self.cancelled(child, stderr_task).await);
        };

        match status {
            Ok(status) if status.success() => {
                stderr_task.abort();
                let response = response.map_err(|source| Error::ResponseDecode {
                    path: self.path.clone(),
                    source,
                })?;
                debug!(
                    "Credential helper succeeded: path={}, headers={}",
                    self.path.display(),
                    response.headers.len()
                );
                Ok(response)
            }
            // The helper disavows whatever it printed.
            Ok(status) => Err(Error::Invocation {
                path: self.path.clone(),
                status: describe_exit(status),
                stderr: collect_stderr(stderr_task).await,
            }),
            Err(e) => {
                stderr_task.abort();
                Err(Error::Invocation {
                    path: self.path.clone(),
                    status: format!("wait failed: {e}"),
                    stderr: String::new(),
                })
            }
        }
    }

    async fn cancelled(&self, mut child: Child, stderr_task: JoinHandle<String>) -> Error {
        stderr_task.abort();
        if let Err(e) = child.kill().await {
            debug!(
                "Failed to kill cancelled credential helper: path={}, error={}",
                self.path.display(),
                e
            );
        }
        Error::Cancelled {
            path: self.path.clone(),
        }
    }
}

impl CredentialHelper for Client {
    fn get_credentials<'a>(
        &'a self,
        request: &'a GetCredentialsRequest,
        extra_parameters: &'a [String],
        cancel: &'a CancellationToken,
    ) -> CredentialsFuture<'a> {
        Box::pin(self.invoke(request, extra_parameters, cancel))
    }
}

/// Writes the request and closes the helper's standard input.
///
/// Helpers are free not to read their input, so write errors are ignored.
async fn write_request(mut stdin: ChildStdin, payload: Vec<u8>) {
    if let Err(e) = stdin.write_all(&payload).await {
        debug!("Credential helper did not read its input: error={}", e);
        return;
    }
    if let Err(e) = stdin.shutdown().await {
        debug!("Failed to close credential helper input: error={}", e);
    }
}

fn at_end_of_output(err: &ProtocolError) -> bool {
    match err {
        ProtocolError::Empty => true,
        ProtocolError::Malformed(e) => e.is_eof(),
        _ => false,
    }
}

async fn read_to_string<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    // Partial output is still useful for diagnostics.
    let _unused: Result<_, _> = reader.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

async fn collect_stderr(task: JoinHandle<String>) -> String {
    task.await.unwrap_or_default()
}

#[cfg(unix)]
fn describe_exit(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exit status {code}"),
        (None, Some(signal)) => format!("signal {signal}"),
        (None, None) => status.to_string(),
    }
}

#[cfg(not(unix))]
fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit status {code}"),
        None => status.to_string(),
    }
}

//! Running the current process as a credential helper.
//!
//! [`start_credential_helper`] turns a [`CredentialHelper`] implementation into
//! a helper executable that Bazel (or a [`Client`](crate::Client)) can invoke:
//!
//! ```no_run
//! use credential_helper::{
//!     start_credential_helper, CredentialHelper, CredentialsFuture, Error,
//!     GetCredentialsRequest,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug)]
//! struct ExampleHelper;
//!
//! impl CredentialHelper for ExampleHelper {
//!     fn get_credentials<'a>(
//!         &'a self,
//!         _request: &'a GetCredentialsRequest,
//!         _extra_parameters: &'a [String],
//!         _cancel: &'a CancellationToken,
//!     ) -> CredentialsFuture<'a> {
//!         Box::pin(async { Err(Error::helper("example does not provide credentials")) })
//!     }
//! }
//!
//! fn main() {
//!     start_credential_helper(ExampleHelper);
//! }
//! ```

use crate::helper::CredentialHelper;
use crate::protocol::{self, GetCredentialsRequest};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

const DEFAULT_PROGRAM_NAME: &str = "credential-helper";

/// Exit code for a successfully served command.
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for every failure.
pub const EXIT_FAILURE: i32 = 1;

/// Serves one command of the credential helper protocol and exits the process.
///
/// Reads the command from the process arguments, the request from standard
/// input, and writes the response to standard output. Diagnostics go to
/// standard error.
///
/// This function never returns.
pub fn start_credential_helper<H: CredentialHelper>(helper: H) -> ! {
    let args: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    let code = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime.block_on(run(
            &args,
            tokio::io::stdin(),
            tokio::io::stdout(),
            tokio::io::stderr(),
            &helper,
        )),
        Err(e) => {
            eprintln!("could not start runtime: {e}");
            EXIT_FAILURE
        }
    };

    std::process::exit(code)
}

/// Serves one command and returns the process exit code.
///
/// `args[0]` is the program name and `args[1]` the command. Every failure is
/// reported on `stderr` and yields [`EXIT_FAILURE`]; nothing is written to
/// `stdout` unless the command succeeds.
pub async fn run<R, W, E, H>(args: &[String], stdin: R, stdout: W, stderr: E, helper: &H) -> i32
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
    H: CredentialHelper + ?Sized,
{
    let mut stderr = stderr;
    let program = args.first().map_or(DEFAULT_PROGRAM_NAME, String::as_str);

    let Some(command) = args.get(1) else {
        print_lines(&mut stderr, &usage(program)).await;
        return EXIT_FAILURE;
    };

    match command.as_str() {
        "get" => run_get_command(args, stdin, stdout, &mut stderr, helper).await,
        _ => {
            let mut lines = vec![format!("Unknown command '{command}'"), String::new()];
            lines.extend(usage(program));
            print_lines(&mut stderr, &lines).await;
            EXIT_FAILURE
        }
    }
}

async fn run_get_command<R, W, E, H>(
    args: &[String],
    mut stdin: R,
    mut stdout: W,
    stderr: &mut E,
    helper: &H,
) -> i32
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
    H: CredentialHelper + ?Sized,
{
    if args.len() != 2 {
        print_lines(stderr, &usage(&args[0])).await;
        return EXIT_FAILURE;
    }

    let request: GetCredentialsRequest = match protocol::read_message(&mut stdin).await {
        Ok(request) => request,
        Err(e) => {
            let lines = [
                "Invalid request for command 'get':".to_string(),
                e.to_string(),
            ];
            print_lines(stderr, &lines).await;
            return EXIT_FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let response = match helper.get_credentials(&request, &[], &cancel).await {
        Ok(response) => response,
        Err(e) => {
            print_lines(stderr, &[e.to_string()]).await;
            return EXIT_FAILURE;
        }
    };

    let mut encoded = match protocol::encode_response(&response) {
        Ok(encoded) => encoded,
        Err(e) => {
            print_lines(stderr, &[e.to_string()]).await;
            return EXIT_FAILURE;
        }
    };
    encoded.push(b'\n');

    if let Err(e) = write_all_and_flush(&mut stdout, &encoded).await {
        print_lines(stderr, &[format!("could not write response: {e}")]).await;
        return EXIT_FAILURE;
    }

    EXIT_SUCCESS
}

fn usage(program: &str) -> Vec<String> {
    let name = Path::new(program)
        .file_name()
        .map_or_else(|| program.into(), |name| name.to_string_lossy());
    vec!["Usage:".to_string(), format!("  {name} <command>")]
}

async fn write_all_and_flush<W>(w: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    w.write_all(bytes).await?;
    w.flush().await
}

async fn print_lines<E: AsyncWrite + Unpin>(stderr: &mut E, lines: &[String]) {
    let mut text = lines.join("\n");
    text.push('\n');
    // Nothing left to report to if stderr itself is broken.
    let _unused: Result<_, _> = write_all_and_flush(stderr, text.as_bytes()).await;
}

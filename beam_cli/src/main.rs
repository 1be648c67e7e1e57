use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use beam_core::{ReceiverSession, SenderSession, Ticket, TransferError};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "beam", about = "Point-to-point single-file transfer")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Offer a file and print the ticket a receiver needs to fetch it
    Send {
        /// File to offer
        file: PathBuf,
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
        /// Also write the ticket to this file
        #[arg(long)]
        ticket_out: Option<PathBuf>,
    },
    /// Fetch the file a ticket points at
    Receive {
        /// Ticket string, or path to a file holding one
        ticket: String,
        /// Destination path for the received file
        output: PathBuf,
        /// Give up dialing after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            signal_cancel.cancel();
        }
    });

    let outcome = match args.command {
        Command::Send {
            file,
            bind,
            ticket_out,
        } => send(file, bind, ticket_out, cancel).await,
        Command::Receive {
            ticket,
            output,
            timeout,
        } => receive(ticket, output, timeout, cancel).await,
    };

    if let Err(e) = outcome {
        tracing::error!("{}", e);
        std::process::exit(exit_code(&e));
    }
}

async fn send(
    file: PathBuf,
    bind: SocketAddr,
    ticket_out: Option<PathBuf>,
    cancel: CancellationToken,
) -> Result<(), TransferError> {
    let mut session = SenderSession::open(file, bind, cancel).await?;
    let ticket = session.ticket().to_string();

    if let Some(path) = &ticket_out {
        tokio::fs::write(path, format!("{}\n", ticket)).await?;
        tracing::info!(path = %path.display(), "ticket written");
    }
    println!("{}", ticket);

    session.serve().await
}

async fn receive(
    ticket: String,
    output: PathBuf,
    timeout: Option<u64>,
    cancel: CancellationToken,
) -> Result<(), TransferError> {
    // Convenience: accept the path of a ticket file in place of the string.
    let ticket = if Path::new(&ticket).is_file() {
        tokio::fs::read_to_string(&ticket).await?
    } else {
        ticket
    };
    let ticket: Ticket = ticket.parse()?;

    let mut session = ReceiverSession::new(ticket, output, cancel);
    if let Some(secs) = timeout {
        session = session.with_dial_timeout(Duration::from_secs(secs));
    }
    session.run().await
}

/// Distinct exit codes so calling scripts can tell user error from
/// transient failure from a successful interrupt.
fn exit_code(err: &TransferError) -> i32 {
    match err {
        TransferError::MalformedTicket { .. } => 2,
        TransferError::ConnectTimeout(_)
        | TransferError::ConnectRefused(_)
        | TransferError::Connect(_) => 3,
        TransferError::SequenceViolation { .. }
        | TransferError::TruncatedFrame
        | TransferError::LengthMismatch { .. }
        | TransferError::Protocol(_) => 4,
        TransferError::IntegrityMismatch { .. } => 5,
        TransferError::Cancelled => 6,
        _ => 1,
    }
}

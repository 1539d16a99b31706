//! seglog CLI Client
//!
//! Command-line interface for interacting with a seglog server.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use seglog::network::tls::client_connector;
use seglog::{LogClient, Record, SeglogError};
use tokio::io::{AsyncRead, AsyncWrite};

/// seglog CLI
#[derive(Parser, Debug)]
#[command(name = "seglog-cli")]
#[command(about = "CLI for the seglog commit log")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8400")]
    server: String,

    /// CA certificate (PEM) used to verify the server; enables TLS
    #[arg(long)]
    tls_ca: Option<PathBuf>,

    /// Client certificate chain (PEM) for servers requiring mTLS
    #[arg(long, requires_all = ["tls_ca", "tls_key"])]
    tls_cert: Option<PathBuf>,

    /// Client private key (PEM)
    #[arg(long, requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    /// Name the server certificate must be valid for
    #[arg(long, default_value = "localhost")]
    server_name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Append a record
    Produce {
        /// The record value
        value: String,
    },

    /// Read the record at an offset
    Consume {
        /// The offset to read
        offset: u64,
    },

    /// Print records as they are produced
    Tail {
        /// First offset to print
        #[arg(short, long, default_value = "0")]
        from: u64,
    },

    /// Ping the server
    Ping,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = connect_and_run(&args).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn connect_and_run(args: &Args) -> seglog::Result<()> {
    match &args.tls_ca {
        Some(ca) => {
            let identity = args.tls_cert.as_deref().zip(args.tls_key.as_deref());
            let connector = client_connector(ca, identity)?;
            let client =
                LogClient::connect_tls(args.server.as_str(), &connector, &args.server_name).await?;
            run(client, &args.command).await
        }
        None => run(LogClient::connect(args.server.as_str()).await?, &args.command).await,
    }
}

async fn run<S>(mut client: LogClient<S>, command: &Commands) -> seglog::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match command {
        Commands::Produce { value } => {
            let offset = client.produce(Record::new(value.as_bytes())).await?;
            println!("{}", offset);
        }
        Commands::Consume { offset } => match client.consume(*offset).await {
            Ok(record) => println!("{}", String::from_utf8_lossy(&record.value)),
            Err(SeglogError::OffsetOutOfRange(offset)) => {
                println!("(no record at offset {})", offset);
            }
            Err(e) => return Err(e),
        },
        Commands::Tail { from } => {
            let mut stream = client.consume_stream(*from).await?;
            while let Some(record) = stream.recv().await? {
                println!("{}\t{}", record.offset, String::from_utf8_lossy(&record.value));
            }
        }
        Commands::Ping => {
            client.ping().await?;
            println!("PONG");
        }
    }

    Ok(())
}

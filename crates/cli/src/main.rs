use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use blobdvm_client::{BlobDvmClient, ClientError};
use blobdvm_relay_client::{Keys, NostrRelayClient};
use blobdvm_server::{BlobDvmServer, ServerConfig};

/// BlobDVM - content-addressed file storage over nostr relays
#[derive(Parser)]
#[command(name = "blobdvm")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Content-addressed file storage over nostr relays")]
struct Cli {
    /// Relay URLs to connect to
    #[arg(
        short = 'r',
        long = "relay",
        env = "BLOBDVM_RELAYS",
        value_delimiter = ',',
        default_value = "wss://relay.damus.io",
        global = true
    )]
    relays: Vec<String>,

    /// Private key (nsec or hex); client commands generate a throwaway
    /// key when omitted
    #[arg(
        short = 'k',
        long = "private-key",
        env = "BLOBDVM_PRIVATE_KEY",
        global = true
    )]
    private_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available blob storage servers
    ListServers,

    /// Upload a file to blob storage
    Upload {
        /// File to upload
        path: PathBuf,

        /// Specific server pubkey; the first discovered server otherwise
        #[arg(short = 's', long = "server")]
        server: Option<String>,
    },

    /// Download a file by its content hash
    Download {
        /// Hex SHA-256 content address
        hash: String,

        /// Output file path
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,

        /// Specific server pubkey; the first discovered server otherwise
        #[arg(short = 's', long = "server")]
        server: Option<String>,
    },

    /// Delete a file by its content hash
    Delete {
        /// Hex SHA-256 content address
        hash: String,

        /// Specific server pubkey; the first discovered server otherwise
        #[arg(short = 's', long = "server")]
        server: Option<String>,
    },

    /// Run a blob storage server
    Serve {
        /// Server name advertised in the announcement
        #[arg(long = "name", default_value = "BlobDVM Storage")]
        name: String,

        /// Server description advertised in the announcement
        #[arg(
            long = "about",
            default_value = "Content-addressed file storage over nostr"
        )]
        about: String,

        /// File retention in hours
        #[arg(long = "retention-hours", default_value = "24")]
        retention_hours: u64,

        /// Live-byte capacity limit; unbounded when omitted
        #[arg(long = "capacity")]
        capacity: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing with default info level if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        match err.downcast_ref::<ClientError>() {
            Some(client_err) => eprintln!("{}: {client_err}", client_err.code()),
            None => eprintln!("error: {err:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::ListServers => {
            let client = connect_client(client_keys(cli.private_key.as_deref(), false)?, cli.relays)
                .await?;
            list_servers(&client).await
        }
        Commands::Upload { path, server } => {
            let client = connect_client(client_keys(cli.private_key.as_deref(), true)?, cli.relays)
                .await?;
            upload(&client, &path, server).await
        }
        Commands::Download {
            hash,
            output,
            server,
        } => {
            let client = connect_client(client_keys(cli.private_key.as_deref(), false)?, cli.relays)
                .await?;
            download(&client, &hash, output, server).await
        }
        Commands::Delete { hash, server } => {
            let client = connect_client(client_keys(cli.private_key.as_deref(), false)?, cli.relays)
                .await?;
            delete(&client, &hash, server).await
        }
        Commands::Serve {
            name,
            about,
            retention_hours,
            capacity,
        } => {
            let private_key = cli
                .private_key
                .context("serve requires --private-key (or BLOBDVM_PRIVATE_KEY)")?;
            serve(&private_key, cli.relays, name, about, retention_hours, capacity).await
        }
    }
}

/// Parse the configured private key, or generate a throwaway one.
fn client_keys(private_key: Option<&str>, announce_generated: bool) -> Result<Keys> {
    match private_key {
        Some(input) => {
            NostrRelayClient::parse_keys(input).context("failed to parse private key")
        }
        None => {
            let keys = NostrRelayClient::generate_keys();
            if announce_generated {
                println!(
                    "Generated throwaway key: {}",
                    NostrRelayClient::secret_key_display(&keys)
                );
            }
            Ok(keys)
        }
    }
}

async fn connect_client(
    keys: Keys,
    relays: Vec<String>,
) -> Result<BlobDvmClient<NostrRelayClient>> {
    let client = BlobDvmClient::new(NostrRelayClient::new(keys, relays));
    client.connect().await?;
    Ok(client)
}

async fn list_servers(client: &BlobDvmClient<NostrRelayClient>) -> Result<()> {
    println!("Discovering blob storage servers...");
    let servers = client.discover_servers().await?;

    if servers.is_empty() {
        println!("No servers found");
        return Ok(());
    }

    println!("\nFound {} server(s):\n", servers.len());
    for server in servers {
        println!("Server: {}", server.pubkey);
        if let Some(name) = &server.name {
            println!("  Name: {name}");
        }
        if let Some(about) = &server.about {
            println!("  About: {about}");
        }
        if let Some(max_file_size) = server.max_file_size {
            println!(
                "  Max file size: {:.1} MB",
                max_file_size as f64 / (1024.0 * 1024.0)
            );
        }
        if let Some(chunk_size) = server.chunk_size {
            println!("  Chunk size: {:.0} KB", chunk_size as f64 / 1024.0);
        }
        if let Some(retention_hours) = server.retention_hours {
            println!("  Retention: {retention_hours} hours");
        }
        println!();
    }
    Ok(())
}

/// Read the upload payload and derive the advisory file name.
async fn read_input(path: &Path) -> Result<(Vec<u8>, Option<String>)> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    Ok((bytes, filename))
}

/// Write downloaded bytes to the requested output path.
async fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

async fn upload(
    client: &BlobDvmClient<NostrRelayClient>,
    path: &PathBuf,
    server: Option<String>,
) -> Result<()> {
    let (bytes, filename) = read_input(path).await?;

    println!("Uploading {}...", path.display());
    let receipt = client.upload(&bytes, filename, server).await?;

    println!("File uploaded successfully!");
    println!("  Hash: {}", receipt.hash);
    println!("  Size: {} bytes", receipt.size);
    println!("  Chunks: {}", receipt.chunks);
    println!("  Expires: {} (unix timestamp)", receipt.expires);
    Ok(())
}

async fn download(
    client: &BlobDvmClient<NostrRelayClient>,
    hash: &str,
    output: Option<PathBuf>,
    server: Option<String>,
) -> Result<()> {
    println!("Downloading {hash}...");
    let bytes = client.download(hash, server).await?;

    match output {
        Some(path) => {
            write_output(&path, &bytes).await?;
            println!("Downloaded to {} ({} bytes)", path.display(), bytes.len());
        }
        None => println!("Downloaded {} bytes", bytes.len()),
    }
    Ok(())
}

async fn delete(
    client: &BlobDvmClient<NostrRelayClient>,
    hash: &str,
    server: Option<String>,
) -> Result<()> {
    println!("Deleting {hash}...");
    client.delete(hash, server).await?;
    println!("File deleted successfully!");
    Ok(())
}

async fn serve(
    private_key: &str,
    relays: Vec<String>,
    name: String,
    about: String,
    retention_hours: u64,
    capacity: Option<u64>,
) -> Result<()> {
    let keys = NostrRelayClient::parse_keys(private_key).context("failed to parse private key")?;
    let transport = NostrRelayClient::new(keys, relays);
    let config = ServerConfig {
        name,
        about,
        retention: Duration::from_secs(retention_hours * 3600),
        capacity,
        ..ServerConfig::default()
    };

    let server = BlobDvmServer::new(transport, config);
    println!("Starting BlobDVM server with pubkey: {}", server.public_key());
    println!("Press Ctrl+C to stop the server");

    tokio::select! {
        result = server.run() => {
            result.context("server stopped unexpectedly")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal, stopping server");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_upload_with_server() {
        let cli = Cli::parse_from([
            "blobdvm",
            "upload",
            "notes.txt",
            "--server",
            "abcdef",
            "--relay",
            "wss://a.example,wss://b.example",
        ]);
        assert_eq!(cli.relays, vec!["wss://a.example", "wss://b.example"]);
        match cli.command {
            Commands::Upload { path, server } => {
                assert_eq!(path, PathBuf::from("notes.txt"));
                assert_eq!(server.as_deref(), Some("abcdef"));
            }
            _ => panic!("expected the upload command"),
        }
    }

    #[test]
    fn parses_download_with_output() {
        let cli = Cli::parse_from(["blobdvm", "download", &"ab".repeat(32), "-o", "out.bin"]);
        match cli.command {
            Commands::Download { hash, output, .. } => {
                assert_eq!(hash, "ab".repeat(32));
                assert_eq!(output, Some(PathBuf::from("out.bin")));
            }
            _ => panic!("expected the download command"),
        }
    }

    #[test]
    fn parses_serve_defaults() {
        let cli = Cli::parse_from(["blobdvm", "serve", "--private-key", "hexkey"]);
        assert_eq!(cli.private_key.as_deref(), Some("hexkey"));
        match cli.command {
            Commands::Serve {
                retention_hours,
                capacity,
                ..
            } => {
                assert_eq!(retention_hours, 24);
                assert_eq!(capacity, None);
            }
            _ => panic!("expected the serve command"),
        }
    }

    #[test]
    fn default_relay_is_set() {
        let cli = Cli::parse_from(["blobdvm", "list-servers"]);
        assert_eq!(cli.relays, vec!["wss://relay.damus.io"]);
    }

    #[tokio::test]
    async fn read_input_returns_bytes_and_filename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, b"file body").await.unwrap();

        let (bytes, filename) = read_input(&path).await.unwrap();
        assert_eq!(bytes, b"file body");
        assert_eq!(filename.as_deref(), Some("notes.txt"));
    }

    #[tokio::test]
    async fn read_input_fails_for_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_input(&dir.path().join("absent.bin")).await.unwrap_err();
        assert!(err.to_string().contains("absent.bin"));
    }

    #[tokio::test]
    async fn write_output_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        write_output(&path, &[1, 2, 3]).await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn write_output_fails_for_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("out.bin");

        let err = write_output(&path, b"data").await.unwrap_err();
        assert!(err.to_string().contains("out.bin"));
    }
}

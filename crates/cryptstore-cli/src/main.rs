//! cryptstore: encrypted, hash-verified file storage CLI
//!
//! Commands:
//!   put <local> <name>          - encrypt a local file into the store
//!   get <name> [--out <path>]   - decrypt and verify an object
//!   mv <src> <dst>              - rename an object and its header
//!   inspect <name>              - show an object's header
//!   keygen --out <dir>          - generate an RSA key pair

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use cryptstore_core::config::CryptstoreConfig;
use cryptstore_crypto::HeaderVersion;
use cryptstore_storage::{CryptoStore, CryptoStoreOptions, OpendalStore};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "cryptstore",
    version,
    about = "Encrypted, hash-verified file storage",
    long_about = "cryptstore: store files encrypted and integrity-checked on a local \
                  directory or an S3-compatible bucket"
)]
struct Cli {
    /// Path to cryptstore.toml configuration file
    #[arg(long, short = 'c', env = "CRYPTSTORE_CONFIG", default_value = "cryptstore.toml")]
    config: PathBuf,

    /// Log level or filter directive (overrides [log].level)
    #[arg(long, env = "CRYPTSTORE_LOG")]
    log: Option<String>,

    /// Log output format (overrides [log].format)
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a local file into the store
    Put {
        /// Local file to read
        local: PathBuf,
        /// Object name in the store
        name: String,
    },

    /// Decrypt an object and verify its content hash
    ///
    /// With --out, a file that fails verification is removed. Without it the
    /// plaintext goes to stdout and a failure is reported after the fact.
    Get {
        /// Object name in the store
        name: String,
        /// Destination file (default: stdout)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Rename an object together with its header
    Mv {
        src: String,
        dst: String,
    },

    /// Show the header of an object without decrypting it
    Inspect {
        name: String,
    },

    /// Generate an RSA key pair (private.pem, public.pem)
    Keygen {
        /// Directory to write the key files into
        #[arg(long, short = 'o')]
        out: PathBuf,
        /// RSA modulus size in bits
        #[arg(
            long,
            default_value_t = 2048,
            value_parser = clap::value_parser!(u64).range(1024..=16384)
        )]
        bits: u64,
        /// Overwrite existing key files
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CryptstoreConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, format);

    // keygen needs neither keys nor a backend
    if let Commands::Keygen { out, bits, force } = &cli.command {
        return cmd_keygen(out, *bits as usize, *force);
    }

    let rt = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    let store = open_store(&config, rt.handle().clone())?;

    let result = match &cli.command {
        Commands::Put { local, name } => cmd_put(&store, local, name),
        Commands::Get { name, out } => cmd_get(&store, name, out.as_deref()),
        Commands::Mv { src, dst } => cmd_mv(&store, src, dst),
        Commands::Inspect { name } => cmd_inspect(&store, name),
        Commands::Keygen { out, bits, force } => cmd_keygen(out, *bits as usize, *force),
    };

    if let Err(e) = store.close() {
        warn!("closing store: {e}");
    }
    result
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so `get` can stream plaintext to stdout
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
}

// ── Store construction ────────────────────────────────────────────────────────

/// Build the configured backend and wrap it in a crypto store.
///
/// S3 credentials come from AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY
/// (or the CRYPTSTORE_-prefixed equivalents).
fn open_store(
    config: &CryptstoreConfig,
    handle: tokio::runtime::Handle,
) -> Result<CryptoStore<OpendalStore>> {
    let credentials = if config.storage.backend == "s3" {
        let access_key = std::env::var("AWS_ACCESS_KEY_ID")
            .or_else(|_| std::env::var("CRYPTSTORE_ACCESS_KEY_ID"))
            .context(
                "S3 credentials not set\n\
                 Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.",
            )?;
        let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .or_else(|_| std::env::var("CRYPTSTORE_SECRET_ACCESS_KEY"))
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        Some((access_key, secret_key))
    } else {
        None
    };

    let op = cryptstore_storage::operator::build_from_core_config(
        &config.storage,
        credentials.as_ref().map(|(a, s)| (a.as_str(), s.as_str())),
    )
    .context("building storage operator")?;
    debug!(backend = %config.storage.backend, root = %config.storage.root, "storage ready");

    let options = CryptoStoreOptions::from_config(&config.crypto).context(
        "loading key material (set crypto.private_key_file and/or crypto.public_key_file)",
    )?;
    CryptoStore::new(OpendalStore::new(op, handle), options).context("initializing crypto store")
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(
        "{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
    ) {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{prefix:.bold} {spinner} {bytes} {msg}") {
        pb.set_style(style);
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ── `cryptstore put` ──────────────────────────────────────────────────────────

fn cmd_put(store: &CryptoStore<OpendalStore>, local: &Path, name: &str) -> Result<()> {
    let file = File::open(local).with_context(|| format!("opening {}", local.display()))?;
    let size = file
        .metadata()
        .with_context(|| format!("reading metadata of {}", local.display()))?
        .len();

    let mut writer = store
        .create(name)
        .with_context(|| format!("creating {name}"))?;

    let pb = make_progress_bar(size, "put");
    pb.set_message(name.to_string());
    let copied = io::copy(&mut pb.wrap_read(file), &mut writer);
    pb.finish_and_clear();

    let bytes = match copied {
        Ok(n) => n,
        Err(e) => {
            if let Err(close_err) = writer.close() {
                debug!("close after failed upload: {close_err}");
            }
            return Err(e).with_context(|| format!("encrypting {} into {name}", local.display()));
        }
    };
    writer
        .close()
        .with_context(|| format!("finalizing {name}"))?;

    println!("Stored:");
    println!("  local:   {}", local.display());
    println!("  object:  {name}");
    println!("  header:  {}", store.header_name(name));
    println!("  bytes:   {}", fmt_bytes(bytes));
    Ok(())
}

// ── `cryptstore get` ──────────────────────────────────────────────────────────

fn cmd_get(store: &CryptoStore<OpendalStore>, name: &str, out: Option<&Path>) -> Result<()> {
    let mut reader = store.open(name).with_context(|| format!("opening {name}"))?;

    let Some(path) = out else {
        let mut stdout = io::stdout().lock();
        copy_verified(&mut reader, &mut stdout)?;
        return reader.close().with_context(|| format!("closing {name}"));
    };

    let hash_type = reader.header().hash_algorithm();
    let pb = make_spinner("get");
    pb.set_message(name.to_string());
    let result = write_verified(&mut reader, path, &pb);
    pb.finish_and_clear();
    let bytes = result?;
    reader.close().with_context(|| format!("closing {name}"))?;

    println!("Retrieved:");
    println!("  object:  {name}");
    println!("  local:   {}", path.display());
    println!("  bytes:   {}", fmt_bytes(bytes));
    println!("  hash:    {hash_type} ok");
    Ok(())
}

/// Decrypt into a temporary file next to `path` and move it into place only
/// once the digest matches. An existing file at `path` survives a failure.
fn write_verified(
    reader: &mut cryptstore_crypto::CryptoReader,
    path: &Path,
    pb: &ProgressBar,
) -> Result<u64> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temporary file in {}", dir.display()))?;

    let bytes = copy_verified(reader, &mut pb.wrap_write(&mut tmp))?;
    tmp.persist(path)
        .with_context(|| format!("moving output into {}", path.display()))?;
    Ok(bytes)
}

/// Copy all plaintext out, then check it against the header digest.
fn copy_verified(reader: &mut cryptstore_crypto::CryptoReader, w: &mut impl Write) -> Result<u64> {
    let name = reader.name().to_string();
    let bytes = io::copy(reader, w).with_context(|| format!("decrypting {name}"))?;
    w.flush().context("flushing output")?;
    reader.check_sum().with_context(|| format!("verifying {name}"))?;
    Ok(bytes)
}

// ── `cryptstore mv` ───────────────────────────────────────────────────────────

fn cmd_mv(store: &CryptoStore<OpendalStore>, src: &str, dst: &str) -> Result<()> {
    store
        .rename(src, dst)
        .with_context(|| format!("renaming {src} to {dst}"))?;
    println!("Renamed {src} → {dst}");
    Ok(())
}

// ── `cryptstore inspect` ──────────────────────────────────────────────────────

fn cmd_inspect(store: &CryptoStore<OpendalStore>, name: &str) -> Result<()> {
    let (header, version) = store
        .read_header(name)
        .with_context(|| format!("reading header of {name}"))?;

    println!("Object: {name}");
    match version {
        HeaderVersion::Current => {
            println!("  version:    current (sidecar {})", store.header_name(name))
        }
        HeaderVersion::Legacy => println!("  version:    legacy (embedded)"),
    }
    println!("  hash_type:  {}", header.hash_algorithm());
    println!("  hash:       {}", hex::encode(header.hash()));
    println!("  enc_key:    {} bytes", header.wrapped_key().len());
    println!("  iv:         {}", hex::encode(header.iv()));
    Ok(())
}

// ── `cryptstore keygen` ───────────────────────────────────────────────────────

fn cmd_keygen(out: &Path, bits: usize, force: bool) -> Result<()> {
    let private_path = out.join("private.pem");
    let public_path = out.join("public.pem");
    if !force {
        for path in [&private_path, &public_path] {
            if path.exists() {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
        }
    }
    std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;

    let pb = make_spinner("keygen");
    pb.set_message(format!("generating {bits}-bit RSA key"));
    let generated = cryptstore_crypto::generate_keypair(bits);
    pb.finish_and_clear();
    let (private_pem, public_pem) = generated.context("generating RSA key pair")?;

    write_private_key(&private_path, private_pem.as_bytes())?;
    std::fs::write(&public_path, public_pem.as_bytes())
        .with_context(|| format!("writing {}", public_path.display()))?;

    println!("Generated {bits}-bit RSA key pair:");
    println!("  private: {}", private_path.display());
    println!("  public:  {}", public_path.display());
    println!();
    println!("Add to cryptstore.toml:");
    println!("  [crypto]");
    println!("  private_key_file = {:?}", private_path.display().to_string());
    println!("  public_key_file = {:?}", public_path.display().to_string());
    Ok(())
}

fn write_private_key(path: &Path, pem: &[u8]) -> Result<()> {
    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts
        .open(path)
        .with_context(|| format!("creating {}", path.display()))?;
    file.write_all(pem)
        .with_context(|| format!("writing {}", path.display()))
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

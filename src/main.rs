//! Command-line entry point: the HTTP service plus local crack/encrypt/decrypt tools.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pdf_pwlab::candidate::SYMBOLS;
use pdf_pwlab::config::DEFAULT_MAX_CANDIDATES;
use pdf_pwlab::{
    CancelToken, CandidateSpace, Charset, CipherKind, CrackEngine, CrackJob, EncryptService,
    JobState, PdfCipherCodec, Settings, Unlock,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
/// PDF password recovery and protection.
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service used by the web front-end
    Serve(Settings),
    /// Recover the password of a protected PDF
    Crack(CrackArgs),
    /// Password-protect a PDF
    Encrypt(EncryptArgs),
    /// Remove the protection of a PDF with a known password
    Decrypt(DecryptArgs),
}

#[derive(Args, Debug)]
struct CrackArgs {
    /// Path to the password-protected PDF
    #[arg(short = 'i', long = "input", value_name = "PDF")]
    input: PathBuf,

    /// Try the passwords of this file, one per line, instead of brute force
    #[arg(short = 'w', long = "wordlist", value_name = "FILE")]
    wordlist: Option<PathBuf>,

    /// Explicit brute-force alphabet (duplicates are ignored)
    #[arg(short = 'c', long = "charset", conflicts_with_all = ["digit", "alphabet", "symbol"])]
    charset: Option<String>,

    /// Minimum password length to brute-force
    #[arg(long = "min", default_value_t = 1)]
    min: usize,

    /// Maximum password length to brute-force
    #[arg(long = "max", default_value_t = 8)]
    max: usize,

    /// Include digits in the candidate alphabet
    #[arg(short = 'd', long = "digit", action = ArgAction::SetTrue)]
    digit: bool,

    /// Include alphabetic characters in the candidate alphabet
    #[arg(short = 'a', long = "alphabet", action = ArgAction::SetTrue)]
    alphabet: bool,

    /// Include common symbols in the candidate alphabet
    #[arg(short = 's', long = "symbol", action = ArgAction::SetTrue)]
    symbol: bool,

    /// Number of worker threads (0 = one per core)
    #[arg(short = 't', long = "threads", default_value_t = 0)]
    threads: usize,

    /// Refuse any single length whose search space is larger than this
    #[arg(long, default_value_t = DEFAULT_MAX_CANDIDATES)]
    max_candidates: u64,
}

#[derive(Args, Debug)]
struct EncryptArgs {
    #[arg(short = 'i', long = "input", value_name = "PDF")]
    input: PathBuf,

    #[arg(short = 'o', long = "output", value_name = "PDF")]
    output: PathBuf,

    #[arg(short = 'p', long = "password")]
    password: String,

    #[arg(long, value_enum, default_value_t = CipherKind::Aes128)]
    cipher: CipherKind,
}

#[derive(Args, Debug)]
struct DecryptArgs {
    #[arg(short = 'i', long = "input", value_name = "PDF")]
    input: PathBuf,

    #[arg(short = 'o', long = "output", value_name = "PDF")]
    output: PathBuf,

    #[arg(short = 'p', long = "password")]
    password: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = match cli.command {
        Command::Serve(_) => "pdf_pwlab=info,tower_http=info",
        _ => "pdf_pwlab=warn",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match cli.command {
        Command::Serve(settings) => serve(settings).map(|()| ExitCode::SUCCESS),
        Command::Crack(args) => crack(args),
        Command::Encrypt(args) => encrypt(args).map(|()| ExitCode::SUCCESS),
        Command::Decrypt(args) => decrypt(args).map(|()| ExitCode::SUCCESS),
    };

    result.unwrap_or_else(|e| {
        eprintln!("Error: {e:#}");
        ExitCode::from(1)
    })
}

fn serve(settings: Settings) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(async move {
        let bind = settings.bind;
        let app = pdf_pwlab::app(settings);
        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .with_context(|| format!("failed to bind {bind}"))?;

        info!("pdf-pwlab API listening on http://{bind}");

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutting down");
            })
            .await
            .context("server error")
    })
}

/// Validates flags, loads the PDF, and searches length by length.
fn crack(args: CrackArgs) -> Result<ExitCode> {
    if args.min > args.max {
        eprintln!(
            "Error: --min ({}) must be less than or equal to --max ({}).",
            args.min, args.max
        );
        return Ok(ExitCode::from(1));
    }

    let spaces = match &args.wordlist {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read wordlist {}", path.display()))?;
            vec![CandidateSpace::dictionary(text.lines())]
        }
        None => {
            let Some(charset) = cli_charset(&args) else {
                eprintln!(
                    "Error: provide a candidate set via --charset, --digit, --alphabet and/or --symbol."
                );
                return Ok(ExitCode::from(1));
            };
            (args.min.max(1)..=args.max)
                .map(|len| CandidateSpace::brute_force(charset.clone(), len))
                .collect::<pdf_pwlab::Result<Vec<_>>>()?
        }
    };

    let engine = CrackEngine::new(args.threads, args.max_candidates, 1);
    for space in &spaces {
        engine.admit(space)?;
    }

    let start = Instant::now();
    let total_attempts = spaces
        .iter()
        .fold(0u64, |acc, space| acc.saturating_add(space.len()));

    println!("PDF: {}", args.input.display());
    match &args.wordlist {
        Some(path) => println!("Wordlist: {} ({} entries)", path.display(), total_attempts),
        None => {
            println!("Min length: {}", args.min);
            println!("Max length: {}", args.max);
        }
    }
    println!("Workers: {}", engine.workers());

    if total_attempts == 0 {
        println!("Nothing to brute-force: empty search space.");
        println!("Elapsed: {:.2?}", start.elapsed());
        return Ok(ExitCode::SUCCESS);
    }

    let codec = PdfCipherCodec::default();
    let bytes = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let document = codec.load(&bytes).context("Failed to load PDF")?;

    if !document.is_encrypted() {
        println!("Not Encrypted");
        println!("Elapsed: {:.2?}", start.elapsed());
        return Ok(ExitCode::SUCCESS);
    }

    let progress = ProgressBar::new(total_attempts);
    progress.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} {percent:>3}% [{wide_bar:.cyan/blue}] ({eta} remaining)",
        )
        .expect("valid progress template"),
    );

    let unlock = Unlock {
        codec: &codec,
        document: &document,
    };
    let cancel = CancelToken::new();

    let mut result = Ok(None);
    for space in spaces {
        let mut job = CrackJob::new(space);
        match engine.run(&mut job, &unlock, &cancel, Some(&progress)) {
            Ok(report) if report.state == JobState::Found => {
                result = Ok(report.password);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }

    progress.finish_and_clear();
    let elapsed = start.elapsed();

    match result {
        Ok(Some(password)) => {
            println!("Password found: {}", password);

            match codec.decrypt(&document, &password) {
                Ok(_) => println!("Done"),
                Err(e) => {
                    eprintln!(
                        "Unexpected error re-opening PDF with discovered password: {}",
                        e
                    );
                    println!("Elapsed: {:.2?}", elapsed);
                    return Ok(ExitCode::from(3));
                }
            }

            println!("Elapsed: {:.2?}", elapsed);
            Ok(ExitCode::SUCCESS)
        }
        Ok(None) => {
            println!("Password not found in provided search space.");
            println!("Elapsed: {:.2?}", elapsed);
            Ok(ExitCode::from(2))
        }
        Err(e) => {
            eprintln!("Decryption error: {}", e);
            println!("Elapsed: {:.2?}", elapsed);
            Ok(ExitCode::from(3))
        }
    }
}

/// Alphabet from `--charset`, or assembled from the class flags.
fn cli_charset(args: &CrackArgs) -> Option<Charset> {
    if let Some(charset) = &args.charset {
        return Some(Charset::new(charset));
    }

    let mut symbols = String::new();
    if args.digit {
        symbols.extend('0'..='9');
    }
    if args.alphabet {
        symbols.extend(('a'..='z').chain('A'..='Z'));
    }
    if args.symbol {
        symbols.extend(SYMBOLS.iter().copied());
    }

    (!symbols.is_empty()).then(|| Charset::new(&symbols))
}

fn encrypt(args: EncryptArgs) -> Result<()> {
    let source = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let output = EncryptService::new(PdfCipherCodec::new(args.cipher))
        .encrypt(&source, &args.password)
        .context("Failed to encrypt PDF")?;
    fs::write(&args.output, output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    println!("Encrypted: {}", args.output.display());
    Ok(())
}

fn decrypt(args: DecryptArgs) -> Result<()> {
    let codec = PdfCipherCodec::default();
    let source = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let document = codec.load(&source).context("Failed to load PDF")?;
    let output = codec
        .decrypt(&document, &args.password)
        .context("Failed to decrypt PDF")?;
    fs::write(&args.output, output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    println!("Decrypted: {}", args.output.display());
    Ok(())
}

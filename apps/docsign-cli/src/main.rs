//! docsign: sign and verify PDFs with NPKI certificates
//!
//! Logs go to stderr so `--json` output on stdout stays machine readable.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use docsign_core::{
    sign_pdf, verify_all, Certificate, CertificateStore, PdfRect, SignatureConfig,
};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "docsign")]
#[command(version, about = "Sign and verify PDF documents with NPKI certificates")]
struct Cli {
    /// NPKI certificate root (defaults to the platform location)
    #[arg(long, env = "NPKI_HOME", global = true)]
    npki_home: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List certificates found in the NPKI store
    List {
        #[arg(long)]
        json: bool,
    },

    /// Sign a PDF
    Sign {
        input: PathBuf,
        output: PathBuf,

        /// Certificate directory, subject common name or serial number (hex)
        #[arg(short, long)]
        cert: String,

        #[arg(long, env = "DOCSIGN_CERT_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long, default_value = "")]
        reason: String,

        #[arg(long, default_value = "")]
        location: String,

        /// 1-indexed page for the stamp; out of range uses the last page
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,

        /// Stamp rectangle as x,y,width,height in points
        #[arg(long, value_parser = parse_rect)]
        rect: Option<PdfRect>,

        /// Image drawn instead of the text stamp
        #[arg(long)]
        stamp: Option<PathBuf>,
    },

    /// Verify every signature in a PDF
    Verify {
        input: PathBuf,

        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let store = match cli.npki_home {
        Some(root) => CertificateStore::new(root),
        None => CertificateStore::from_env(),
    };
    tracing::debug!(root = %store.root().display(), "using certificate store");

    match cli.command {
        Command::List { json } => {
            list(&store, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Sign {
            input,
            output,
            cert,
            password,
            reason,
            location,
            page,
            rect,
            stamp,
        } => {
            let certificate = select_certificate(&store, &cert)?;
            if certificate.is_expired() {
                tracing::warn!(
                    subject = certificate.subject_cn(),
                    not_after = %certificate.not_after(),
                    "certificate has expired"
                );
            }

            let mut config = SignatureConfig::unlock(&store, certificate, &password)
                .context("failed to unlock private key")?
                .with_reason(reason)
                .with_location(location);
            if let Some(stamp) = stamp {
                config = config.with_stamp_image(stamp);
            }

            let signed = sign_pdf(&input, &output, config, (page - 1) as usize, rect)
                .with_context(|| format!("failed to sign {}", input.display()))?;
            println!(
                "Signed {} as {} on page {}",
                output.display(),
                signed.field_name,
                signed.page_number
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify { input, json } => verify(&input, json),
    }
}

fn list(store: &CertificateStore, as_json: bool) -> anyhow::Result<()> {
    let certificates = store.list_user_certificates();

    if as_json {
        let entries: Vec<_> = certificates
            .iter()
            .map(|cert| {
                json!({
                    "subject": cert.subject_cn(),
                    "issuer": cert.issuer_cn(),
                    "serial": cert.serial_number_hex(),
                    "not_before": cert.not_before(),
                    "not_after": cert.not_after(),
                    "expired": cert.is_expired(),
                    "path": cert.key_dir(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if certificates.is_empty() {
        println!("No certificates found under {}", store.root().display());
    }
    for cert in &certificates {
        println!(
            "{}  [{}]  serial {}  valid until {}{}",
            cert.subject_cn(),
            cert.issuer_cn(),
            cert.serial_number_hex(),
            cert.not_after().format("%Y-%m-%d"),
            if cert.is_expired() { "  (expired)" } else { "" }
        );
        println!("    {}", cert.key_dir().display());
    }
    Ok(())
}

fn verify(input: &Path, as_json: bool) -> anyhow::Result<ExitCode> {
    let results =
        verify_all(input).with_context(|| format!("failed to read {}", input.display()))?;
    let all_valid = !results.is_empty() && results.iter().all(|r| r.result.is_valid);

    if as_json {
        let entries: Vec<_> = results
            .iter()
            .map(|r| {
                json!({
                    "field": r.field_name,
                    "page": r.page_number,
                    "result": r.result,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if results.is_empty() {
        println!("No signatures found in {}", input.display());
    } else {
        for r in &results {
            let status = if r.result.is_valid {
                "VALID"
            } else if r.result.is_document_modified {
                "MODIFIED"
            } else {
                "INVALID"
            };
            println!("{} {}: {}", status, r.field_name, r.result.message);
            if let Some(name) = &r.result.signer_name {
                println!("    signer:   {}", name);
            }
            if let Some(time) = r.result.signing_time {
                println!("    signed:   {}", time.to_rfc3339());
            }
            if let Some(reason) = r.result.reason.as_deref().filter(|s| !s.is_empty()) {
                println!("    reason:   {}", reason);
            }
            if let Some(location) = r.result.location.as_deref().filter(|s| !s.is_empty()) {
                println!("    location: {}", location);
            }
        }
    }

    Ok(if all_valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Resolve `query` as a certificate directory, subject CN or serial number
fn select_certificate(store: &CertificateStore, query: &str) -> anyhow::Result<Certificate> {
    let path = Path::new(query);
    if path.is_dir() {
        return CertificateStore::load_certificate_from_path(path)
            .with_context(|| format!("no usable certificate in {}", path.display()));
    }

    let mut matches: Vec<Certificate> = store
        .list_user_certificates()
        .into_iter()
        .filter(|cert| {
            cert.subject_cn() == query || cert.serial_number_hex().eq_ignore_ascii_case(query)
        })
        .collect();

    match matches.len() {
        0 => bail!(
            "no certificate matching {:?} under {}",
            query,
            store.root().display()
        ),
        1 => Ok(matches.remove(0)),
        n => bail!("{} certificates match {:?}; pass the directory instead", n, query),
    }
}

fn parse_rect(s: &str) -> Result<PdfRect, String> {
    let values = s
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in rectangle: {}", e))?;

    match values.as_slice() {
        &[x, y, width, height] if width > 0.0 && height > 0.0 => {
            Ok(PdfRect::new(x, y, width, height))
        }
        &[_, _, _, _] => Err("rectangle width and height must be positive".to_string()),
        _ => Err("expected x,y,width,height".to_string()),
    }
}

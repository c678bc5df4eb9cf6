// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use snpcert::cert::{BindingMode, CertificateBuilder, CertificateVerifier};
use snpcert::claims::{match_claims, ClaimSet};
use snpcert::config::Config;
use snpcert::evidence::{EvidenceCollector, VerifierRegistry};
use snpcert::snp::{SnpAttester, SnpVerifier};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
enum SnpCertCli {
    Collect(CollectArgs),
    GenCert(GenCertArgs),
    VerifyCert(VerifyCertArgs),
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Collect SEV-SNP evidence carrying the supplied binding value")]
struct CollectArgs {
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Hex encoded binding value, at most 64 bytes
    #[arg(short, long, default_value = "")]
    binding: String,

    #[arg(short, long, default_value = "evidence.json")]
    output: PathBuf,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Generate a self-signed certificate embedding SEV-SNP evidence \
    and the supplied claims")]
struct GenCertArgs {
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// PEM private key; a P-256 key is generated when absent
    #[arg(short, long)]
    key: Option<PathBuf>,

    /// JSON array of {"name": .., "value": <hex>} claims
    #[arg(long)]
    claims: Option<PathBuf>,

    #[arg(long, value_enum)]
    binding: Option<BindingMode>,

    #[arg(long, default_value = "cert.der")]
    cert_out: PathBuf,

    #[arg(long, default_value = "key.pem")]
    key_out: PathBuf,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Verify an attested certificate against the trusted AMD root keys \
    and the expected claims")]
struct VerifyCertArgs {
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "cert.der")]
    cert: PathBuf,

    /// JSON array of {"name": .., "value": <hex>} expected claims
    #[arg(long, default_value = "claims.json")]
    claims: PathBuf,

    #[arg(short, long)]
    tastore: Option<PathBuf>,

    #[arg(long, value_enum)]
    binding: Option<BindingMode>,

    #[arg(long)]
    allow_debug: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match SnpCertCli::parse() {
        SnpCertCli::Collect(args) => match collect(&args) {
            Ok(_) => println!("evidence collection successful"),
            Err(e) => eprintln!("evidence collection failed: {e}"),
        },

        SnpCertCli::GenCert(args) => match gen_cert(&args) {
            Ok(_) => println!("certificate generation successful"),
            Err(e) => eprintln!("certificate generation failed: {e}"),
        },

        SnpCertCli::VerifyCert(args) => match verify_cert(&args) {
            Ok(_) => println!("certificate verification successful"),
            Err(e) => eprintln!("certificate verification failed: {e}"),
        },
    }
}

fn load_config(p: &Option<PathBuf>) -> Result<Config, Box<dyn Error>> {
    match p {
        Some(p) => Ok(Config::load(p)?),
        None => Ok(Config::default()),
    }
}

fn load_claims(p: &Path) -> Result<ClaimSet, Box<dyn Error>> {
    let j = fs::read_to_string(p)?;

    Ok(ClaimSet::from_json(&j)?)
}

fn collect(args: &CollectArgs) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args.config)?;

    let binding = hex::decode(&args.binding)?;

    let e = SnpAttester::from_config(&config.attester).collect(&binding)?;

    fs::write(&args.output, serde_json::to_string_pretty(&e)?)?;

    Ok(())
}

fn gen_cert(args: &GenCertArgs) -> Result<(), Box<dyn Error>> {
    let mut config = load_config(&args.config)?;

    if let Some(b) = args.binding {
        config.certificate.binding = b;
    }

    let claims = match &args.claims {
        Some(p) => load_claims(p)?,
        None => ClaimSet::new(),
    };

    let key = match &args.key {
        Some(p) => Some(fs::read(p)?),
        None => None,
    };

    let b = CertificateBuilder::new(
        config.certificate,
        SnpAttester::from_config(&config.attester),
    );

    let (cert, generated) = b.build(key.as_deref(), &claims)?;

    fs::write(&args.cert_out, cert)?;

    if let Some(k) = generated {
        fs::write(&args.key_out, k)?;
    }

    Ok(())
}

fn verify_cert(args: &VerifyCertArgs) -> Result<(), Box<dyn Error>> {
    let mut config = load_config(&args.config)?;

    if let Some(b) = args.binding {
        config.certificate.binding = b;
    }

    if args.tastore.is_some() {
        config.verifier.trust_anchors = args.tastore.clone();
    } else if config.verifier.trust_anchors.is_none() {
        config.verifier.trust_anchors = Some(PathBuf::from("tastore.json"));
    }

    let tas = config.verifier.trust_anchor_store()?;

    let mut registry = VerifierRegistry::new();
    registry.register(Box::new(
        SnpVerifier::new(tas).allow_debug(args.allow_debug || config.verifier.allow_debug),
    ));

    let expected = load_claims(&args.claims)?;

    let cert = fs::read(&args.cert)?;

    CertificateVerifier::from_config(registry, &config.certificate).verify(
        &cert,
        match_claims,
        &expected,
    )?;

    Ok(())
}

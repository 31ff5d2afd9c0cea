//! credfuse CLI
//!
//! Entry point for the `credfuse` command-line tool.

use clap::{ArgAction, Parser, Subcommand};
use credfuse::evidence::evidence_fn;
use credfuse::signing::{compute_key_fingerprint, decode_signing_key, encode_signing_key, encode_verifying_key, generate_keypair};
use credfuse::{
    AttestationService, CancelToken, CertificateFields, EffectiveConfig, IssuerSigner, KeyRegistry, LayerResult,
    VerificationEngine, VerificationRequest,
};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::Level;

#[derive(Parser)]
#[command(name = "credfuse")]
#[command(about = "Credential verification fusion and attestation engine", version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Override a config value (e.g. thresholds.auto_approve=0.9)
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    set: Vec<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an Ed25519 issuer key pair
    Keygen {
        /// Write the key pair JSON here instead of stdout
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Institution key management
    Keys {
        #[command(subcommand)]
        action: KeysCommands,
    },

    /// Decide a verification from serialized layer results
    Decide {
        /// JSON array of layer results
        #[arg(long, short = 'e')]
        evidence: PathBuf,

        /// JSON certificate fields entered by an operator
        #[arg(long)]
        fields: Option<PathBuf>,

        /// Reference to the submitted credential
        #[arg(long, default_value = "cli")]
        blob_ref: String,
    },

    /// Sign certificate fields and print the QR payload
    Issue {
        /// Key registry file
        #[arg(long, short = 'r')]
        registry: PathBuf,

        /// File holding the base64 signing key
        #[arg(long)]
        signing_key: PathBuf,

        /// Issuing institution
        #[arg(long)]
        issuer: String,

        /// Registered key id (default: the issuer's current key)
        #[arg(long)]
        key_id: Option<String>,

        /// JSON certificate fields
        #[arg(long)]
        fields: PathBuf,
    },

    /// Verify QR content and print the public response
    VerifyQr {
        /// Key registry file
        #[arg(long, short = 'r')]
        registry: PathBuf,

        /// Raw QR content (read from stdin when omitted)
        qr: Option<String>,
    },
}

#[derive(Subcommand)]
enum KeysCommands {
    /// Register an issuer's first key
    Register {
        #[arg(long, short = 'r')]
        registry: PathBuf,

        #[arg(long)]
        issuer: String,

        /// Base64 Ed25519 public key
        #[arg(long)]
        public_key: String,
    },

    /// Replace an issuer's current key
    Rotate {
        #[arg(long, short = 'r')]
        registry: PathBuf,

        #[arg(long)]
        issuer: String,

        /// Base64 Ed25519 public key
        #[arg(long)]
        public_key: String,
    },

    /// Revoke a key
    Revoke {
        #[arg(long, short = 'r')]
        registry: PathBuf,

        #[arg(long)]
        issuer: String,

        #[arg(long)]
        key_id: String,

        #[arg(long)]
        reason: String,
    },

    /// List registered keys
    List {
        #[arg(long, short = 'r')]
        registry: PathBuf,

        /// Only keys of this issuer
        #[arg(long)]
        issuer: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(true)
        .init();

    let config = load_config(cli.config.as_deref(), &cli.set);

    match cli.command {
        Commands::Keygen { out } => run_keygen(out),
        Commands::Keys { action } => match action {
            KeysCommands::Register {
                registry,
                issuer,
                public_key,
            } => run_keys_register(&registry, &issuer, &public_key),
            KeysCommands::Rotate {
                registry,
                issuer,
                public_key,
            } => run_keys_rotate(&registry, &issuer, &public_key),
            KeysCommands::Revoke {
                registry,
                issuer,
                key_id,
                reason,
            } => run_keys_revoke(&registry, &issuer, &key_id, &reason),
            KeysCommands::List { registry, issuer } => run_keys_list(&registry, issuer.as_deref()),
        },
        Commands::Decide {
            evidence,
            fields,
            blob_ref,
        } => run_decide(&config, &evidence, fields.as_deref(), blob_ref),
        Commands::Issue {
            registry,
            signing_key,
            issuer,
            key_id,
            fields,
        } => run_issue(&config, &registry, &signing_key, &issuer, key_id, &fields),
        Commands::VerifyQr { registry, qr } => run_verify_qr(&config, &registry, qr),
    }
}

fn load_config(path: Option<&Path>, overrides: &[String]) -> EffectiveConfig {
    let result = credfuse::config::parse_overrides(overrides)
        .and_then(|cli| EffectiveConfig::build(path, cli));
    match result {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(2);
        }
    }
}

fn fail(context: &str, e: impl std::fmt::Display) -> ! {
    eprintln!("{}: {}", context, e);
    process::exit(1);
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> T {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => fail(&format!("Error reading {}", path.display()), e),
    };
    match serde_json::from_str(&contents) {
        Ok(v) => v,
        Err(e) => fail(&format!("Error parsing {}", path.display()), e),
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => fail("Error serializing output", e),
    }
}

fn open_registry(path: &Path) -> KeyRegistry {
    KeyRegistry::load_or_default(path).unwrap_or_else(|e| fail("Error loading key registry", e))
}

fn save_registry(registry: &KeyRegistry, path: &Path) {
    if let Err(e) = registry.save_to_file(path) {
        fail("Error saving key registry", e);
    }
}

fn run_keygen(out: Option<PathBuf>) {
    let signing_key = generate_keypair();
    let verifying_key = signing_key.verifying_key();
    let output = serde_json::json!({
        "signing_key": encode_signing_key(&signing_key),
        "public_key": encode_verifying_key(&verifying_key),
        "fingerprint": compute_key_fingerprint(&verifying_key),
    });

    match out {
        Some(path) => {
            let json = serde_json::to_string_pretty(&output).unwrap_or_else(|e| fail("Error serializing key", e));
            if let Err(e) = fs::write(&path, json) {
                fail(&format!("Error writing {}", path.display()), e);
            }
            println!("{}", output["public_key"].as_str().unwrap_or_default());
        }
        None => print_json(&output),
    }
}

fn run_keys_register(path: &Path, issuer: &str, public_key: &str) {
    let registry = open_registry(path);
    let key_id = registry
        .register(issuer, public_key)
        .unwrap_or_else(|e| fail("Error registering key", e));
    save_registry(&registry, path);
    println!("{}", key_id);
}

fn run_keys_rotate(path: &Path, issuer: &str, public_key: &str) {
    let registry = open_registry(path);
    let key_id = registry
        .rotate(issuer, public_key)
        .unwrap_or_else(|e| fail("Error rotating key", e));
    save_registry(&registry, path);
    println!("{}", key_id);
}

fn run_keys_revoke(path: &Path, issuer: &str, key_id: &str, reason: &str) {
    let registry = open_registry(path);
    if let Err(e) = registry.revoke(issuer, key_id, reason) {
        fail("Error revoking key", e);
    }
    save_registry(&registry, path);
}

fn run_keys_list(path: &Path, issuer: Option<&str>) {
    let registry = open_registry(path);
    let keys = match issuer {
        Some(issuer) => registry.history(issuer),
        None => registry.keys(),
    };
    print_json(&keys);
}

fn run_decide(config: &EffectiveConfig, evidence: &Path, fields: Option<&Path>, blob_ref: String) {
    let layers: Vec<LayerResult> = read_json(evidence);
    let engine = VerificationEngine::new(config.engine().clone())
        .unwrap_or_else(|e| fail("Error creating engine", e));

    let mut request = VerificationRequest::new(blob_ref);
    for layer in layers {
        request = request.with_source(evidence_fn(layer.layer(), move |_| Ok(layer)));
    }
    if let Some(path) = fields {
        request = request.with_manual_fields(read_json::<CertificateFields>(path));
    }

    match engine.verify(request, &CancelToken::new()) {
        Ok(outcome) => print_json(&outcome.record),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn run_issue(
    config: &EffectiveConfig,
    registry_path: &Path,
    signing_key_path: &Path,
    issuer: &str,
    key_id: Option<String>,
    fields_path: &Path,
) {
    let registry = Arc::new(open_registry(registry_path));
    let key_id = match key_id {
        Some(key_id) => key_id,
        None => registry
            .current(issuer)
            .map(|k| k.key_id)
            .unwrap_or_else(|e| fail("Error resolving signing key", e)),
    };

    let encoded = fs::read_to_string(signing_key_path)
        .unwrap_or_else(|e| fail(&format!("Error reading {}", signing_key_path.display()), e));
    let signing_key = decode_signing_key(&extract_signing_key(&encoded))
        .unwrap_or_else(|e| fail("Error decoding signing key", e));
    let signer = IssuerSigner::new(issuer, key_id, signing_key);

    let fields: CertificateFields = read_json(fields_path);
    let service = AttestationService::new(registry, config.engine().attestation);
    let attestation = service
        .issue(&signer, fields)
        .unwrap_or_else(|e| fail("Error issuing attestation", e));
    let qr = attestation
        .to_qr_string()
        .unwrap_or_else(|e| fail("Error encoding QR payload", e));
    println!("{}", qr);
}

/// Accept either a bare base64 key or the JSON written by `keygen`.
fn extract_signing_key(contents: &str) -> String {
    let trimmed = contents.trim();
    serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|v| v.get("signing_key").and_then(|k| k.as_str()).map(str::to_string))
        .unwrap_or_else(|| trimmed.to_string())
}

fn run_verify_qr(config: &EffectiveConfig, registry_path: &Path, qr: Option<String>) {
    let raw = match qr {
        Some(raw) => raw,
        None => {
            let mut buf = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut buf) {
                fail("Error reading stdin", e);
            }
            buf
        }
    };

    let registry = Arc::new(open_registry(registry_path));
    let service = AttestationService::new(registry, config.engine().attestation);
    let response = service.verify_qr(raw.trim());
    print_json(&response);
    if !response.valid {
        process::exit(1);
    }
}

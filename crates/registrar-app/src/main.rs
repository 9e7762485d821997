// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Registrar — provenance tooling for academic records.
//
// Entry point. Initialises logging, opens the backend services in the data
// directory, and dispatches one command.

mod services;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use registrar_core::error::Result;
use registrar_core::human_errors::humanize_error;
use registrar_core::store::RecordStore;
use registrar_core::types::{NewResult, Principal, PrincipalId, ResultId, Role, Scores, SubmissionContext};
use registrar_document::PdfInspector;
use registrar_security::ContainerVariant;
use registrar_security::container::PDF_MARKER;
use registrar_workflow::workflow::result_subject;
use serde_json::json;

use services::app_services::AppServices;
use services::data_dir;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "registrar",
    version,
    about = "Signed approvals and encrypted exports for academic records"
)]
struct Cli {
    /// Data directory holding records.db, audit.db and registrar.json.
    #[arg(long, global = true, env = "REGISTRAR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the data directory and write a default registrar.json.
    Init,

    /// Manage principals.
    #[command(subcommand)]
    Principal(PrincipalCmd),

    /// Key access secrets, key pairs and certificates.
    #[command(subcommand)]
    Keys(KeysCmd),

    /// Result records and their approval lifecycle.
    #[command(subcommand)]
    Result(ResultCmd),

    /// Encrypt a JSON document for a recipient.
    Export {
        #[arg(long)]
        recipient: PrincipalId,
        /// JSON file to encrypt.
        #[arg(long)]
        input: PathBuf,
        #[arg(long, value_enum, default_value_t = VariantArg::Pdf)]
        variant: VariantArg,
        /// Defaults to the input name with a .pdf or .secure extension.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Decrypt an exported file and print its JSON.
    Import {
        #[arg(long)]
        principal: PrincipalId,
        #[arg(long, env = "REGISTRAR_KEY_SECRET", hide_env_values = true)]
        secret: String,
        #[arg(long)]
        input: PathBuf,
    },

    /// Describe a file without decrypting it.
    Inspect {
        #[arg(long)]
        input: PathBuf,
    },

    /// Show the audit trail.
    Audit {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Only entries for this result record.
        #[arg(long)]
        result: Option<ResultId>,
    },
}

#[derive(Subcommand, Debug)]
enum PrincipalCmd {
    /// Add or replace a principal.
    Add {
        #[arg(long)]
        id: PrincipalId,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        role: Role,
        #[arg(long)]
        faculty: Option<String>,
        #[arg(long)]
        department: Option<String>,
    },
    Show {
        #[arg(long)]
        id: PrincipalId,
    },
}

#[derive(Subcommand, Debug)]
enum KeysCmd {
    /// Establish a principal's key access secret (once only).
    SetSecret {
        #[arg(long)]
        principal: PrincipalId,
        #[arg(long, env = "REGISTRAR_KEY_SECRET", hide_env_values = true)]
        secret: String,
    },
    /// Generate a key pair and certificate, superseding any earlier one.
    Provision {
        #[arg(long)]
        principal: PrincipalId,
        #[arg(long, env = "REGISTRAR_KEY_SECRET", hide_env_values = true)]
        secret: String,
    },
    /// Print the current certificate and whether it verifies.
    Show {
        #[arg(long)]
        principal: PrincipalId,
    },
    /// Print the private key PEM.
    Reveal {
        #[arg(long)]
        principal: PrincipalId,
        #[arg(long, env = "REGISTRAR_KEY_SECRET", hide_env_values = true)]
        secret: String,
    },
}

#[derive(Subcommand, Debug)]
enum ResultCmd {
    /// Create a draft result.
    Create {
        #[arg(long)]
        author: PrincipalId,
        #[arg(long)]
        student: PrincipalId,
        #[arg(long)]
        course: String,
        #[arg(long)]
        semester: String,
        #[arg(long)]
        session: String,
        #[arg(long)]
        faculty: String,
        #[arg(long)]
        department: String,
        #[arg(long)]
        ca: f64,
        #[arg(long)]
        exam: f64,
    },
    Submit {
        #[arg(long)]
        id: ResultId,
        #[command(flatten)]
        signer: SignerArgs,
        #[arg(long)]
        ip_address: Option<String>,
        #[arg(long)]
        user_agent: Option<String>,
    },
    Approve {
        #[arg(long)]
        id: ResultId,
        #[command(flatten)]
        signer: SignerArgs,
        #[arg(long)]
        notes: Option<String>,
    },
    Deny {
        #[arg(long)]
        id: ResultId,
        #[command(flatten)]
        signer: SignerArgs,
        #[arg(long)]
        reason: String,
    },
    Publish {
        #[arg(long)]
        id: ResultId,
        #[command(flatten)]
        signer: SignerArgs,
    },
    /// Return a denied result to draft, optionally with corrected scores.
    Revise {
        #[arg(long)]
        id: ResultId,
        #[arg(long)]
        actor: PrincipalId,
        #[arg(long, requires = "exam")]
        ca: Option<f64>,
        #[arg(long, requires = "ca")]
        exam: Option<f64>,
    },
    Show {
        #[arg(long)]
        id: ResultId,
    },
    List,
    /// Recompute the submission hash and verify every signature.
    Verify {
        #[arg(long)]
        id: ResultId,
    },
}

#[derive(clap::Args, Debug)]
struct SignerArgs {
    /// Principal performing the action.
    #[arg(long)]
    actor: PrincipalId,
    /// The actor's key access secret.
    #[arg(long, env = "REGISTRAR_KEY_SECRET", hide_env_values = true)]
    secret: String,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum VariantArg {
    Pdf,
    Generic,
}

impl From<VariantArg> for ContainerVariant {
    fn from(v: VariantArg) -> Self {
        match v {
            VariantArg::Pdf => ContainerVariant::Pdf,
            VariantArg::Generic => ContainerVariant::Generic,
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = %e, "command failed");
            let human = humanize_error(&e);
            eprintln!("error: {}", human.message);
            eprintln!("  {}", human.suggestion);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let dir = data_dir::data_dir(cli.data_dir.as_deref())?;
    let svc = AppServices::init(dir)?;

    match cli.cmd {
        Commands::Init => {
            if svc.write_default_config()? {
                println!("wrote default config to {}", svc.data_dir().display());
            }
            print_json(svc.config())
        }
        Commands::Principal(cmd) => principal(&svc, cmd),
        Commands::Keys(cmd) => keys(&svc, cmd),
        Commands::Result(cmd) => result(&svc, cmd),
        Commands::Export {
            recipient,
            input,
            variant,
            output,
        } => {
            let payload: serde_json::Value = serde_json::from_slice(&std::fs::read(&input)?)?;
            let variant = ContainerVariant::from(variant);
            let artifact = svc.export(recipient, &payload, variant)?;
            let output = output.unwrap_or_else(|| input.with_extension(variant.file_type()));
            std::fs::write(&output, artifact)?;
            println!("{}", output.display());
            Ok(())
        }
        Commands::Import {
            principal,
            secret,
            input,
        } => {
            let value = svc.import(principal, &secret, &std::fs::read(&input)?)?;
            print_json(&value)
        }
        Commands::Inspect { input } => inspect(&svc, &input),
        Commands::Audit { limit, result } => {
            let entries = match result {
                Some(id) => svc.audit_entries_for_subject(&result_subject(id))?,
                None => svc.recent_audit_entries(limit)?,
            };
            print_json(&json!({ "total": svc.audit_count()?, "entries": entries }))
        }
    }
}

fn principal(svc: &AppServices, cmd: PrincipalCmd) -> Result<()> {
    match cmd {
        PrincipalCmd::Add {
            id,
            name,
            email,
            role,
            faculty,
            department,
        } => {
            let principal = Principal {
                id,
                name,
                email,
                role,
                faculty,
                department,
            };
            svc.store().put_principal(&principal)?;
            print_json(&principal)
        }
        PrincipalCmd::Show { id } => print_json(&svc.store().principal(id)?),
    }
}

fn keys(svc: &AppServices, cmd: KeysCmd) -> Result<()> {
    let keys = svc.keys()?;
    match cmd {
        KeysCmd::SetSecret { principal, secret } => {
            keys.set_key_access_secret(principal, &secret)?;
            println!("key access secret set for principal {principal}");
            Ok(())
        }
        KeysCmd::Provision { principal, secret } => print_json(&keys.provision(principal, &secret)?),
        KeysCmd::Show { principal } => {
            let certificate = keys.certificate(principal)?;
            let valid = keys.verify_certificate(&certificate);
            print_json(&json!({ "valid": valid, "certificate": certificate }))
        }
        KeysCmd::Reveal { principal, secret } => {
            print!("{}", keys.reveal_private_key(principal, &secret)?.as_str());
            Ok(())
        }
    }
}

fn result(svc: &AppServices, cmd: ResultCmd) -> Result<()> {
    let workflow = svc.workflow();
    let record = match cmd {
        ResultCmd::Create {
            author,
            student,
            course,
            semester,
            session,
            faculty,
            department,
            ca,
            exam,
        } => workflow.create_result(
            author,
            NewResult {
                student_id: student,
                course_code: course,
                semester,
                session,
                faculty,
                department,
                scores: Scores { ca, exam },
            },
        )?,
        ResultCmd::Submit {
            id,
            signer,
            ip_address,
            user_agent,
        } => {
            let session = svc.session_for(signer.actor, &signer.secret)?;
            let context = SubmissionContext {
                ip_address,
                user_agent,
            };
            workflow.submit(id, signer.actor, &session, context)?
        }
        ResultCmd::Approve { id, signer, notes } => {
            let session = svc.session_for(signer.actor, &signer.secret)?;
            workflow.approve(id, signer.actor, &session, notes.as_deref())?
        }
        ResultCmd::Deny { id, signer, reason } => {
            let session = svc.session_for(signer.actor, &signer.secret)?;
            workflow.deny(id, signer.actor, &session, &reason)?
        }
        ResultCmd::Publish { id, signer } => {
            let session = svc.session_for(signer.actor, &signer.secret)?;
            workflow.publish(id, signer.actor, &session)?
        }
        ResultCmd::Revise { id, actor, ca, exam } => {
            let scores = ca.zip(exam).map(|(ca, exam)| Scores { ca, exam });
            workflow.revise(id, actor, scores)?
        }
        ResultCmd::Show { id } => svc.store().result(id)?,
        ResultCmd::List => return print_json(&svc.store().list_results()?),
        ResultCmd::Verify { id } => {
            workflow.verify_ledger(id)?;
            println!("result {id}: submission hash and all signatures verify");
            return Ok(());
        }
    };
    print_json(&record)
}

fn inspect(svc: &AppServices, input: &Path) -> Result<()> {
    let content = std::fs::read(input)?;
    let codec = svc.codec();
    let variant = codec.detect_variant(&content);

    let mut report = json!({
        "file": input.display().to_string(),
        "bytes": content.len(),
        "variant": variant,
        "validContainer": codec.is_valid_container(&content),
    });

    if variant == Some(ContainerVariant::Pdf) {
        let body_end = content
            .windows(PDF_MARKER.len())
            .position(|w| w == PDF_MARKER.as_bytes())
            .unwrap_or(content.len());
        match PdfInspector::from_bytes(&content[..body_end]) {
            Ok(pdf) => {
                report["pdf"] = json!({ "version": pdf.version(), "pages": pdf.page_count() });
            }
            Err(e) => {
                report["pdf"] = json!({ "error": e.to_string() });
            }
        }
    }
    print_json(&report)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

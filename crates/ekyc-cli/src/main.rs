use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ekyc_core::{
    diagnostics, DocumentDetails, DocumentType, FaceImage, IdentityKey, IdentityRecord, ImageRole,
    MatchDecision, OnnxFaceEmbedder, RawIdentifier, RecordStore, RegistrationCoordinator,
    RegistrationReport, RegistrationState, RejectReason, ScrfdDetector,
};
use ekyc_store::SqliteRecordStore;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod config;
mod recognizer;

use config::Config;
use recognizer::FieldsFileRecognizer;

#[derive(Parser)]
#[command(name = "ekyc", about = "eKYC registration: face match, field extraction, dedup")]
struct Cli {
    /// Configuration file (default: $XDG_CONFIG_HOME/ekyc/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the registry tables
    InitDb,
    /// Look up a registered identity by its raw document number
    Lookup {
        #[arg(long, value_parser = parse_doc_type)]
        doc_type: DocumentType,
        /// Raw document number; only its hash is used
        #[arg(long)]
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Verify an ID card against a selfie and register the holder
    Register {
        #[arg(long, value_parser = parse_doc_type)]
        doc_type: DocumentType,
        /// Photo of the identity document
        #[arg(long)]
        id_card: PathBuf,
        /// Live photo of the applicant
        #[arg(long)]
        selfie: PathBuf,
        /// JSON object of fields read off the ID card by the OCR step
        #[arg(long)]
        fields: PathBuf,
        #[arg(long)]
        json: bool,
        /// Write the side-by-side face comparison to this PNG
        #[arg(long)]
        save_comparison: Option<PathBuf>,
    },
}

fn parse_doc_type(s: &str) -> Result<DocumentType, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::InitDb => init_db(&config),
        Commands::Lookup { doc_type, id, json } => lookup(&config, doc_type, id, json),
        Commands::Register {
            doc_type,
            id_card,
            selfie,
            fields,
            json,
            save_comparison,
        } => register(
            &config,
            doc_type,
            &id_card,
            &selfie,
            fields,
            json,
            save_comparison.as_deref(),
        ),
    }
}

fn open_store(config: &Config) -> Result<SqliteRecordStore> {
    SqliteRecordStore::open(&config.database.path, config.registration.tables.clone())
        .with_context(|| format!("opening database {}", config.database.path.display()))
}

fn init_db(config: &Config) -> Result<ExitCode> {
    let store = open_store(config)?;
    let tables = store.tables();
    println!(
        "Database ready at {} (tables: {}, {})",
        config.database.path.display(),
        tables.pan,
        tables.aadhar
    );
    Ok(ExitCode::SUCCESS)
}

fn lookup(config: &Config, doc_type: DocumentType, raw_id: String, json: bool) -> Result<ExitCode> {
    let store = open_store(config)?;
    let key = IdentityKey::derive(RawIdentifier::new(raw_id));
    let table = config.registration.tables.for_document(doc_type);
    let record = store.get(table, &key).context("reading registry")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record.as_ref().map(without_embedding))?);
    } else {
        match &record {
            Some(record) => {
                print_record(record);
                if let Some(created_at) = record.created_at {
                    println!("  Registered: {created_at}");
                }
            }
            None => println!("No {doc_type} record for ID hash {key}"),
        }
    }

    Ok(if record.is_some() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn register(
    config: &Config,
    doc_type: DocumentType,
    id_card: &Path,
    selfie: &Path,
    fields: PathBuf,
    json: bool,
    save_comparison: Option<&Path>,
) -> Result<ExitCode> {
    let id_image = FaceImage::open(id_card)
        .with_context(|| format!("reading ID card image {}", id_card.display()))?;
    let selfie_image = FaceImage::open(selfie)
        .with_context(|| format!("reading selfie image {}", selfie.display()))?;

    let detector = ScrfdDetector::load(&config.models.detector_path())
        .context("loading face detector")?;
    let embedder = OnnxFaceEmbedder::load(&config.models.embedder_path())
        .context("loading face embedder")?;
    let store = open_store(config)?;

    let mut coordinator = RegistrationCoordinator::new(
        config.registration.clone(),
        detector,
        embedder,
        FieldsFileRecognizer::new(fields),
        store,
    )?;
    let report = coordinator.register(doc_type, &id_image, &selfie_image);

    if let Some(path) = save_comparison {
        diagnostics::save_comparison(&report.face, path)
            .with_context(|| format!("writing comparison image {}", path.display()))?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&ReportView::from(&report))?);
    } else {
        print_report(&report);
    }

    Ok(if report.is_admitted() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Machine-readable registration outcome.
#[derive(Serialize)]
struct ReportView<'a> {
    doc_type: DocumentType,
    state: RegistrationState,
    admitted: bool,
    reason: Option<RejectReason>,
    message: Option<&'static str>,
    face: MatchDecision,
    face_not_detected: &'a [ImageRole],
    record: Option<IdentityRecord>,
    existing: Option<IdentityRecord>,
    detail: Option<&'a str>,
}

impl<'a> From<&'a RegistrationReport> for ReportView<'a> {
    fn from(report: &'a RegistrationReport) -> Self {
        let reason = report.reject_reason();
        Self {
            doc_type: report.doc_type,
            state: report.state(),
            admitted: report.is_admitted(),
            reason,
            message: reason.map(|r| r.message()),
            face: report.face.decision,
            face_not_detected: &report.face.face_not_detected,
            record: report.candidate.as_ref().map(without_embedding),
            existing: report.existing.as_ref().map(without_embedding),
            detail: report.detail.as_deref(),
        }
    }
}

fn without_embedding(record: &IdentityRecord) -> IdentityRecord {
    IdentityRecord {
        embedding: None,
        ..record.clone()
    }
}

fn print_record(record: &IdentityRecord) {
    println!("Extracted information:");
    println!("  Name: {}", record.name);
    match record.dob {
        Some(dob) => println!("  DOB: {}", dob.format("%d/%m/%Y")),
        None => println!("  DOB: {}", ekyc_core::types::NOT_FOUND),
    }
    println!("  ID (hashed): {}", record.id);
    match &record.details {
        DocumentDetails::Pan { father_name } => println!("  Father's Name: {father_name}"),
        DocumentDetails::Aadhar { gender } => println!("  Gender: {gender}"),
    }
}

fn print_report(report: &RegistrationReport) {
    let decision = &report.face.decision;
    for role in &report.face.face_not_detected {
        println!("No face detected in the {role}; using the whole image.");
    }
    println!(
        "Face distance: {:.4} (threshold {:.2}): {}",
        decision.distance,
        decision.threshold,
        if decision.verified { "match" } else { "no match" }
    );

    if let Some(record) = &report.candidate {
        print_record(record);
    }

    match report.reject_reason() {
        None => println!("Registered {} record.", report.doc_type),
        Some(reason) => {
            println!("Rejected: {}", reason.message());
            if let Some(existing) = &report.existing {
                if let Some(created_at) = existing.created_at {
                    println!("  Existing record registered {created_at}");
                }
            }
        }
    }
}

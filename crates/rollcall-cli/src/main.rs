use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rollcall_core::FaceAnalyzer;
use rollcall_store::{AttendanceWriter, RosterStore};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod service;

use config::Config;
use engine::{spawn_engine, EngineHandle};
use service::Attendance;

#[derive(Parser)]
#[command(name = "rollcall", about = "Mark classroom attendance from a group photo")]
struct Cli {
    /// TOML config file (default: $ROLLCALL_CONFIG, if set)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory of enrolled reference images
    #[arg(long, global = true)]
    known_faces_dir: Option<PathBuf>,
    /// Directory for Attendance_<date>.csv records
    #[arg(long, global = true)]
    attendance_dir: Option<PathBuf>,
    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,
    /// Similarity a face must exceed to count as a match
    #[arg(long, global = true)]
    threshold: Option<f32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a student from a photo containing exactly their face
    Enroll {
        #[arg(short, long)]
        name: String,
        /// Roll number (non-negative integer)
        #[arg(short, long)]
        roll: String,
        /// Photo (.jpg or .png)
        image: PathBuf,
        /// Replace an existing enrollment with the same roll number
        #[arg(long)]
        replace: bool,
    },
    /// Mark attendance from a class photo
    Mark {
        image: PathBuf,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List enrolled students
    Roster {
        #[arg(long)]
        json: bool,
    },
    /// Show the attendance record for a day (default: today)
    Show {
        /// Date as YYYY-MM-DD
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.known_faces_dir {
        config.known_faces_dir = dir;
    }
    if let Some(dir) = cli.attendance_dir {
        config.attendance_dir = dir;
    }
    if let Some(dir) = cli.model_dir {
        config.model_dir = dir;
    }
    if let Some(t) = cli.threshold {
        config.similarity_threshold = t;
    }
    config.validate()?;
    tracing::debug!(?config, "configuration");

    match cli.command {
        Commands::Enroll {
            name,
            roll,
            image,
            replace,
        } => {
            let engine = start_engine(&config)?;
            let stored = engine
                .enroll(name.clone(), roll.clone(), image.clone(), replace)
                .await
                .with_context(|| format!("failed to enroll {}", image.display()))?;
            println!("Face of {name} (Roll No: {roll}) added successfully.");
            println!("Stored as {}", stored.display());
        }
        Commands::Mark { image, json } => {
            let engine = start_engine(&config)?;
            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<rollcall_core::FaceProgress>();

            let printer = tokio::spawn(async move {
                while let Some(p) = progress_rx.recv().await {
                    if json {
                        continue;
                    }
                    let who = p
                        .result
                        .identity
                        .as_ref()
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    eprintln!(
                        "[{}/{}] {:>3.0}%  {who} (score {:.3})",
                        p.processed,
                        p.total,
                        p.percent(),
                        p.result.score
                    );
                }
            });

            let report = engine
                .mark_attendance(image.clone(), progress_tx)
                .await
                .with_context(|| format!("failed to process image {}", image.display()))?;
            printer.await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                if report.faces.is_empty() {
                    eprintln!("warning: no faces detected in {}", image.display());
                }
                println!("Attendance marked for {} student(s).", report.count);
                println!("Saved to {}", report.output.display());
            }
        }
        Commands::Roster { json } => {
            let store = RosterStore::open(&config.known_faces_dir)?;
            let faces = store.scan()?;
            if json {
                let identities: Vec<_> = faces.iter().map(|f| &f.identity).collect();
                println!("{}", serde_json::to_string_pretty(&identities)?);
            } else if faces.is_empty() {
                println!("No students enrolled in {}", store.dir().display());
            } else {
                for face in &faces {
                    println!("{:>6}  {}", face.identity.roll, face.identity.name);
                }
            }
        }
        Commands::Show { date } => {
            let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            let writer = AttendanceWriter::new(&config.attendance_dir);
            match writer.read(date)? {
                None => println!("No attendance recorded for {date}"),
                Some(records) => {
                    println!("Attendance for {date}: {} present", records.len());
                    for r in &records {
                        println!("{:>6}  {}  {}", r.identity.roll, r.identity.name, r.time);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Load the ONNX models and move them onto the engine thread.
fn start_engine(config: &Config) -> Result<EngineHandle> {
    let analyzer = FaceAnalyzer::load(&config.model_dir, config.detection_threshold)
        .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?;
    let attendance = Attendance::new(
        analyzer,
        RosterStore::open(&config.known_faces_dir)?,
        AttendanceWriter::new(&config.attendance_dir),
        config.similarity_threshold,
        config.duplicate_policy,
    );
    Ok(spawn_engine(attendance)?)
}

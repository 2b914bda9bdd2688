use exam_proctor::{
    camera,
    service::{protocol::StatusResponse, ServiceClient},
    DevMode,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "exam-proctor")]
#[command(about = "Control the exam proctoring daemon")]
struct Cli {
    /// Talk to the development daemon
    #[arg(long, global = true)]
    dev: bool,

    /// Override the daemon socket
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Print responses as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring an exam session
    Start {
        #[arg(short, long)]
        session: String,
        #[arg(short, long)]
        exam: u64,
        /// Student label as enrolled (spaces are normalized)
        #[arg(short = 'l', long)]
        student: String,
    },
    /// Stop monitoring an exam session
    Stop {
        #[arg(short, long)]
        session: String,
    },
    /// Show the monitor status of a session
    Status {
        #[arg(short, long)]
        session: String,
    },
    /// Check that a student is enrolled for an exam
    Verify {
        #[arg(short, long)]
        exam: u64,
        #[arg(short = 'l', long)]
        student: String,
    },
    /// Build an exam's signatures from a folder of photos
    Extract {
        #[arg(short, long)]
        exam: u64,
        /// Folder of <student name>.jpg files, relative to the uploads dir or absolute
        #[arg(short, long)]
        folder: PathBuf,
    },
    /// Show remote-access and capture guard status
    Guards,
    /// List video devices
    ListCameras,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.dev);

    let dev_mode = DevMode::new(cli.dev)?;
    let client = ServiceClient::new(cli.socket.clone().unwrap_or_else(|| dev_mode.socket_path()));

    match cli.command {
        Commands::Start { session, exam, student } => {
            let started = client.start(&session, exam, &student)?;
            if cli.json {
                println!("{}", serde_json::json!({ "started": started }));
            } else if started {
                println!("Monitoring started for session {}", session);
            } else {
                let status = client.status(&session)?;
                if status.face_status.is_init_failure() {
                    println!("Monitoring could not start: {}", status.face_status);
                } else {
                    println!("Monitoring could not start for session {}", session);
                }
            }
        }
        Commands::Stop { session } => {
            let stopped = client.stop(&session)?;
            if cli.json {
                println!("{}", serde_json::json!({ "stopped": stopped }));
            } else if stopped {
                println!("Monitoring stopped for session {}", session);
            } else {
                println!("No monitor for session {}", session);
            }
        }
        Commands::Status { session } => {
            let status = client.status(&session)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&session, &status);
            }
        }
        Commands::Verify { exam, student } => {
            let authorized = client.verify_student(exam, &student)?;
            if cli.json {
                println!("{}", serde_json::json!({ "authorized": authorized }));
            } else {
                println!(
                    "{} is {}enrolled for exam {}",
                    student,
                    if authorized { "" } else { "NOT " },
                    exam
                );
            }
        }
        Commands::Extract { exam, folder } => {
            let report = client.extract_signatures(exam, &folder)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Extraction {}: {} signatures saved for exam {}",
                    if report.success { "succeeded" } else { "failed" },
                    report.processed_count,
                    exam
                );
                for file in &report.failed_files {
                    println!("  skipped {}", file);
                }
            }
        }
        Commands::Guards => {
            let statuses = client.guard_status()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else if statuses.is_empty() {
                println!("No guards enabled");
            } else {
                for status in statuses {
                    println!(
                        "{}: {} ({} detections{})",
                        status.kind.name(),
                        if status.running { "running" } else { "stopped" },
                        status.detected.len(),
                        if status.threat_detected { ", threat active" } else { "" }
                    );
                    for detection in status.detected.iter().rev().take(5) {
                        println!(
                            "  pid {} {} [{}]{}",
                            detection.pid,
                            detection.name,
                            detection.matched_keyword,
                            if detection.suppressed { " terminated" } else { "" }
                        );
                    }
                }
            }
        }
        Commands::ListCameras => {
            let cameras = camera::list_cameras()?;
            if cameras.is_empty() {
                println!("No cameras found. Check /dev/video* permissions.");
            }
            for cam in cameras {
                println!(
                    "/dev/video{}: {} [{}]{}",
                    cam.index,
                    cam.name,
                    cam.formats.join(", "),
                    if cam.can_capture { "" } else { " (no capture)" }
                );
            }
        }
    }

    Ok(())
}

fn print_status(session: &str, status: &StatusResponse) {
    println!("Session:   {}", session);
    println!("Running:   {}", status.running);
    println!("Face:      {}", status.face_status);
    println!("Identity:  {}", if status.identity_confirmed { "confirmed" } else { "not confirmed" });
    println!("Emotion:   {}", status.emotion);
    if !status.detected_objects.is_empty() {
        println!("Objects:   {}", status.detected_objects.join(", "));
    }
    if let Some(updated) = status.last_update_time {
        let updated: chrono::DateTime<chrono::Local> = updated.into();
        println!("Updated:   {}", updated.format("%H:%M:%S"));
    }
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .init();
    }
}

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use facebeam_core::gallery::display_name;
use facebeam_store::reports::write_status_csv;
use facebeam_store::{Database, NewStudent, TimetableFile};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const BUS_NAME: &str = "org.facebeam.Attendance1";
const OBJECT_PATH: &str = "/org/facebeam/Attendance1";
const DAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

#[derive(Parser)]
#[command(name = "facebeam", about = "FaceBeam attendance CLI")]
struct Cli {
    /// SQLite database path
    #[arg(long, global = true, env = "FACEBEAM_DB_PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status
    Status {
        /// Query the system bus instead of the session bus
        #[arg(long)]
        system: bool,
    },
    #[command(flatten)]
    Db(DbCommands),
}

/// Commands that work directly on the database.
#[derive(Subcommand)]
enum DbCommands {
    /// Create the database schema
    InitDb {
        /// Also insert the default subjects and weekly timetable
        #[arg(long)]
        seed: bool,
    },
    /// Register a student and copy their reference photo
    AddStudent(AddStudentArgs),
    /// List registered students
    Students,
    /// Show or replace the weekly timetable
    Timetable {
        #[command(subcommand)]
        command: TimetableCommands,
    },
    /// Show the class in session now
    Live,
    /// List students not yet marked for the class in session
    Absentees,
    /// Show a student's profile, attendance percentage and status
    Student {
        name: String,
        /// Subject id (default: the class in session)
        #[arg(long)]
        subject: Option<i64>,
        /// Date in YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Write a CSV attendance report for one day
    Report {
        #[command(subcommand)]
        kind: ReportKind,
    },
}

#[derive(Subcommand)]
enum TimetableCommands {
    /// Print the weekly timetable
    Show,
    /// Replace the timetable with the contents of a TOML file
    Import { file: PathBuf },
}

#[derive(Subcommand)]
enum ReportKind {
    /// One row per scheduled subject and student
    Status(ReportArgs),
    /// Students down, subjects across
    Pivot(ReportArgs),
}

#[derive(Args)]
struct ReportArgs {
    /// Date in YYYY-MM-DD (default: today)
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Output file (default: <kind>_report_<date>.csv)
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct AddStudentArgs {
    /// Full name, e.g. "Alice Smith"
    name: String,
    /// Reference photo of the student's face
    #[arg(long)]
    photo: PathBuf,
    #[arg(long)]
    student_id: Option<String>,
    #[arg(long)]
    section: Option<String>,
    #[arg(long)]
    year: Option<String>,
    #[arg(long)]
    roll_number: Option<String>,
    #[arg(long)]
    branch: Option<String>,
    #[arg(long)]
    college_id: Option<String>,
    /// Directory of reference photos
    #[arg(long, env = "FACEBEAM_KNOWN_FACES_DIR", default_value = "known_faces")]
    known_faces_dir: PathBuf,
}

fn default_db_path() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facebeam/facebeam.db")
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// `"Alice Smith"` + `photo.JPG` -> `alice_smith.jpg`.
fn photo_file_name(name: &str, photo: &Path) -> String {
    let stem = name
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_");
    let ext = photo
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "jpg".to_string());
    format!("{stem}.{ext}")
}

/// Copy the photo into the known-faces dir and register the student.
///
/// The copied photo is removed again if the database insert fails.
fn register_student(db: &Database, args: &AddStudentArgs) -> Result<(i64, PathBuf)> {
    if !args.photo.is_file() {
        bail!("photo {} does not exist", args.photo.display());
    }
    std::fs::create_dir_all(&args.known_faces_dir).with_context(|| {
        format!("failed to create {}", args.known_faces_dir.display())
    })?;

    let dest = args.known_faces_dir.join(photo_file_name(&args.name, &args.photo));
    if dest.exists() {
        bail!("{} already exists; refusing to overwrite", dest.display());
    }
    std::fs::copy(&args.photo, &dest)
        .with_context(|| format!("failed to copy photo to {}", dest.display()))?;

    let student = NewStudent {
        name: args.name.trim().to_string(),
        image_path: dest.to_string_lossy().into_owned(),
        student_id: args.student_id.clone(),
        section: args.section.clone(),
        year: args.year.clone(),
        roll_number: args.roll_number.clone(),
        branch: args.branch.clone(),
        college_id: args.college_id.clone(),
    };

    match db.add_student(&student) {
        Ok(id) => Ok((id, dest)),
        Err(e) => {
            if let Err(rm) = std::fs::remove_file(&dest) {
                tracing::warn!(path = %dest.display(), error = %rm, "failed to remove copied photo");
            }
            Err(e).context("failed to register student")
        }
    }
}

fn show_timetable(db: &Database) -> Result<()> {
    let names: HashMap<i64, String> = db.subjects()?.into_iter().map(|s| (s.id, s.name)).collect();
    let timetable = db.timetable()?;
    if timetable.is_empty() {
        println!("Timetable is empty (run `facebeam init-db --seed` or `facebeam timetable import`)");
        return Ok(());
    }
    for (day, label) in DAY_NAMES.iter().enumerate() {
        for slot in timetable.slots_on(day as u8) {
            println!(
                "{label}  {}-{}  [{}] {}",
                slot.start_time.format("%H:%M"),
                slot.end_time.format("%H:%M"),
                slot.subject_id,
                names.get(&slot.subject_id).map(String::as_str).unwrap_or("?"),
            );
        }
    }
    Ok(())
}

fn show_student(db: &Database, name: &str, subject: Option<i64>, date: Option<NaiveDate>) -> Result<()> {
    let Some(student) = db.student(name)? else {
        bail!("no student named '{name}'");
    };

    println!("Name:        {}", student.name);
    println!("Student ID:  {}", student.student_id.as_deref().unwrap_or("-"));
    println!("Section:     {}", student.section.as_deref().unwrap_or("-"));
    println!("Year:        {}", student.year.as_deref().unwrap_or("-"));
    println!("Roll number: {}", student.roll_number.as_deref().unwrap_or("-"));
    println!("Branch:      {}", student.branch.as_deref().unwrap_or("-"));
    println!("College ID:  {}", student.college_id.as_deref().unwrap_or("-"));
    println!("Photo:       {}", student.image_path);
    println!("Attendance:  {:.2}%", db.attendance_percentage(&student.name)?);

    let subject = match subject {
        Some(id) => Some(id),
        None => db.live_class(now())?.map(|live| live.subject_id),
    };
    if let Some(subject_id) = subject {
        let date = date.unwrap_or_else(|| now().date());
        let status = db.student_status(&student.name, subject_id, date)?;
        println!("Status:      {status} (subject {subject_id}, {date})");
    }
    Ok(())
}

fn write_report(db: &Database, kind: ReportKind) -> Result<()> {
    let (label, args) = match &kind {
        ReportKind::Status(args) => ("status", args),
        ReportKind::Pivot(args) => ("pivot", args),
    };
    let date = args.date.unwrap_or_else(|| now().date());
    let out = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{label}_report_{date}.csv")));

    let written = match kind {
        ReportKind::Status(_) => {
            let rows = db.status_report(date)?;
            if rows.is_empty() {
                None
            } else {
                let file = create(&out)?;
                write_status_csv(&rows, file)?;
                Some(rows.len())
            }
        }
        ReportKind::Pivot(_) => {
            let report = db.pivot_report(date)?;
            if report.is_empty() {
                None
            } else {
                let file = create(&out)?;
                report.write_csv(file)?;
                Some(report.rows.len())
            }
        }
    };

    match written {
        Some(rows) => println!("Wrote {rows} rows to {}", out.display()),
        None => {
            tracing::warn!(%date, "no students registered or no classes scheduled; report not written");
            println!("Nothing to report for {date}");
        }
    }
    Ok(())
}

fn create(path: &Path) -> Result<std::fs::File> {
    std::fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))
}

async fn daemon_status(system: bool) -> Result<()> {
    let conn = if system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("failed to connect to D-Bus")?;

    let reply = conn
        .call_method(Some(BUS_NAME), OBJECT_PATH, Some(BUS_NAME), "Status", &())
        .await
        .context("facebeamd: not connected")?;
    let json: String = reply.body().deserialize()?;
    let status: serde_json::Value = serde_json::from_str(&json)?;
    println!("{}", serde_json::to_string_pretty(&status)?);

    let reply = conn
        .call_method(Some(BUS_NAME), OBJECT_PATH, Some(BUS_NAME), "Credited", &())
        .await?;
    let credited: Vec<String> = reply.body().deserialize()?;
    if credited.is_empty() {
        println!("No students marked in the current session");
    } else {
        println!("Marked in the current session: {}", credited.join(", "));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Status { system } => daemon_status(system).await,
        Commands::Db(command) => run(command, &cli.db.unwrap_or_else(default_db_path)),
    }
}

fn run(command: DbCommands, db_path: &Path) -> Result<()> {
    let mut db = Database::open(db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;

    match command {
        DbCommands::InitDb { seed } => {
            println!("Database ready at {}", db_path.display());
            if seed {
                let inserted = db.seed_default_timetable()?;
                if inserted == 0 {
                    println!("Timetable already populated; nothing seeded");
                } else {
                    println!("Seeded {inserted} timetable slots");
                }
            }
        }
        DbCommands::AddStudent(args) => {
            let (id, photo) = register_student(&db, &args)?;
            println!(
                "Registered '{}' (id {id}); photo saved as {} and recognised as '{}'",
                args.name.trim(),
                photo.display(),
                display_name(&photo)
            );
        }
        DbCommands::Students => {
            let students = db.students()?;
            if students.is_empty() {
                println!("No students registered");
            }
            for s in students {
                println!(
                    "{:>4}  {:<30} {}",
                    s.id,
                    s.name,
                    s.student_id.as_deref().unwrap_or("-")
                );
            }
        }
        DbCommands::Timetable { command } => match command {
            TimetableCommands::Show => show_timetable(&db)?,
            TimetableCommands::Import { file } => {
                let timetable = TimetableFile::load(&file)
                    .with_context(|| format!("failed to load {}", file.display()))?;
                let slots = db.import_timetable(&timetable)?;
                println!("Imported {} subjects and {slots} slots", timetable.subjects.len());
            }
        },
        DbCommands::Live => match db.live_class(now())? {
            Some(live) => println!(
                "Class in session: {} (subject {}) {}-{}",
                live.subject_name,
                live.subject_id,
                live.start_time.format("%H:%M"),
                live.end_time.format("%H:%M")
            ),
            None => println!("No scheduled class"),
        },
        DbCommands::Absentees => {
            let now = now();
            match db.live_class(now)? {
                None => println!("No scheduled class"),
                Some(live) => {
                    let absent = db.absentees(now)?;
                    println!("{}: {} absent", live.subject_name, absent.len());
                    for name in absent {
                        println!("  {name}");
                    }
                }
            }
        }
        DbCommands::Student { name, subject, date } => show_student(&db, &name, subject, date)?,
        DbCommands::Report { kind } => write_report(&db, kind)?,
    }

    Ok(())
}

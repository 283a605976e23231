use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Value};
use std::path::PathBuf;

use portal_cache::cache::{CacheKind, PortalCache, SemesterId};
use portal_cache::config::Config;
use portal_cache::logging;
use portal_cache::portal::{ArtificialPortal, DataSource, Semester};

#[derive(Parser, Debug)]
#[command(name = "portal-cache")]
#[command(about = "Inspect and manage the student portal offline cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/portal-cache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Item counts, sizes and last update per kind
  Stats,
  /// Delete every cached entry, or only one kind
  Clear {
    #[arg(short, long)]
    kind: Option<CacheKind>,
  },
  /// Print one entry with its timestamps
  Show { key: String },
  /// List cached keys
  Keys,
  /// Drop a user's cached data, or one semester's attendance
  Forget {
    user: Option<String>,
    #[arg(short, long)]
    semester: Option<String>,
  },
  /// Answer a request from cache only, as the offline portal would
  Offline {
    user: String,
    what: OfflineRecord,
    #[arg(short, long)]
    semester: Option<String>,
    #[arg(long)]
    subject: Option<String>,
  },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OfflineRecord {
  AttendanceSemesters,
  RegisteredSemesters,
  GradeSemesters,
  Attendance,
  SubjectAttendance,
  RegisteredSubjects,
  SubjectChoices,
  GradeCard,
  Marks,
  Exams,
  Sgpa,
  Profile,
  Hostel,
  Fees,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _guard = logging::init(&config.logging)?;
  let cache = config.open_cache()?;

  match args.command {
    Command::Stats => print_stats(&cache),
    Command::Clear { kind } => {
      let removed = match kind {
        Some(kind) => cache.clear_kind(kind)?,
        None => cache.clear_all()?,
      };
      println!("removed {} entries", removed);
    }
    Command::Show { key } => match cache.get_entry::<Value>(&key) {
      Some(entry) => print_json(&json!({
        "key": key,
        "timestamp": entry.timestamp.to_rfc3339(),
        "expiration": entry.expiration.to_rfc3339(),
        "data": entry.data,
      }))?,
      None => return Err(eyre!("No live entry for key {}", key)),
    },
    Command::Keys => {
      for key in cache.cached_keys() {
        println!("{}", key);
      }
    }
    Command::Forget { user, semester } => {
      let user = resolve_user(user, &config)?;
      match semester {
        Some(semester) => {
          let semester = SemesterId::from(semester);
          cache.force_refresh_attendance(&user, &semester)?;
          let subjects = cache.force_refresh_subject_data(&user, &semester)?;
          println!(
            "forgot attendance of {} for {} ({} subjects)",
            semester, user, subjects
          );
        }
        None => {
          let removed = cache.force_refresh_all(&user)?;
          println!("removed {} entries for {}", removed, user);
        }
      }
    }
    Command::Offline {
      what,
      user,
      semester,
      subject,
    } => {
      let answer = offline_answer(cache, &user, what, semester, subject).await?;
      print_json(&answer)?;
    }
  }

  Ok(())
}

fn resolve_user(user: Option<String>, config: &Config) -> Result<String> {
  user
    .or_else(|| config.default_username.clone())
    .ok_or_else(|| eyre!("No user given and no default_username configured"))
}

async fn offline_answer(
  cache: PortalCache,
  user: &str,
  what: OfflineRecord,
  semester: Option<String>,
  subject: Option<String>,
) -> Result<Value> {
  let portal = ArtificialPortal::new(cache, user);
  let semester = || {
    semester
      .as_deref()
      .map(Semester::from_id)
      .ok_or_else(|| eyre!("--semester is required for {:?}", what))
  };

  let answer = match what {
    OfflineRecord::AttendanceSemesters => {
      serde_json::to_value(portal.get_attendance_semesters().await?)?
    }
    OfflineRecord::RegisteredSemesters => {
      serde_json::to_value(portal.get_registered_semesters().await?)?
    }
    OfflineRecord::GradeSemesters => serde_json::to_value(portal.get_grade_semesters().await?)?,
    OfflineRecord::Attendance => json!(portal.get_attendance(&semester()?).await?),
    OfflineRecord::SubjectAttendance => {
      let subject = subject.ok_or_else(|| eyre!("--subject is required for {:?}", what))?;
      json!(
        portal
          .get_subject_daily_attendance(&semester()?, &subject)
          .await?
      )
    }
    OfflineRecord::RegisteredSubjects => json!(
      portal
        .get_registered_subjects_and_faculties(&semester()?)
        .await?
    ),
    OfflineRecord::SubjectChoices => json!(portal.get_subject_choices(&semester()?).await?),
    OfflineRecord::GradeCard => json!(portal.get_grade_card(&semester()?).await?),
    OfflineRecord::Marks => json!(portal.get_marks(&semester()?).await?),
    OfflineRecord::Exams => json!(portal.get_exam_events(&semester()?).await?),
    OfflineRecord::Sgpa => json!(portal.get_sgpa_cgpa().await?),
    OfflineRecord::Profile => json!(portal.get_personal_info().await?),
    OfflineRecord::Hostel => json!(portal.get_hostel_details().await?),
    OfflineRecord::Fees => json!(portal.get_fee_summary().await?),
  };
  Ok(answer)
}

fn print_stats(cache: &PortalCache) {
  let stats = cache.stats();
  println!("{:<22} {:>6} {:>10}  last updated", "kind", "items", "bytes");
  for (kind, kind_stats) in &stats.kinds {
    let updated = kind_stats
      .last_updated
      .map(|t| t.to_rfc3339())
      .unwrap_or_else(|| "-".to_string());
    println!(
      "{:<22} {:>6} {:>10}  {}",
      kind.to_string(),
      kind_stats.items,
      kind_stats.bytes,
      updated
    );
  }
  println!(
    "{:<22} {:>6} {:>10}",
    "total", stats.total_items, stats.total_bytes
  );
}

fn print_json(value: &Value) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

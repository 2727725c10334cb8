//! `kin` — the operator CLI for the relationship graph engine. Wires a
//! `ConfigRegistry` and the two store backends into an `EngineHandle`
//! (spec §9's "mutable singletons" redesign) and exposes resolve/merge/
//! split/hide/recompute/circles/review as subcommands.

mod engine;

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use engine::{EngineHandle, ResolveOutcome};
use kin_core::resolver::ObservedIdentity;
use kin_core::review_queue::ReviewStatus;
use kin_core::source_entity::SourceType;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about = "Personal-CRM entity resolution and relationship graph engine")]
struct Cli {
  /// Directory holding `people/`, `kin.sqlite3`, and the config files.
  #[arg(short, long, default_value = "./data")]
  data_dir: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Resolve an observed name/email/phone to a person, optionally creating one.
  Resolve {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    context: Option<String>,
    #[arg(long)]
    create: bool,
  },
  /// Merge `secondary` into `primary`.
  Merge { primary: Uuid, secondary: Uuid },
  /// Split every source entity of the given types off a person into a new record.
  Split {
    person: Uuid,
    #[arg(long = "source-type", required = true)]
    source_types: Vec<String>,
    #[arg(long)]
    name: String,
  },
  /// Hide a person and blocklist their identifiers.
  Hide {
    person: Uuid,
    #[arg(long, default_value = "operator request")]
    reason: String,
  },
  /// Recompute counts and relationship strength for every person, then reassign circles.
  Recompute,
  /// Run only the circle-assignment pass.
  Circles,
  /// List or resolve pending review-queue items.
  Review {
    #[command(subcommand)]
    action: ReviewAction,
  },
  /// Re-run resolution over unlinked source entities due for a retry.
  Rematch {
    #[arg(long)]
    limit: usize,
  },
  /// Print aggregate source-entity counts.
  Stats,
}

#[derive(Subcommand)]
enum ReviewAction {
  /// List pending items.
  List {
    #[arg(long)]
    limit: usize,
    #[arg(long, default_value_t = 0)]
    offset: usize,
  },
  /// Mark an item reviewed.
  Mark { id: Uuid, status: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy())
    .init();

  let cli = Cli::parse();
  let engine = EngineHandle::open(&cli.data_dir).await.with_context(|| format!("failed to open engine at {:?}", cli.data_dir))?;

  match cli.command {
    Command::Resolve { name, email, phone, context, create } => {
      let observed = ObservedIdentity { name, email, phone, context_path: context, observed_at: Some(Utc::now()) };
      match engine.resolve(observed, create).await? {
        ResolveOutcome::Matched { person, confidence, match_type, disambiguation_applied } => {
          println!(
            "matched {} ({}) via {match_type}, confidence {confidence:.2}, disambiguated={disambiguation_applied}",
            person.id, person.display_name
          );
        }
        ResolveOutcome::Created { person, confidence, disambiguated } => {
          println!("created {} ({}), confidence {confidence:.2}, disambiguated={disambiguated}", person.id, person.display_name);
        }
        ResolveOutcome::Ambiguous { candidates } => {
          println!("ambiguous: {}", candidates.iter().map(Uuid::to_string).collect::<Vec<_>>().join(", "));
        }
        ResolveOutcome::NoMatch => println!("no match"),
        ResolveOutcome::Blocked(identifier) => println!("blocked identifier: {identifier}"),
      }
    }
    Command::Merge { primary, secondary } => {
      let person = engine.merge(primary, secondary).await?;
      println!("merged into {} ({})", person.id, person.display_name);
    }
    Command::Split { person, source_types, name } => {
      let source_types = source_types
        .iter()
        .map(|raw| SourceType::from_str(raw).map_err(|_| anyhow::anyhow!("unknown source type: {raw}")))
        .collect::<Result<Vec<_>>>()?;
      let new_person = engine.split(person, &source_types, name).await?;
      println!("split into {} ({})", new_person.id, new_person.display_name);
    }
    Command::Hide { person, reason } => {
      engine.hide(person, &reason).await?;
      println!("hid {person}");
    }
    Command::Recompute => {
      let updated = engine.recompute().await?;
      println!("recomputed strength for {updated} people");
    }
    Command::Circles => {
      engine.assign_circles().await?;
      println!("circles reassigned");
    }
    Command::Review { action } => match action {
      ReviewAction::List { limit, offset } => {
        let items = engine.review_list(None, limit, offset).await?;
        for item in items {
          println!("{} [{:?}] {} <-> {:?} conf={:.2} {}", item.id, item.review_type, item.person_a_name, item.person_b_name, item.confidence, item.reason);
        }
      }
      ReviewAction::Mark { id, status } => {
        let status = parse_review_status(&status)?;
        match engine.review_mark(id, status).await? {
          Some(item) => println!("marked {} as {:?}", item.id, item.status),
          None => println!("no pending item {id}"),
        }
      }
    },
    Command::Rematch { limit } => {
      let (linked, attempted) = engine.rematch_batch(None::<SourceType>, limit).await?;
      println!("rematch: {linked}/{attempted} linked");
    }
    Command::Stats => {
      let stats = engine.source_statistics().await?;
      println!("total={} linked={} unlinked={}", stats.total_entities, stats.linked_entities, stats.total_entities - stats.linked_entities);
      for (source_type, count) in &stats.by_source_type {
        println!("  {source_type}: {count}");
      }
    }
  }

  Ok(())
}

fn parse_review_status(raw: &str) -> Result<ReviewStatus> {
  match raw.to_lowercase().as_str() {
    "merged" => Ok(ReviewStatus::Merged),
    "skipped" => Ok(ReviewStatus::Skipped),
    "hidden" => Ok(ReviewStatus::Hidden),
    "kept" => Ok(ReviewStatus::Kept),
    "split" => Ok(ReviewStatus::Split),
    other => anyhow::bail!("unknown review status: {other}"),
  }
}

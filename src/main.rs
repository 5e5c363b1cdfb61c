mod api;
mod cache;
mod config;
mod grouping;
mod lookups;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use api::{InventoryClient, ApiError};
use cache::{CacheStorage, NoopStorage, SqliteStorage};

#[derive(Parser, Debug)]
#[command(name = "stockctl")]
#[command(about = "Inventory client for the remote stock store")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/stockctl/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Bypass the on-disk cache entirely
  #[arg(long)]
  no_cache: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Preload and print the reference lists (materials, projects, ...)
  Lookups,
  /// Recent OUT documents, grouped per document
  History {
    /// Maximum number of rows to fetch
    #[arg(short, long, default_value_t = 50)]
    limit: u32,
  },
  /// Current stock level for one material
  Stock { material: String },
  /// One OUT document with its lines
  Doc { doc_no: String },
  /// Submit a movement batch described by a JSON file
  Submit {
    /// Path to a JSON file with the movement submission
    file: PathBuf,
  },
  /// Replace the lines of an existing OUT document from a JSON file
  UpdateDoc {
    doc_no: String,
    /// Path to a JSON file with the replacement lines
    file: PathBuf,
  },
  /// Purchase request history with summary KPIs
  Purchases,
  /// Lines of one purchase request
  PurchaseLines { doc_no: String },
  /// Submit a purchase request described by a JSON file
  SubmitPurchase {
    /// Path to a JSON file with the purchase submission
    file: PathBuf,
  },
  /// Move a purchase request to a new status
  SetStatus { doc_no: String, status: String },
  /// Register a new contractor
  AddContractor { name: String },
  /// Register a new requester
  AddRequester { name: String },
  /// Low-stock alerts and the latest movements
  Dashboard,
  /// Movement report for a date range, grouped per document
  Report {
    /// Range start (YYYY-MM-DD)
    start: String,
    /// Range end (YYYY-MM-DD)
    end: String,
    /// Restrict to one material
    #[arg(short, long)]
    material: Option<String>,
    /// Restrict to one movement type (IN, OUT, ADJUST)
    #[arg(short = 't', long)]
    movement: Option<String>,
  },
  /// Evict expired cache entries and exit
  Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stockctl=info".into()),
    )
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = config::Config::load(args.config.as_deref())?;

  let storage: Arc<dyn CacheStorage> = if args.no_cache {
    Arc::new(NoopStorage)
  } else {
    match &config.cache.path {
      Some(path) => Arc::new(SqliteStorage::open(path)?),
      None => Arc::new(SqliteStorage::open_default()?),
    }
  };

  let client = InventoryClient::new(config.api.clone(), storage)?;

  // Expired entries are evicted opportunistically on every run, not just
  // by the explicit sweep command.
  let evicted = client.cache().sweep(config.cache.max_age());
  if evicted > 0 {
    info!(evicted, "evicted expired cache entries");
  }

  match args.command {
    Command::Lookups => {
      let set = client.preload_lookups().await;
      print_list("Materials", &set.materials);
      print_list("Projects", &set.projects);
      print_list("Contractors", &set.contractors);
      print_list("Requesters", &set.requesters);
    }
    Command::History { limit } => {
      for doc in client.out_history(limit).await? {
        println!(
          "{}  {}  {:>8.2}  {:>3} lines  {}",
          doc.document_id, doc.timestamp, doc.total_quantity, doc.line_count, doc.item_summary
        );
      }
    }
    Command::Stock { material } => {
      let level = client.current_stock(&material).await?;
      let flag = if level.stock < level.min_level { "  LOW" } else { "" };
      println!("{material}: {} (min {}){flag}", level.stock, level.min_level);
    }
    Command::Doc { doc_no } => {
      let doc = client.out_doc(&doc_no).await?;
      println!("{}  {}", doc.doc_no, doc.ts);
      println!("project: {}  contractor: {}  requester: {}", doc.project, doc.contractor, doc.requester);
      for line in &doc.lines {
        println!("  {:<30} {:>8.2}", line.item, line.qty);
      }
    }
    Command::Submit { file } => {
      let submission: api::types::MovementSubmission = read_json(&file)?;
      let ack = client.submit_movement(&submission).await?;
      println!("submitted {}", ack.doc_no.unwrap_or_default());
    }
    Command::UpdateDoc { doc_no, file } => {
      let lines: Vec<api::types::DocLine> = read_json(&file)?;
      client.update_out_doc(&doc_no, &lines).await?;
      println!("updated {doc_no}");
    }
    Command::Purchases => {
      let kpis = client.purchase_summary().await.unwrap_or_default();
      println!(
        "{} open requests, {} lines, {} urgent",
        kpis.requests, kpis.lines, kpis.urgent
      );
      for row in client.purchase_history().await? {
        println!(
          "{}  {}  {:<10}  {:<8}  {:>8.2}  {:>3} lines",
          row.doc_no, row.ts, row.status, row.priority, row.total_quantity, row.line_count
        );
      }
    }
    Command::PurchaseLines { doc_no } => {
      for line in client.purchase_doc_lines(&doc_no).await? {
        println!("{:<30} {:>8.2}", line.item, line.qty);
      }
    }
    Command::SubmitPurchase { file } => {
      let submission: api::types::PurchaseSubmission = read_json(&file)?;
      let ack = client.submit_purchase(&submission).await?;
      println!("submitted {}", ack.doc_no.unwrap_or_default());
    }
    Command::SetStatus { doc_no, status } => {
      client.update_purchase_status(&doc_no, &status).await?;
      println!("{doc_no} -> {status}");
    }
    Command::AddContractor { name } => {
      client.add_contractor(&name).await?;
      println!("added {name}");
    }
    Command::AddRequester { name } => {
      client.add_requester(&name).await?;
      println!("added {name}");
    }
    Command::Dashboard => {
      let low = client.low_stock().await?;
      if low.is_empty() {
        println!("no materials below minimum");
      }
      for row in low {
        println!("LOW  {:<30} {:>8.2} (min {})", row.name, row.stock, row.min_level);
      }
      for record in client.recent_moves().await? {
        println!(
          "{}  {}  {:<6} {:<30} {:>8.2}",
          record.document_id, record.timestamp, record.movement_type, record.item_name, record.quantity
        );
      }
    }
    Command::Report {
      start,
      end,
      material,
      movement,
    } => {
      let filters = api::ReportFilters {
        start,
        end,
        material: material.unwrap_or_default(),
        movement_type: movement.unwrap_or_default(),
        ..api::ReportFilters::default()
      };
      match client.movement_documents(&filters).await {
        Ok(docs) => {
          for doc in docs {
            println!(
              "{}  {}  {:>8.2}  {:>3} lines  {}",
              doc.document_id, doc.timestamp, doc.total_quantity, doc.line_count, doc.item_summary
            );
          }
        }
        Err(ApiError::Logical(message)) => {
          eprintln!("report rejected: {message}");
          std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
      }
    }
    Command::Sweep => {
      // Already swept above with the configured max age.
      println!("evicted {evicted} expired entries");
    }
  }

  Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T> {
  let raw = std::fs::read_to_string(path)?;
  Ok(serde_json::from_str(&raw)?)
}

fn print_list(title: &str, values: &[String]) {
  println!("{title} ({}):", values.len());
  for value in values {
    println!("  {value}");
  }
}

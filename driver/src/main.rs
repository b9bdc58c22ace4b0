use anyhow::Context;
use clap::{Parser, Subcommand};
use generator::profile::{build_demo_csv, DemoConfig};
use gui_bridge::bridge::GuiBridge;
use limnocore::model::MeasurementKey;
use limnocore::surface::{Confirmer, FixedAnswer};
use limnocore::tabular::TableSheet;
use limnocore::VizError;
use serde_json::Value;
use std::fs;
use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::ClientConfig;
use workflow::runner::Session;

mod api;
mod generator;
mod gui_bridge;
mod surface;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Lake monitoring front end driver")]
struct Args {
    /// Load the client config from YAML
    #[arg(long)]
    config: Option<PathBuf>,
    /// Base URL of the monitoring server
    #[arg(long)]
    server: Option<String>,
    /// Where the session survives between invocations
    #[arg(long)]
    session_file: Option<PathBuf>,
    /// Address the viewer bridge listens on
    #[arg(long)]
    bridge: Option<SocketAddr>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a synthetic measurement sheet
    Demo {
        #[arg(long, default_value = "demo-measurements.csv")]
        out: PathBuf,
        #[arg(long, default_value_t = 24)]
        stations: usize,
        #[arg(long, default_value_t = 6)]
        timestamps: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Upload a measurement file and keep it in the session
    Upload { file: PathBuf },
    /// Upload a GeoJSON lake boundary
    Boundary { file: PathBuf },
    /// Generate heatmaps for the uploaded dataset
    Generate {
        /// Write one PNG per timestamp here
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Show the markers of one timestamp
    Slice { timestamp: String },
    /// Delete one measurement on the server
    Delete {
        #[arg(long, allow_negative_numbers = true)]
        latitude: f64,
        #[arg(long, allow_negative_numbers = true)]
        longitude: f64,
        #[arg(long)]
        parameter: String,
        #[arg(long)]
        timestamp: String,
        /// Skip the confirmation prompt
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Render a video of the uploaded dataset
    Animate {
        #[arg(long, default_value = "limnoview-video.mp4")]
        out: PathBuf,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Fetch the colour legend for a timestamp
    Legend {
        timestamp: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Pull or push the measurement table
    Table {
        #[command(subcommand)]
        action: TableAction,
    },
    /// Export the current view
    Snapshot {
        #[arg(long)]
        out: PathBuf,
    },
    /// Clear everything stored in the session
    Forget,
    /// Run the viewer bridge until Ctrl+C
    Serve,
}

#[derive(Subcommand)]
enum TableAction {
    Pull {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Push { rows: PathBuf },
}

/// Asks on the terminal; anything but y/yes declines.
struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn confirm(&mut self, prompt: &str) -> bool {
        print!("{prompt} [y/N] ");
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            ClientConfig::load(path)?.with_overrides(args.server, args.session_file, args.bridge)
        }
        None => ClientConfig::from_args(args.server, args.session_file, args.bridge),
    };

    if let Command::Demo {
        out,
        stations,
        timestamps,
        seed,
    } = &args.command
    {
        let demo = DemoConfig {
            stations: *stations,
            timestamps: *timestamps,
            seed: *seed,
            ..Default::default()
        };
        let csv = build_demo_csv(&demo)?;
        write_file(out, csv.as_bytes())?;
        println!("Wrote {stations} stations x {timestamps} dates to {}", out.display());
        return Ok(());
    }

    if let Some(parent) = config.session_file.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating session directory {}", parent.display()))?;
        }
    }

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating async runtime")?;
    runtime.block_on(run(config, args.command))
}

async fn run(config: ClientConfig, command: Command) -> anyhow::Result<()> {
    let bridge_address = config.bridge_address;
    let mut session = Session::open(config).context("opening session")?;

    let outcome = match command {
        Command::Demo { .. } => Ok(()),
        Command::Upload { file } => session.upload(&file).await.map(|_| ()),
        Command::Boundary { file } => session.upload_boundary(&file).await.map(|_| ()),
        Command::Generate { out_dir } => {
            session.load_boundary().await;
            match session.generate().await {
                Ok(_) => match out_dir {
                    Some(dir) => return write_heatmaps(&session, &dir),
                    None => Ok(()),
                },
                Err(err) => Err(err),
            }
        }
        Command::Slice { timestamp } => session.show_slice(&timestamp).map(|count| {
            for marker in &session.scene().snapshot().markers {
                let m = &marker.measurement;
                println!(
                    "{:.5}\t{:.5}\t{}\t{}",
                    m.latitude, m.longitude, m.parameter, m.value
                );
            }
            log::info!("{count} markers drawn");
        }),
        Command::Delete {
            latitude,
            longitude,
            parameter,
            timestamp,
            yes,
        } => {
            let key = MeasurementKey {
                latitude,
                longitude,
                parameter,
                timestamp,
            };
            let deleted = if yes {
                session.delete(key, &mut FixedAnswer(true)).await
            } else {
                session.delete(key, &mut StdinConfirmer).await
            };
            deleted.map(|_| ())
        }
        Command::Animate { out, start, end } => {
            let params = session.config().animation_params(start, end);
            session.load_boundary().await;
            match session.animate(&params).await {
                Ok(video) => return write_file(&out, &video).and_then(|_| report(&session)),
                Err(err) => Err(err),
            }
        }
        Command::Legend { timestamp, out } => match session.legend(&timestamp).await {
            Ok(png) => return write_file(&out, &png).and_then(|_| report(&session)),
            Err(err) => Err(err),
        },
        Command::Table { action } => match action {
            TableAction::Pull { out } => match session.pull_table().await {
                Ok(sheet) => {
                    return write_table(&sheet, out.as_deref()).and_then(|_| report(&session))
                }
                Err(err) => Err(err),
            },
            TableAction::Push { rows } => {
                let raw: Value = serde_json::from_str(
                    &fs::read_to_string(&rows)
                        .with_context(|| format!("reading table rows {}", rows.display()))?,
                )
                .with_context(|| format!("parsing table rows {}", rows.display()))?;
                let sheet = TableSheet::from_json(&raw)?;
                session.push_table(&sheet).await.map(|_| ())
            }
        },
        Command::Snapshot { out } => match session.export_file() {
            Ok((name, bytes)) => {
                let target = if out.is_dir() { out.join(name) } else { out };
                return write_file(&target, &bytes).and_then(|_| report(&session));
            }
            Err(err) => Err(err),
        },
        Command::Forget => session.forget(),
        Command::Serve => {
            session.load_boundary().await;
            let bridge = GuiBridge::new(session);
            println!("Viewer bridge running on http://{bridge_address} (Ctrl+C to stop)...");
            return bridge
                .serve(bridge_address, async {
                    if let Err(err) = signal::ctrl_c().await {
                        log::warn!("awaiting Ctrl+C failed: {err}");
                    }
                })
                .await;
        }
    };

    report(&session)?;
    match outcome {
        Ok(()) | Err(VizError::UserCancelled) => Ok(()),
        Err(err) => Err(anyhow::Error::new(err)),
    }
}

/// Prints the controller's status line.
fn report(session: &Session) -> anyhow::Result<()> {
    if let Some(status) = session.controller().status() {
        println!("[{:?}] {}", status.level, status.text);
    }
    Ok(())
}

fn write_heatmaps(session: &Session, dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    for entry in session.controller().carousel().entries() {
        let png = entry
            .image
            .decode()
            .with_context(|| format!("decoding heatmap for {}", entry.timestamp))?;
        let name: String = entry
            .timestamp
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        write_file(&dir.join(format!("heatmap-{name}.png")), &png)?;
    }
    report(session)
}

fn write_table(sheet: &TableSheet, out: Option<&Path>) -> anyhow::Result<()> {
    let rows: Vec<Value> = sheet
        .rows()
        .iter()
        .map(|row| Value::Object(row.to_json()))
        .collect();
    let text = serde_json::to_string_pretty(&rows).context("serializing table rows")?;
    match out {
        Some(path) => write_file(path, text.as_bytes()),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}

mod api;
mod section;
mod service;
mod store;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use itertools::Itertools;
use tracing::info;

use crate::{
    api::AppState,
    section::{LineId, Segment, Station, StationId},
    service::LineService,
    store::memory::MemoryStore,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Postcard snapshot holding every station and line
    #[arg(long, default_value = "network.bin")]
    data: PathBuf,

    #[arg(long, default_value_t = tracing::Level::INFO)]
    log_level: tracing::Level,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the snapshot from a JSON seed file
    Import {
        #[arg(long)]
        seed: PathBuf,
    },
    /// Register a new station
    AddStation {
        #[arg(long)]
        name: String,
    },
    /// Open a new line between two existing stations
    CreateLine {
        #[arg(long)]
        name: String,
        #[arg(long)]
        color: String,
        #[arg(long)]
        up: u64,
        #[arg(long)]
        down: u64,
        #[arg(long)]
        distance: u32,
    },
    /// Rename or recolour a line
    UpdateLine {
        #[arg(long)]
        line: u64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        color: String,
    },
    /// Remove a line and all of its sections
    DeleteLine {
        #[arg(long)]
        line: u64,
    },
    /// List every line
    Lines,
    /// Print the stations of a line in order
    Stations {
        #[arg(long)]
        line: u64,
    },
    /// Connect a new station to a line
    AddSection {
        #[arg(long)]
        line: u64,
        #[arg(long)]
        up: u64,
        #[arg(long)]
        down: u64,
        #[arg(long)]
        distance: u32,
    },
    /// Take a station off a line
    RemoveSection {
        #[arg(long)]
        line: u64,
        #[arg(long)]
        station: u64,
    },
    /// Serve the line API over HTTP
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        address: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    match args.cmd {
        Command::Import { seed } => {
            let now = std::time::Instant::now();
            let store = MemoryStore::from_seed(&seed)?;
            store.save(&args.data)?;
            info!(snapshot = ?args.data, elapsed = ?now.elapsed(), "Imported seed");
        }
        Command::AddStation { name } => {
            let mut store = MemoryStore::load(&args.data)?;
            let id = store.add_station(name);
            store.save(&args.data)?;
            println!("{id}");
        }
        Command::CreateLine {
            name,
            color,
            up,
            down,
            distance,
        } => {
            let mut store = MemoryStore::load(&args.data)?;
            let first = Segment::new(StationId::new(up), StationId::new(down), distance)?;
            let id = store.create_line(name, color, first)?;
            store.save(&args.data)?;
            info!(line = %id, "Created line");
            println!("{id}");
        }
        Command::UpdateLine { line, name, color } => {
            let mut store = MemoryStore::load(&args.data)?;
            store.update_line(LineId::new(line), name, color)?;
            store.save(&args.data)?;
            info!(%line, "Updated line");
        }
        Command::DeleteLine { line } => {
            let mut store = MemoryStore::load(&args.data)?;
            let record = store.delete_line(LineId::new(line))?;
            store.save(&args.data)?;
            info!(%line, name = %record.name, "Deleted line");
        }
        Command::Lines => {
            let store = MemoryStore::load(&args.data)?;
            for (id, line) in store.lines() {
                println!(
                    "{id}: {} ({}), {} segments",
                    line.name,
                    line.color,
                    line.segments().len()
                );
            }
        }
        Command::Stations { line } => {
            let service = LineService::new(MemoryStore::load(&args.data)?);
            print_stations(&service.stations(LineId::new(line))?);
        }
        Command::AddSection {
            line,
            up,
            down,
            distance,
        } => {
            let mut service = LineService::new(MemoryStore::load(&args.data)?);
            let stations = service.add_section(
                LineId::new(line),
                StationId::new(up),
                StationId::new(down),
                distance,
            )?;
            service.store().save(&args.data)?;
            print_stations(&stations);
        }
        Command::RemoveSection { line, station } => {
            let mut service = LineService::new(MemoryStore::load(&args.data)?);
            let stations = service.remove_section(LineId::new(line), StationId::new(station))?;
            service.store().save(&args.data)?;
            print_stations(&stations);
        }
        Command::Serve { address } => {
            let service = LineService::new(MemoryStore::load(&args.data)?);
            api::serve(&address, AppState::new(service, args.data)).await?;
        }
    }

    Ok(())
}

fn print_stations(stations: &[Station]) {
    println!("{}", stations.iter().map(|s| &s.name).join(" -> "));
}

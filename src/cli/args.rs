//! Command-line surface.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::store::views::{parse_date, EstadoFilter};

#[derive(Parser, Debug)]
#[command(name = "recortes")]
#[command(about = "A terminal client for the recortes offcut inventory")]
#[command(version)]
pub struct Cli {
  /// Path to config file (default: $XDG_CONFIG_HOME/recortes/config.yaml)
  #[arg(short, long, global = true)]
  pub config: Option<PathBuf>,

  /// REST API base URL
  #[arg(long, global = true)]
  pub api_url: Option<String>,

  /// Socket.IO base URL (defaults to the API URL)
  #[arg(long, global = true)]
  pub socket_url: Option<String>,

  /// Print JSON instead of text
  #[arg(long, global = true)]
  pub json: bool,

  #[command(subcommand)]
  pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
  /// Offcuts: list, create, edit, delete, use
  Recortes(RecortesArgs),
  /// Client-owned material
  Clientes(ClientesArgs),
  /// Cutting machines
  Maquinas(MaquinasArgs),
  /// Backend statistics
  Stats(StatsArgs),
  /// Dashboard figures
  Summary,
  /// Stay connected and follow live changes
  Watch,
}

fn date_arg(s: &str) -> Result<NaiveDate, String> {
  parse_date(s).ok_or_else(|| format!("expected YYYY-MM-DD, got '{}'", s))
}

#[derive(Parser, Debug)]
pub struct RecortesArgs {
  #[command(subcommand)]
  pub action: RecortesCmd,
}

#[derive(Subcommand, Debug)]
pub enum RecortesCmd {
  /// List recortes with optional filters
  List {
    /// Machine name or id
    #[arg(long)]
    maquina: Option<String>,
    /// Match against id or machine name
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    espesor: Option<f64>,
    #[arg(long, value_enum, default_value_t = EstadoFilter::Todos)]
    estado: EstadoFilter,
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long)]
    per_page: Option<usize>,
  },
  /// Show one recorte
  Show { id: String },
  /// Create a recorte
  Create(RecorteCreateArgs),
  /// Edit a recorte; unset fields keep their value
  Edit {
    id: String,
    #[command(flatten)]
    fields: RecorteEditArgs,
  },
  /// Delete a recorte
  Delete { id: String },
  /// Use pieces of a recorte
  Use {
    id: String,
    #[arg(long)]
    cantidad: u32,
  },
  /// Paginated recortes of one machine, straight from the server
  Pending {
    /// Machine name or id
    #[arg(long)]
    maquina: String,
    /// Filter by estado instead of listing pending ones
    #[arg(long)]
    estado: Option<bool>,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 10)]
    limit: u32,
  },
}

#[derive(Args, Debug)]
pub struct RecorteCreateArgs {
  #[arg(long)]
  pub largo: f64,
  #[arg(long)]
  pub ancho: f64,
  #[arg(long)]
  pub espesor: f64,
  #[arg(long)]
  pub cantidad: u32,
  /// Machine name or id
  #[arg(long)]
  pub maquina: String,
  #[arg(long)]
  pub observaciones: Option<String>,
  /// Image file to upload (max 10 MiB)
  #[arg(long)]
  pub imagen: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct RecorteEditArgs {
  #[arg(long)]
  pub largo: Option<f64>,
  #[arg(long)]
  pub ancho: Option<f64>,
  #[arg(long)]
  pub espesor: Option<f64>,
  #[arg(long)]
  pub cantidad: Option<u32>,
  #[arg(long)]
  pub maquina: Option<String>,
  #[arg(long)]
  pub observaciones: Option<String>,
  #[arg(long)]
  pub imagen: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct ClientesArgs {
  #[command(subcommand)]
  pub action: ClientesCmd,
}

#[derive(Subcommand, Debug)]
pub enum ClientesCmd {
  /// List client material with optional filters
  List {
    /// Match client, material, observations or remito
    #[arg(long)]
    search: Option<String>,
    #[arg(long, value_enum, default_value_t = EstadoFilter::Todos)]
    estado: EstadoFilter,
    /// Created on or after (YYYY-MM-DD)
    #[arg(long, value_parser = date_arg)]
    desde: Option<NaiveDate>,
    /// Created on or before (YYYY-MM-DD)
    #[arg(long, value_parser = date_arg)]
    hasta: Option<NaiveDate>,
    /// Oldest first
    #[arg(long)]
    asc: bool,
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long)]
    per_page: Option<usize>,
  },
  /// Add client material
  Create(ClienteCreateArgs),
  /// Edit client material; unset fields keep their value
  Edit {
    id: String,
    #[command(flatten)]
    fields: ClienteEditArgs,
  },
  /// Delete client material
  Delete { id: String },
  /// Use pieces of client material
  Use {
    id: String,
    #[arg(long)]
    cantidad: u32,
  },
}

#[derive(Args, Debug)]
pub struct ClienteCreateArgs {
  #[arg(long)]
  pub cliente: String,
  #[arg(long)]
  pub espesor: f64,
  #[arg(long)]
  pub tipo_material: String,
  #[arg(long)]
  pub largo: f64,
  #[arg(long)]
  pub ancho: f64,
  #[arg(long)]
  pub cantidad: u32,
  /// Receipt number; kept as text so leading zeros survive
  #[arg(long)]
  pub remito: String,
  #[arg(long)]
  pub observaciones: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct ClienteEditArgs {
  #[arg(long)]
  pub cliente: Option<String>,
  #[arg(long)]
  pub espesor: Option<f64>,
  #[arg(long)]
  pub tipo_material: Option<String>,
  #[arg(long)]
  pub largo: Option<f64>,
  #[arg(long)]
  pub ancho: Option<f64>,
  #[arg(long)]
  pub cantidad: Option<u32>,
  #[arg(long)]
  pub remito: Option<String>,
  #[arg(long)]
  pub observaciones: Option<String>,
}

#[derive(Parser, Debug)]
pub struct MaquinasArgs {
  #[command(subcommand)]
  pub action: MaquinasCmd,
}

#[derive(Subcommand, Debug)]
pub enum MaquinasCmd {
  /// List machines with their available recortes
  List,
  /// Create a machine
  Create { nombre: String },
}

#[derive(Parser, Debug)]
pub struct StatsArgs {
  #[command(subcommand)]
  pub action: StatsCmd,
}

#[derive(Subcommand, Debug)]
pub enum StatsCmd {
  /// Live figures
  Realtime,
  /// Figures for one machine
  Maquina {
    /// Machine name or id
    maquina: String,
    #[command(flatten)]
    range: StatsRangeArgs,
  },
  /// Overall summary
  Resumen {
    #[command(flatten)]
    range: StatsRangeArgs,
  },
}

#[derive(Args, Debug, Default)]
pub struct StatsRangeArgs {
  /// Restrict to the last month
  #[arg(long)]
  pub ultimo_mes: bool,
  #[arg(long, value_parser = date_arg)]
  pub desde: Option<NaiveDate>,
  #[arg(long, value_parser = date_arg)]
  pub hasta: Option<NaiveDate>,
}

//! rmcp-batteries: battery inventory MCP server
//!
//! Tracks batteries and battery-powered devices, estimates remaining charge
//! for devices without a sensor, and pulls live levels from Home Assistant.
//!
//! Features:
//! - home-assistant: connection check and battery sensor sync (3 tools)
//! - vision: identify a device and its batteries from a photo via Ollama (1 tool)

use clap::{Parser, Subcommand};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters, ServerHandler},
    model::*,
    ErrorData as McpError,
    ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// === Modules ===

mod config;
mod inventory;

#[cfg(any(feature = "home-assistant", feature = "vision"))]
mod sensors;

mod shared;
mod storage;

use inventory::store::InventoryStore;
use storage::RecordStore;

// === CLI ===

#[derive(Parser)]
#[command(name = "rmcp-batteries")]
#[command(about = "Battery inventory MCP server with Home Assistant sync")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the config file in your editor
    Config,
    /// Print the inventory with estimated charge levels
    List {
        /// Only show items whose name or room contains this text
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Print device and battery totals
    Stats,
    /// Export the inventory as YAML
    Export {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Save Home Assistant URL and access token
    #[cfg(feature = "home-assistant")]
    Connect {
        url: String,
        token: String,
        /// Save without testing the connection
        #[arg(long)]
        skip_check: bool,
    },
    /// Pull battery levels from Home Assistant into the inventory
    #[cfg(feature = "home-assistant")]
    Sync,
}

// === Common Parameter Types ===

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EmptyParams {}

// === Server ===

#[derive(Debug)]
pub struct BatteryServer {
    pub tool_router: ToolRouter<Self>,
    pub store: Mutex<InventoryStore>,
    pub records: RecordStore,
    #[cfg(feature = "vision")]
    pub vision: config::VisionConfig,
    #[cfg(any(feature = "home-assistant", feature = "vision"))]
    pub http_client: reqwest::Client,
    #[cfg(feature = "home-assistant")]
    sync_in_flight: shared::InFlight,
    #[cfg(feature = "vision")]
    scan_in_flight: shared::InFlight,
}

impl BatteryServer {
    pub fn new(config: config::Config) -> anyhow::Result<Self> {
        let mut tool_router = Self::tool_router();

        for tool_name in config.unknown_disabled() {
            tracing::warn!("Config disables unknown tool: {}", tool_name);
        }

        // Filter disabled tools
        let disabled = config.disabled_set();
        for tool_name in &disabled {
            if tool_router.has_route(tool_name) {
                tool_router.remove_route(tool_name);
                tracing::info!("Disabled tool: {}", tool_name);
            }
        }

        if !disabled.is_empty() {
            tracing::info!(
                "Loaded config: {} tools disabled, {} tools active",
                disabled.len(),
                tool_router.map.len()
            );
        }

        let records = config.records()?;
        tracing::info!("Using data directory {:?}", records.dir());
        let store = InventoryStore::open(records.clone());

        Ok(Self {
            tool_router,
            store: Mutex::new(store),
            records,
            #[cfg(feature = "vision")]
            vision: config.vision,
            #[cfg(any(feature = "home-assistant", feature = "vision"))]
            http_client: reqwest::Client::new(),
            #[cfg(feature = "home-assistant")]
            sync_in_flight: shared::InFlight::default(),
            #[cfg(feature = "vision")]
            scan_in_flight: shared::InFlight::default(),
        })
    }
}

// Tool implementations
#[rmcp::tool_router]
impl BatteryServer {
    // ============================================================
    // INVENTORY - 7 tools
    // ============================================================

    #[rmcp::tool(description = "List inventory items with estimated charge, status (ok/low/critical) and time since the last battery change. Optionally filter by device name or room.")]
    pub async fn list_items(
        &self,
        Parameters(params): Parameters<inventory::tools::ListParams>,
    ) -> Result<CallToolResult, McpError> {
        inventory::tools::list_items(&self.store, params).await
    }

    #[rmcp::tool(description = "Show one inventory item by id")]
    pub async fn get_item(
        &self,
        Parameters(params): Parameters<inventory::tools::ItemIdParams>,
    ) -> Result<CallToolResult, McpError> {
        inventory::tools::get_item(&self.store, params).await
    }

    #[rmcp::tool(description = "Add a device to the inventory. Defaults: Living Room, AA, 2 batteries, level 100 (fresh batteries as of now).")]
    pub async fn add_item(
        &self,
        Parameters(params): Parameters<inventory::tools::AddItemParams>,
    ) -> Result<CallToolResult, McpError> {
        inventory::tools::add_item(&self.store, params).await
    }

    #[rmcp::tool(description = "Edit an inventory item. Only the given fields change. Setting level to 100 records a battery change. Levels of Home Assistant linked items cannot be edited.")]
    pub async fn update_item(
        &self,
        Parameters(params): Parameters<inventory::tools::UpdateItemParams>,
    ) -> Result<CallToolResult, McpError> {
        inventory::tools::update_item(&self.store, params).await
    }

    #[rmcp::tool(description = "Remove an item from the inventory")]
    pub async fn remove_item(
        &self,
        Parameters(params): Parameters<inventory::tools::ItemIdParams>,
    ) -> Result<CallToolResult, McpError> {
        inventory::tools::remove_item(&self.store, params).await
    }

    #[rmcp::tool(description = "Get inventory totals: devices, batteries, devices needing replacement, batteries per type")]
    pub async fn get_stats(
        &self,
        Parameters(_params): Parameters<EmptyParams>,
    ) -> Result<CallToolResult, McpError> {
        inventory::tools::get_stats(&self.store).await
    }

    #[rmcp::tool(description = "Export the inventory as YAML (device, location, battery_type, count, level, ha_entity), returned directly or written to a file")]
    pub async fn export_yaml(
        &self,
        Parameters(params): Parameters<inventory::tools::ExportParams>,
    ) -> Result<CallToolResult, McpError> {
        inventory::tools::export_yaml(&self.store, params).await
    }

    // ============================================================
    // HOME ASSISTANT - 3 tools
    // ============================================================

    #[cfg(feature = "home-assistant")]
    #[rmcp::tool(description = "Test and save the Home Assistant URL and long-lived access token")]
    pub async fn connect_home_assistant(
        &self,
        Parameters(params): Parameters<sensors::home_assistant::ConnectParams>,
    ) -> Result<CallToolResult, McpError> {
        sensors::home_assistant::connect_home_assistant(&self.http_client, &self.records, params).await
    }

    #[cfg(feature = "home-assistant")]
    #[rmcp::tool(description = "Check that the saved Home Assistant settings work")]
    pub async fn test_connection(
        &self,
        Parameters(_params): Parameters<EmptyParams>,
    ) -> Result<CallToolResult, McpError> {
        sensors::home_assistant::test_connection(&self.http_client, &self.records).await
    }

    #[cfg(feature = "home-assistant")]
    #[rmcp::tool(description = "Pull battery sensor levels from Home Assistant. Linked items get the new level; unknown sensors are added as new items.")]
    pub async fn sync_home_assistant(
        &self,
        Parameters(_params): Parameters<EmptyParams>,
    ) -> Result<CallToolResult, McpError> {
        sensors::home_assistant::sync_home_assistant(
            &self.http_client,
            &self.records,
            &self.store,
            &self.sync_in_flight,
        )
        .await
    }

    // ============================================================
    // VISION - 1 tool
    // ============================================================

    #[cfg(feature = "vision")]
    #[rmcp::tool(description = "Identify a device, its battery type and count from a photo. Returns draft fields to review and pass to add_item; fields the scan cannot determine keep the values given.")]
    pub async fn scan_device(
        &self,
        Parameters(params): Parameters<sensors::vision::ScanParams>,
    ) -> Result<CallToolResult, McpError> {
        sensors::vision::scan_device(&self.http_client, &self.vision, &self.scan_in_flight, params).await
    }
}

#[rmcp::tool_handler]
impl ServerHandler for BatteryServer {
    fn get_info(&self) -> ServerInfo {
        let mut description = String::from("rmcp-batteries: household battery inventory.\n");
        description.push_str("- inventory: list, add, edit, remove, stats, YAML export\n");

        #[cfg(feature = "home-assistant")]
        description.push_str("- home-assistant: sync battery sensor levels\n");

        #[cfg(feature = "vision")]
        description.push_str("- vision: recognize devices and batteries from photos\n");

        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(description),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config) => {
            run_config_command()?;
        }
        Some(command) => {
            init_tracing("warn");
            run_cli_command(command).await?;
        }
        None => {
            init_tracing("info");
            run_server().await?;
        }
    }

    Ok(())
}

/// Log to stderr; stdout carries the MCP transport
fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Open config file in user's editor
fn run_config_command() -> anyhow::Result<()> {
    let config_path = config::Config::path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    // Create config dir if needed
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Create config file from template if it doesn't exist
    if !config_path.exists() {
        let template = include_str!("../config.toml.example");
        std::fs::write(&config_path, template)?;
        println!("Created config file: {}", config_path.display());
    }

    // Get editor from environment or use defaults
    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            { "notepad".to_string() }
            #[cfg(not(target_os = "windows"))]
            { "nano".to_string() }
        });

    println!("Opening {} with {}", config_path.display(), editor);

    std::process::Command::new(&editor)
        .arg(&config_path)
        .status()?;

    Ok(())
}

/// One-shot commands against the local inventory
async fn run_cli_command(command: Commands) -> anyhow::Result<()> {
    let config = config::Config::load();
    let records = config.records()?;
    let now = chrono::Utc::now();

    match command {
        Commands::Config => run_config_command()?,
        Commands::List { search } => {
            let store = InventoryStore::open(records);
            let items = inventory::stats::search(store.items(), search.as_deref().unwrap_or(""));
            println!("{}", inventory::tools::render_list(&items, now));
        }
        Commands::Stats => {
            let store = InventoryStore::open(records);
            let stats = inventory::stats::Stats::compute(store.items(), now);
            print!("{}", inventory::tools::render_stats(&stats));
        }
        Commands::Export { output } => {
            let store = InventoryStore::open(records);
            let yaml = inventory::export::to_yaml(store.items(), now);
            match output {
                Some(path) => {
                    std::fs::write(&path, yaml)?;
                    println!("Exported {} item(s) to {}", store.items().len(), path.display());
                }
                None => print!("{}", yaml),
            }
        }
        #[cfg(feature = "home-assistant")]
        Commands::Connect {
            url,
            token,
            skip_check,
        } => {
            use sensors::home_assistant::{check_connection, HaSettings};

            let settings = HaSettings::new(url, token);
            if !settings.is_complete() {
                anyhow::bail!("Both URL and token are required");
            }
            if !skip_check {
                check_connection(&reqwest::Client::new(), &settings)
                    .await
                    .map_err(|e| anyhow::anyhow!("Connection failed, settings not saved: {}", e))?;
            }
            settings.save(&records)?;
            println!("Saved Home Assistant settings to {}", records.path(sensors::home_assistant::SETTINGS_NAMESPACE).display());
        }
        #[cfg(feature = "home-assistant")]
        Commands::Sync => {
            use sensors::home_assistant::{render_summary, sync, HaSettings};

            let settings = HaSettings::load(&records);
            if !settings.is_complete() {
                anyhow::bail!("Home Assistant is not configured, run `rmcp-batteries connect <url> <token>` first");
            }
            let store = Mutex::new(InventoryStore::open(records));
            let summary = sync(&reqwest::Client::new(), &settings, &store, &shared::InFlight::default())
                .await
                .map_err(|e| anyhow::anyhow!("Sync failed, check the Home Assistant settings: {}", e))?;
            println!("{}", render_summary(&summary));
        }
    }

    Ok(())
}

/// Run the MCP server
async fn run_server() -> anyhow::Result<()> {
    tracing::info!("Starting rmcp-batteries server");

    let server = BatteryServer::new(config::Config::load())?;
    let service = server.serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;

    tracing::info!("rmcp-batteries server stopped");
    Ok(())
}

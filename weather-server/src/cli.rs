use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};
use weather_core::{Config, LookupRequest, WeatherService};
use weather_server::{AppState, error_payload, serve};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-server", version, about = "Weather lookup service")]
pub struct Cli {
    /// Config file; defaults to the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "WEATHER_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server.
    Serve {
        /// Listen address, e.g. "127.0.0.1:8080". Overrides the config file.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Store the OpenWeather API key in the config file.
    Configure,

    /// Look up one city and print the report as JSON.
    Lookup {
        /// City name, e.g. "Nairobi" or "London,GB".
        city: String,

        /// "metric" or "imperial".
        #[arg(long, default_value = "metric")]
        units: String,
    },
}

impl Cli {
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Config::config_file_path(),
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let path = self.config_path()?;

        match self.command {
            Command::Serve { bind } => {
                let mut config = Config::load_with_env(&path)?;
                if let Some(bind) = bind {
                    config.server.bind = bind;
                }
                if !config.provider.has_api_key() {
                    warn!(
                        "No OpenWeather API key configured; lookups will fail upstream. \
                         Hint: run `weather-server configure` or set OPENWEATHER_API_KEY."
                    );
                }

                let state = AppState::from_config(&config)?;
                let listener = TcpListener::bind(&config.server.bind)
                    .await
                    .with_context(|| format!("Failed to bind {}", config.server.bind))?;
                info!(bind = %config.server.bind, "weather-server listening");

                serve(listener, state).await?;
            }
            Command::Configure => {
                // File values only; env overrides must not end up on disk.
                let mut config = Config::load_from(&path)?;

                let api_key = Password::new("OpenWeather API key:")
                    .with_display_mode(PasswordDisplayMode::Masked)
                    .without_confirmation()
                    .prompt()
                    .context("Failed to read API key")?;
                let api_key = api_key.trim();
                if api_key.is_empty() {
                    return Err(anyhow!("API key must not be empty"));
                }

                config.set_api_key(api_key.to_string());
                config.save_to(&path)?;
                println!("Saved configuration to {}", path.display());
            }
            Command::Lookup { city, units } => {
                let config = Config::load_with_env(&path)?;
                let service = WeatherService::from_config(&config)?;

                let result = match LookupRequest::parse(Some(&city), Some(&units)) {
                    Ok(request) => service.lookup(&request).await,
                    Err(err) => Err(err),
                };

                match result {
                    Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                    Err(err) => {
                        let (status, body) = error_payload(&err);
                        eprintln!("{}", serde_json::to_string_pretty(&body)?);
                        return Err(anyhow!("lookup failed ({status}): {err}"));
                    }
                }
            }
        }

        Ok(())
    }
}

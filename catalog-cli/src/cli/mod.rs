//! Command line interface

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::api::ApiResponse;

#[derive(Parser, Debug)]
#[command(name = "catalog-cli", version, about = "Product catalog with asynchronous stock import")]
pub struct Cli {
    /// Path to config file (default: <config_dir>/catalog-cli/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage products
    Products {
        #[command(subcommand)]
        action: ProductAction,
    },

    /// Upload a stock movement workbook for asynchronous import
    Import {
        /// Path to an .xlsx file with `Product ID` and `Status` columns
        file: PathBuf,
    },

    /// Inspect import jobs
    Jobs {
        #[command(subcommand)]
        action: JobAction,
    },

    /// Process queued import jobs
    Worker {
        /// Drain the queue and exit instead of polling
        #[arg(long)]
        once: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProductAction {
    /// List products, 10 per page
    List {
        /// Substring to match against id, type, brand, model or capacity
        #[arg(long, short = 's')]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },

    /// Show one product
    Show { id: i64 },

    /// Create a product from a JSON payload
    Create {
        /// JSON body
        #[arg(long = "json", conflicts_with = "file")]
        json_body: Option<String>,
        /// Read the JSON body from a file
        #[arg(short = 'f', long = "file")]
        file: Option<PathBuf>,
    },

    /// Replace a product's attributes from a JSON payload
    Update {
        id: i64,
        #[arg(long = "json", conflicts_with = "file")]
        json_body: Option<String>,
        #[arg(short = 'f', long = "file")]
        file: Option<PathBuf>,
    },

    /// Delete a product
    Delete { id: i64 },

    /// Insert the reference products, plus optional random ones
    Seed {
        /// Number of random products to add
        #[arg(long, default_value_t = 0)]
        fake: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum JobAction {
    /// List recent jobs
    List {
        /// Only jobs in this status (queued, running, completed, failed)
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Print a table instead of the JSON envelope
        #[arg(long)]
        table: bool,
    },

    /// Show one job
    Show { id: String },
}

/// What a command produced
#[derive(Debug)]
pub enum Output {
    Envelope(ApiResponse),
    Text(String),
}

impl Output {
    pub fn is_success(&self) -> bool {
        match self {
            Output::Envelope(response) => response.is_success(),
            Output::Text(_) => true,
        }
    }
}

impl From<ApiResponse> for Output {
    fn from(response: ApiResponse) -> Self {
        Output::Envelope(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_import() {
        let cli = Cli::parse_from(["catalog-cli", "import", "stock.xlsx"]);
        assert!(matches!(cli.command, Commands::Import { file } if file == PathBuf::from("stock.xlsx")));
    }

    #[test]
    fn test_parse_products_list() {
        let cli = Cli::parse_from(["catalog-cli", "--config", "c.toml", "products", "list", "-s", "se", "--page", "2"]);
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
        match cli.command {
            Commands::Products {
                action: ProductAction::List { search, page },
            } => {
                assert_eq!(search.as_deref(), Some("se"));
                assert_eq!(page, 2);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_json_and_file_conflict() {
        let result = Cli::try_parse_from([
            "catalog-cli", "products", "create", "--json", "{}", "--file", "p.json",
        ]);
        assert!(result.is_err());
    }
}

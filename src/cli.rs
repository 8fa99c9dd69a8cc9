use std::path::PathBuf;

use clap::Parser;

use crate::providers::Provider;

#[derive(Parser)]
#[command(name = "model-arena")]
#[command(version = "0.3.0")]
#[command(about = "Side-by-side playground for comparing hosted chat models")]
pub struct Args {
    /// Prompt to fan out to the panels; read from stdin when omitted
    pub prompt: Option<String>,

    /// Model id for one panel; repeat to add panels (up to the panel bound)
    #[arg(long = "model", short = 'm')]
    pub models: Vec<String>,

    /// Provider group whose catalog seeds default panels
    #[arg(long, value_enum, default_value = "groq")]
    pub provider: Provider,

    /// Share one input buffer and chat session across all panels
    #[arg(long)]
    pub sync: bool,

    /// List available model ids per provider and exit
    #[arg(long)]
    pub list_models: bool,

    /// Show saved chat history grouped by day and exit
    #[arg(long)]
    pub history: bool,

    /// Path to the TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

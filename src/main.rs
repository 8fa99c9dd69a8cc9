use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use model_arena::catalog::{fetch_catalog, ModelCatalog};
use model_arena::cli::Args;
use model_arena::config::ArenaConfig;
use model_arena::error::ArenaError;
use model_arena::history::{now_unix, ChatHistory, ChatRecord, GroupedChats, HistorySink};
use model_arena::panels::{ChatPanel, PanelBoard};
use model_arena::persist::{HttpSaveSink, SaveQueue, SaveSink, UserSession};
use model_arena::providers::{HttpBackend, Provider};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("{} {}", "error:".bright_red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), ArenaError> {
    let config = ArenaConfig::load(args.config.as_deref())?;

    if args.history {
        let history = ChatHistory::open(Path::new(&config.history_path))?;
        print_history(&history.grouped(&config.user_id, now_unix())?);
        return Ok(());
    }

    let backend = HttpBackend::new(config.resolve_endpoints());
    let providers = backend.configured_providers();
    if providers.is_empty() {
        return Err(ArenaError::Config(
            "no provider keys found; export GROQ_API_KEY or OPENAI_API_KEY".to_string(),
        ));
    }

    let catalog = fetch_catalog_with_retry(&backend, &providers).await?;

    if args.list_models {
        print_models(&catalog, &providers);
        return Ok(());
    }

    let mut board = PanelBoard::new(config.policy());
    if args.models.is_empty() {
        board.seed_defaults(args.provider, &catalog);
    } else {
        for model in &args.models {
            let Some(id) = board.add_panel(&catalog) else {
                warn!(model = %model, "panel bound reached; extra --model ignored");
                break;
            };
            if let Some(panel) = board.panel_mut(id) {
                panel.provider = args.provider;
            }
            board.set_model(id, model.clone());
        }
    }
    board.set_synced(args.sync);

    let prompt = match args.prompt {
        Some(p) => p,
        None => read_prompt()?,
    };
    let panel_ids: Vec<u32> = board.panels().iter().map(|p| p.id).collect();
    if board.is_synced() {
        if let Some(&id) = panel_ids.first() {
            board.set_draft(id, prompt.clone());
        }
    } else {
        for &id in &panel_ids {
            board.set_draft(id, prompt.clone());
        }
    }

    let history = Arc::new(ChatHistory::open(Path::new(&config.history_path))?);
    let sink: Arc<dyn SaveSink> = match &config.save_endpoint {
        Some(base) => Arc::new(HttpSaveSink::new(base.clone())),
        None => Arc::new(HistorySink::new(history)),
    };
    let (queue, worker) = SaveQueue::spawn(UserSession::local(config.user_id.clone()), sink);

    model_arena::submit_all(&mut board, &backend, Some(&queue)).await?;

    render_board(&board);

    // Dropping the queue lets the worker drain and exit; awaiting it flushes
    // pending saves before the process ends.
    drop(queue);
    let _ = worker.await;
    Ok(())
}

/// Catalog fetch with user-initiated retry, never automatic.
async fn fetch_catalog_with_retry(
    backend: &HttpBackend,
    providers: &[Provider],
) -> Result<ModelCatalog, ArenaError> {
    loop {
        match fetch_catalog(backend, providers).await {
            Ok(catalog) => return Ok(catalog),
            Err(e) if e.is_retryable() => {
                eprintln!("{} {}", "catalog:".bright_red(), e);
                eprint!("Retry? [y/N] ");
                let _ = io::stderr().flush();
                let mut answer = String::new();
                io::stdin().read_line(&mut answer)?;
                if !answer.trim().eq_ignore_ascii_case("y") {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

fn read_prompt() -> Result<String, ArenaError> {
    print!("{} ", "Prompt:".bright_yellow());
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let prompt = line.trim().to_string();
    if prompt.is_empty() {
        return Err(ArenaError::Config("no prompt provided".to_string()));
    }
    Ok(prompt)
}

fn print_models(catalog: &ModelCatalog, providers: &[Provider]) {
    println!(
        "{} ({} models)",
        "AVAILABLE MODELS".bright_cyan().bold(),
        catalog.total()
    );
    for &provider in providers {
        println!("\n{}", provider.label().bright_yellow());
        for id in catalog.models(provider) {
            println!("  {}", id);
        }
    }
}

fn print_history(groups: &GroupedChats) {
    let sections: [(&str, &Vec<ChatRecord>); 3] = [
        ("Today", &groups.today),
        ("Yesterday", &groups.yesterday),
        ("Older", &groups.older),
    ];
    for (label, records) in sections {
        if records.is_empty() {
            continue;
        }
        println!("{}", label.bright_cyan().bold());
        for record in records {
            println!(
                "  [{} panel {}] {} :: {}",
                record.chat_id.dimmed(),
                record.panel_id,
                record.selected_model.as_deref().unwrap_or("?"),
                record.content
            );
        }
        println!();
    }
}

fn render_board(board: &PanelBoard) {
    for panel in board.panels() {
        print_panel(panel);
    }
}

fn print_panel(panel: &ChatPanel) {
    println!("{}", "=".repeat(60).bright_blue());
    println!(
        "{} {} {} {}",
        format!("[panel {}]", panel.id).bright_white().bold(),
        panel.provider.label().bright_yellow(),
        "/".dimmed(),
        panel
            .selected_model
            .as_deref()
            .unwrap_or("<no model>")
            .bright_cyan()
    );
    for turn in &panel.conversation {
        println!("{} {}", "you:".bright_green(), turn.question);
        println!("{}", turn.response);
    }
    if let Some(usage) = &panel.last_usage {
        let tokens = usage.total_tokens.unwrap_or(0);
        let time = usage.total_time.unwrap_or(0.0);
        println!(
            "{}",
            format!("tokens: {} | total time: {:.3}s", tokens, time).dimmed()
        );
    }
}

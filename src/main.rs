use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use splitpane::config::Config;
use splitpane::event;
use splitpane::inspect::{render_tab, RecordedFactory};
use splitpane::notebook::Notebook;
use splitpane::session::{store, SessionState};

#[derive(Parser)]
#[command(name = "splitpane", about = "Inspect and maintain saved split-pane layouts")]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "splitpane=info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the tree of every tab in a saved session
    Show {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Rewrite a session file, legacy layouts included, in the current format
    Migrate {
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Defaults to overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Restore a session offline and verify every tree is well formed
    Check {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let directive: Directive = cli
        .log_level
        .parse()
        .or_else(|_| "splitpane=info".parse())?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load();
    let default_path = config.session.file_path();

    match cli.command {
        Commands::Show { file } => {
            let path = file.unwrap_or(default_path);
            let notebook = restore_offline(&path, &config)?;
            for (index, tab) in notebook.tabs().iter().enumerate() {
                let marker = if index == notebook.active_tab() { "*" } else { " " };
                println!("{} [{}] {}", marker, index, tab.label());
                print!("{}", render_tab(tab.content()));
            }
            Ok(())
        }
        Commands::Migrate { input, output } => {
            let input = input.unwrap_or(default_path);
            let output = output.unwrap_or_else(|| input.clone());
            let notebook = restore_offline(&input, &config)?;
            let state = notebook.snapshot();
            store::save_to(&state, &output)?;
            println!(
                "wrote {} tabs ({} terminals) to {}",
                state.tabs.len(),
                state.terminal_count(),
                output.display()
            );
            Ok(())
        }
        Commands::Check { file } => {
            let path = file.unwrap_or(default_path);
            let state = load_state(&path)?;
            let notebook = restore_state(&state, &config);
            let mut problems = Vec::new();
            if notebook.tabs().len() != state.tabs.len() {
                problems.push(format!(
                    "{} of {} tabs could not be restored",
                    state.tabs.len() - notebook.tabs().len(),
                    state.tabs.len()
                ));
            }
            let restored: usize = notebook
                .tabs()
                .iter()
                .map(|t| t.content().all_terminals().len())
                .sum();
            if restored != state.terminal_count() {
                problems.push(format!(
                    "{} of {} terminals could not be restored",
                    state.terminal_count().saturating_sub(restored),
                    state.terminal_count()
                ));
            }
            for (index, tab) in notebook.tabs().iter().enumerate() {
                for problem in tab.content().invariant_violations() {
                    problems.push(format!("tab {}: {}", index, problem));
                }
            }
            if !problems.is_empty() {
                for problem in &problems {
                    eprintln!("{}", problem);
                }
                bail!("{} problems in {}", problems.len(), path.display());
            }
            println!("{}: ok ({} tabs)", path.display(), notebook.tabs().len());
            Ok(())
        }
    }
}

fn load_state(path: &Path) -> anyhow::Result<SessionState> {
    store::load_from(path).with_context(|| format!("no readable session at {}", path.display()))
}

fn restore_state(state: &SessionState, config: &Config) -> Notebook {
    // Nothing runs the loop for offline terminals.
    let (handle, _receivers) = event::channel();
    let mut notebook = Notebook::new(
        handle,
        config.behavior.clone(),
        Box::new(RecordedFactory),
    );
    notebook.restore(state);
    notebook
}

fn restore_offline(path: &Path, config: &Config) -> anyhow::Result<Notebook> {
    let state = load_state(path)?;
    Ok(restore_state(&state, config))
}

//! CLI argument definitions and parsing structures.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// musebox - a boredom button for your terminal
#[derive(Parser)]
#[command(name = "musebox")]
#[command(about = "Serve a boredom-busting idea, within reason")]
#[command(long_about = r#"
musebox keeps a local pool of boredom-busting ideas, downloaded as content
packs from a remote pack network and consumed at random with no repeats
until a pack runs dry. Press the button too often and a rolling four-hour
window pushes back - politely at first.

EXAMPLES:
  # Press the button
  musebox idea

  # How many presses are left, and when does the window reset?
  musebox status

  # Watch the countdown tick while throttled
  musebox status --watch

  # Recently served ideas, newest first
  musebox history

  # Force a content-pack download
  musebox refresh

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults
  The config file lives at <config-dir>/musebox/config.toml
  Use --config to specify an explicit config file path

  An optional [muse] section names a local generator command consulted
  before the pack pool; when absent or failing, packs answer instead.
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for persisted state (overrides config file)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Press the button: serve one idea
    Idea,

    /// Show remaining allowance, window countdown, and supply totals
    Status {
        /// Re-render the countdown every second until the window resets
        #[arg(long)]
        watch: bool,
    },

    /// List recently served ideas, newest first
    History,

    /// List loaded packs and their remaining idea counts
    Packs,

    /// Download or refresh one content pack now
    Refresh,

    /// Delete all persisted state (packs, history, rate limit)
    Reset,
}

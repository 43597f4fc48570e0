//! Subcommand handlers. Each returns the process exit code; printing errors
//! never aborts the run.

use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use musebox_limiter::format_remaining;

use crate::session::{PressOutcome, Session};

pub async fn idea(session: &mut Session) -> Result<ExitCode> {
    match session.press().await {
        PressOutcome::Idea { text, remaining } => {
            println!("{text}");
            println!();
            println!("({remaining} presses left this window)");
            Ok(ExitCode::SUCCESS)
        }
        PressOutcome::Dry { .. } => {
            println!("The idea pool is empty - fetching a fresh pack. Try again in a moment.");
            Ok(ExitCode::SUCCESS)
        }
        PressOutcome::Throttled { message, reset_in } => {
            println!("{message}");
            println!("Come back in {}.", format_remaining(reset_in));
            Ok(ExitCode::SUCCESS)
        }
        PressOutcome::Crashed => {
            print_crash_banner();
            Ok(ExitCode::FAILURE)
        }
    }
}

pub async fn status(session: &mut Session, watch: bool) -> Result<ExitCode> {
    let report = session.status();
    println!(
        "presses: {} of {} used",
        report.limit - report.remaining_allowance,
        report.limit
    );
    println!(
        "supply:  {} ideas across {} packs",
        report.total_ideas,
        report.packs.len()
    );
    if report.reset_in > Duration::ZERO {
        println!("window resets in {}", format_remaining(report.reset_in));
    }
    if watch && report.limit_reached {
        watch_countdown(session).await?;
    }
    Ok(ExitCode::SUCCESS)
}

/// One-second tick re-rendering the countdown until the window expires.
/// Safe to interrupt and restart; each tick recomputes from the clock.
async fn watch_countdown(session: &mut Session) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        let report = session.status();
        if !report.limit_reached {
            println!();
            println!("window reset - the button is yours again");
            return Ok(());
        }
        print!("\rwindow resets in {}    ", format_remaining(report.reset_in));
        std::io::stdout().flush()?;
    }
}

pub fn history(session: &Session) -> Result<ExitCode> {
    let entries = session.history();
    if entries.is_empty() {
        println!("No ideas served yet.");
        return Ok(ExitCode::SUCCESS);
    }
    for (position, idea) in entries.iter().enumerate() {
        println!("{:>3}. {idea}", position + 1);
    }
    Ok(ExitCode::SUCCESS)
}

pub fn packs(session: &Session) -> Result<ExitCode> {
    let packs = session.packs();
    if packs.is_empty() {
        println!("No packs loaded.");
        return Ok(ExitCode::SUCCESS);
    }
    for (id, remaining) in packs {
        println!("{id}: {remaining} ideas left");
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn refresh(session: &Session) -> Result<ExitCode> {
    session.refresh().await;
    println!(
        "Supply now holds {} ideas across {} packs.",
        session.total_ideas(),
        session.packs().len()
    );
    Ok(ExitCode::SUCCESS)
}

pub fn reset(session: &mut Session) -> Result<ExitCode> {
    session.reset();
    println!("All state cleared. The button forgives you.");
    Ok(ExitCode::SUCCESS)
}

fn print_crash_banner() {
    println!("*** MUSEBOX FATAL ***");
    println!();
    println!("IDEA_BUFFER_OVERRUN at 0x0000B0RED");
    println!("You pressed the button so hard it broke.");
    println!();
    println!("Run `musebox reset` to start over.");
}

mod cli;
mod config;
mod logging;
mod render;

use std::io::{IsTerminal, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;
use tandem::{shutdown, Subscription, Supervisor, SupervisorConfig};

use crate::cli::Cli;
use crate::config::ConfigError;
use crate::render::Presenter;

#[tokio::main]
async fn main() -> ExitCode {
	let cli = Cli::parse();

	if let Err(e) = logging::init_logging(cli.log_level) {
		eprintln!("warning: {e}");
	}

	match run(cli).await {
		Ok(code) => code,
		Err(e) => {
			eprintln!("{} {e:#}", "error:".red().bold());
			if e.downcast_ref::<ConfigError>().is_some() {
				ExitCode::from(2)
			} else {
				ExitCode::FAILURE
			}
		}
	}
}

async fn run(cli: Cli) -> Result<ExitCode> {
	let file = config::load(cli.config.as_deref())?;
	let plan = config::build_plan(file, &cli)?;

	let color = !cli.no_color && std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal();
	let presenter = Presenter::new(&plan.descriptors, cli.json, color);

	let sup = Supervisor::new(SupervisorConfig {
		log_capacity: plan.max_lines,
		..SupervisorConfig::default()
	});
	let mut events = sup.subscribe();
	let mut shutdown = shutdown::install(Arc::clone(&sup));

	tracing::info!(count = plan.descriptors.len(), "starting processes");
	sup.start_all(plan.descriptors);

	loop {
		tokio::select! {
			event = events.recv() => {
				let Some(event) = event else { break };
				print_event(&presenter, &event)?;
				if !cli.keep_alive && sup.is_settled() {
					drain(&presenter, &mut events)?;
					break;
				}
			}
			Ok(()) = shutdown.changed() => {
				let signal = *shutdown.borrow();
				if let Some(signal) = signal {
					drain(&presenter, &mut events)?;
					return Ok(ExitCode::from(signal.exit_code() as u8));
				}
			}
		}
	}

	// Settling can race the shutdown listener publishing its reason.
	if sup.is_stopping() {
		let signal = tokio::time::timeout(Duration::from_secs(2), shutdown.wait_for(Option::is_some))
			.await
			.ok()
			.and_then(|r| r.ok().and_then(|s| *s));
		if let Some(signal) = signal {
			return Ok(ExitCode::from(signal.exit_code() as u8));
		}
	}

	let all_clean = sup.ids().into_iter().all(|id| sup.exit_code(id) == Some(0));
	Ok(if all_clean { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn print_event(presenter: &Presenter, event: &tandem::SupervisorEvent) -> Result<()> {
	if let Some(line) = presenter.render(event) {
		let mut out = std::io::stdout().lock();
		writeln!(out, "{line}")?;
	}
	Ok(())
}

fn drain(presenter: &Presenter, events: &mut Subscription) -> Result<()> {
	while let Some(event) = events.try_recv() {
		print_event(presenter, &event)?;
	}
	Ok(())
}

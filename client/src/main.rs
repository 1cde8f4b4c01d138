use std::process::ExitCode;
use std::sync::Arc;

use env_logger::Env;
use clap::Parser;
use log::{error, info, warn};

use nostr_sdk::auth::http::create_auth_header;
use nostr_sdk::{
  Config, DeleteStatus, EventKind, EventTemplate, Keys, LifecycleWorkflows, RelaySelector, Signer,
};

mod command;

use command::{Cli, Command, RelaysCommand};

fn signer_for(command: &Command) -> Result<Keys, nostr_sdk::Error> {
  match Keys::from_env() {
    Ok(keys) => Ok(keys),
    Err(err) if command.needs_secret_key() => Err(err.into()),
    Err(err) => {
      warn!("{err}, using throwaway keys for relay authentication");
      Ok(Keys::generate())
    }
  }
}

fn manage_relays(selector: &RelaySelector, command: RelaysCommand) -> Result<bool, nostr_sdk::Error> {
  match command {
    RelaysCommand::List => {
      let relays = selector.configured_relays()?;
      if relays.is_empty() {
        println!("no relays configured in {}", selector.relays_file().display());
      }
      for relay in relays {
        println!("{relay}");
      }
    }
    RelaysCommand::Add { url } => {
      if selector.add_relay(&url)? {
        println!("added {url}");
      } else {
        println!("{url} is already configured");
      }
    }
    RelaysCommand::Remove { url } => {
      if selector.remove_relay(&url)? {
        println!("removed {url}");
      } else {
        println!("{url} was not configured");
      }
    }
  }
  Ok(true)
}

/// Runs `command`; `Ok(false)` means it ran but did not succeed.
async fn run(command: Command) -> Result<bool, nostr_sdk::Error> {
  let config = Config::from_env()?;

  let command = match command {
    Command::Relays { action } => {
      let selector = RelaySelector::from_config(&config);
      return manage_relays(&selector, action.unwrap_or(RelaysCommand::List));
    }
    other => other,
  };

  let keys = Arc::new(signer_for(&command)?);
  info!("using public key {}", keys.public_key());

  if let Command::AuthHeader {
    url,
    method,
    payload,
  } = &command
  {
    let header = create_auth_header(
      keys.as_ref(),
      url,
      method,
      payload.as_deref().map(str::as_bytes),
    )?;
    println!("Authorization: {header}");
    return Ok(true);
  }

  let workflows = LifecycleWorkflows::new(config, keys);

  match command {
    Command::Publish {
      kind,
      content,
      relays,
    } => {
      let result = workflows
        .publish(EventTemplate::new(EventKind::from(kind), content, vec![]), &relays)
        .await?;
      println!("{}", result.message);
      println!("event id: {}", result.event_id);
      for relay in &result.failed_relays {
        println!("  failed: {relay}");
      }
      Ok(result.success)
    }
    Command::Fetch { id, relays } => {
      let report = workflows.fetch_and_report(&id, &relays).await?;
      println!("{}", report.message);
      if let Some(event) = &report.event {
        println!("{}", serde_json::to_string_pretty(event).unwrap_or_else(|_| event.as_json()));
      }
      Ok(report.found)
    }
    Command::Republish { id, relays } => {
      let outcome = workflows.broadcast_existing(&id, &relays).await?;
      println!("{}", outcome.message);
      for result in &outcome.relay_results {
        println!("  {result}");
      }
      Ok(outcome.success)
    }
    Command::Delete { id, relays } => {
      let report = workflows.delete_and_verify(&id, &relays).await;
      println!("{}", report.message);
      if let DeleteStatus::PartialFailure { remaining } = &report.status {
        for relay in remaining {
          println!("  still on: {relay}");
        }
      }
      Ok(report.is_verified())
    }
    Command::Relays { .. } | Command::AuthHeader { .. } => Ok(true),
  }
}

#[tokio::main]
async fn main() -> ExitCode {
  dotenv::dotenv().ok();
  env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

  // usage errors exit with status 2 from here
  let cli = Cli::parse();

  match run(cli.command).await {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::FAILURE,
    Err(err) => {
      error!("{} error: {err}", err.kind());
      ExitCode::FAILURE
    }
  }
}

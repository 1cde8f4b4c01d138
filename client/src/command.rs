use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Publish, fetch, republish and delete Nostr events across relays")]
pub struct Cli {
  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum RelaysCommand {
  /// Print the configured relay list
  List,
  /// Append a relay to the list
  Add { url: String },
  /// Drop a relay from the list
  Remove { url: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Sign and publish a new event
  Publish {
    kind: u64,
    content: String,
    /// Relays to use instead of the configured ones
    relays: Vec<String>,
  },
  /// Report which relays serve an event
  Fetch { id: String, relays: Vec<String> },
  /// Send an existing event to the default relay set
  Republish { id: String, relays: Vec<String> },
  /// Request deletion of an event and check it is gone
  Delete { id: String, relays: Vec<String> },
  /// Manage the relay list, `list` when no action is given
  Relays {
    #[command(subcommand)]
    action: Option<RelaysCommand>,
  },
  /// Print a NIP-98 Authorization header
  AuthHeader {
    url: String,
    method: String,
    payload: Option<String>,
  },
}

impl Command {
  /// Commands that can run without `NOSTR_SECRET_KEY`.
  pub fn needs_secret_key(&self) -> bool {
    !matches!(self, Self::Fetch { .. } | Self::Relays { .. })
  }
}

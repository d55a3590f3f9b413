use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "parley-cli")]
#[command(version, about = "Parley - terminal client for the Parley chat server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server URL for this run (overrides the saved config)
    #[arg(long, global = true, env = "PARLEY_SERVER")]
    pub server: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat (default)
    Chat {
        /// Continue an existing chat
        #[arg(long)]
        id: Option<i64>,
    },

    /// Send a single message and print the reply
    Send {
        message: String,
        /// Stream the reply into an existing chat instead of starting one
        #[arg(long)]
        chat: Option<i64>,
        /// Wait for the whole reply instead of streaming it
        #[arg(long, requires = "chat")]
        no_stream: bool,
    },

    /// List your chats, most recent first
    List,

    /// Print every message of a chat
    Show { id: i64 },

    /// Rename a chat
    Rename { id: i64, title: String },

    /// Delete a chat
    Delete { id: i64 },

    /// Ask a one-off question without saving it
    Public { message: String },

    /// Show or change the client configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set the server URL
    SetServer { url: String },
    /// Set the username; registers again on next use
    SetUser { name: String },
}

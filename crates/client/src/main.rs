mod cli;
mod client;
mod config;
mod state;
mod stream;
mod ui;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, ConfigCommands};
use client::ApiClient;
use config::Config;
use state::ChatState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            return Err(e);
        }
    };

    let server_url = cli.server.unwrap_or_else(|| config.server_url.clone());
    let mut client = ApiClient::new(server_url, config.token.clone());
    let mut state = ChatState::new();

    match cli.command.unwrap_or(Commands::Chat { id: None }) {
        Commands::Config(cmd) => run_config(&mut config, cmd)?,
        Commands::Public { message } => {
            let reply = client.public_chat(&message).await?;
            tracing::debug!(total_tokens = reply.usage.total_tokens, "Reply received");
            println!("{}", reply.response);
        }
        Commands::Chat { id } => {
            ensure_registered(&mut config, &mut client).await?;
            ui::interactive_chat(&client, &mut state, id).await?;
        }
        Commands::Send { message, chat: Some(id), no_stream: true } => {
            ensure_registered(&mut config, &mut client).await?;
            let reply = client.send_message(id, &message).await?;
            tracing::debug!(total_tokens = reply.usage.total_tokens, "Reply received");
            println!("{}", reply.message);
        }
        Commands::Send { message, chat, .. } => {
            ensure_registered(&mut config, &mut client).await?;
            ui::single_message(&client, &mut state, chat, &message).await?;
        }
        Commands::List => {
            ensure_registered(&mut config, &mut client).await?;
            state.set_chats(client.list_chats().await?);
            ui::print_chat_list(&state.chats);
        }
        Commands::Show { id } => {
            ensure_registered(&mut config, &mut client).await?;
            ui::print_chat(&client.get_chat(id).await?);
        }
        Commands::Rename { id, title } => {
            ensure_registered(&mut config, &mut client).await?;
            let chat = client.update_title(id, &title).await?;
            println!("Chat {} renamed to: {}", chat.id, chat.title);
        }
        Commands::Delete { id } => {
            ensure_registered(&mut config, &mut client).await?;
            client.delete_chat(id).await?;
            state.forget(id);
            println!("Chat {} deleted", id);
        }
    }

    Ok(())
}

/// Register on first use and remember the token.
async fn ensure_registered(config: &mut Config, client: &mut ApiClient) -> Result<()> {
    if config.token.is_some() {
        return Ok(());
    }

    println!("Registering as '{}'...", config.username);
    match client.register(&config.username).await {
        Ok(registered) => {
            config.set_token(registered.token.clone())?;
            client.set_token(registered.token);
            println!("Registered with user ID: {}\n", registered.user.id);
            Ok(())
        }
        Err(e) => {
            eprintln!("Failed to register with Parley at {}: {}", client.base_url(), e);
            eprintln!("Is the Parley server running?");
            Err(e)
        }
    }
}

fn run_config(config: &mut Config, cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            println!("Current config:");
            println!("  Server URL: {}", config.server_url);
            println!("  Username: {}", config.username);
            println!("  Registered: {}", config.token.is_some());
        }
        ConfigCommands::SetServer { url } => {
            config.server_url = url;
            config.save()?;
            println!("Server URL updated to: {}", config.server_url);
        }
        ConfigCommands::SetUser { name } => {
            config.username = name;
            config.token = None; // Reset token, will re-register
            config.save()?;
            println!("Username updated to: {}", config.username);
        }
    }
    Ok(())
}

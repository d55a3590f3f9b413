use anyhow::Result;
use parley_shared::{Chat, ChatSummary, Role};
use std::io::{self, Write};

use crate::client::ApiClient;
use crate::state::ChatState;
use crate::stream::StreamOutcome;

pub async fn interactive_chat(client: &ApiClient, state: &mut ChatState, chat_id: Option<i64>) -> Result<()> {
    if let Some(id) = chat_id {
        let chat = client.get_chat(id).await?;
        print_chat(&chat);
        state.open(chat);
    }

    println!("Parley chat started. Type '/new' for a fresh chat, 'quit' to exit.\n");

    loop {
        print!("You: ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
            println!("Goodbye!");
            break;
        }
        if input == "/new" {
            state.current = None;
            println!("Started a new chat.\n");
            continue;
        }
        if input.is_empty() {
            continue;
        }

        println!();

        let result = match state.current_id() {
            Some(_) => stream_turn(client, state, input).await,
            None => first_turn(client, state, input).await,
        };
        if let Err(e) = result {
            eprintln!("Error: {}\n", e);
        }
    }

    Ok(())
}

/// Send one message and print the reply. Streams into `chat_id` when given,
/// otherwise starts a new chat.
pub async fn single_message(client: &ApiClient, state: &mut ChatState, chat_id: Option<i64>, message: &str) -> Result<()> {
    match chat_id {
        Some(id) => {
            state.open(client.get_chat(id).await?);
            stream_turn(client, state, message).await
        }
        None => first_turn(client, state, message).await,
    }
}

async fn first_turn(client: &ApiClient, state: &mut ChatState, message: &str) -> Result<()> {
    let created = client.create_chat(message).await?;
    if let Some(usage) = &created.usage {
        tracing::debug!(total_tokens = usage.total_tokens, "Reply received");
    }

    match (&created.ai_response, &created.error) {
        (Some(reply), _) => println!("{}\n", reply),
        (None, Some(error)) => eprintln!("Error: {}\n", error),
        (None, None) => {}
    }
    println!("[chat {} \u{00b7} {}]\n", created.chat.id, created.chat.title);

    state.open(created.chat);
    Ok(())
}

async fn stream_turn(client: &ApiClient, state: &mut ChatState, message: &str) -> Result<()> {
    let outcome = client
        .stream_message(state, message, |chunk| {
            print!("{}", chunk);
            io::stdout().flush().ok();
        })
        .await?;

    match outcome {
        StreamOutcome::Completed(_) => println!("\n"),
        StreamOutcome::Failed(error) => eprintln!("\nError: {}\n", error),
    }
    Ok(())
}

pub fn print_chat_list(chats: &[ChatSummary]) {
    if chats.is_empty() {
        println!("No chats yet.");
        return;
    }
    for chat in chats {
        println!(
            "{:>6}  {:<50}  {}",
            chat.id,
            chat.title,
            chat.last_message_at.format("%Y-%m-%d %H:%M")
        );
    }
}

pub fn print_chat(chat: &Chat) {
    println!("# {} (chat {})\n", chat.title, chat.id);
    for message in &chat.messages {
        let who = match message.role {
            Role::User => "You",
            Role::Assistant => "AI",
        };
        println!("{}: {}\n", who, message.content);
    }
}

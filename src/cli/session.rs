//! Sign-in and chat command handlers.

use std::io::Write;

use anyhow::{Context, Result};
use futures::StreamExt;

use gyschat::auth::{self, SessionStore};
use gyschat::client::{BackendClient, ChatEvent};
use gyschat::config::Config;

use super::fetch::backend_client;

/// Validate a token and remember the session.
pub(crate) async fn cmd_signin(config: &Config, token: &str) -> Result<()> {
    let client =
        BackendClient::new(&config.backend).with_context(|| "Failed to create backend client")?;
    let session = match auth::sign_in(&client, token).await {
        Ok(session) => session,
        Err(e) => {
            if let Some(hint) = config.site.sign_in_hint() {
                eprintln!("{}", hint);
            }
            return Err(anyhow::Error::new(e).context("Sign-in failed"));
        }
    };

    let store = SessionStore::new();
    store.save(&session)?;

    println!("{}", config.site.landing_now());
    println!("Signed in as {} <{}>", session.user.name, session.user.email);
    if let Some(expiry) = &session.expired_at {
        println!("Token expires at {}", expiry);
    }
    Ok(())
}

pub(crate) fn cmd_signout() -> Result<()> {
    if SessionStore::new().clear()? {
        println!("Signed out.");
    } else {
        println!("No stored session.");
    }
    Ok(())
}

/// Send one message and print the reply as it streams in.
pub(crate) async fn cmd_chat(config: &Config, message: &str) -> Result<()> {
    if message.trim().is_empty() {
        anyhow::bail!("Message is empty");
    }

    let client = backend_client(config)?;
    let mut stream = client
        .chat(message)
        .await
        .with_context(|| "Failed to start chat")?;

    let mut stdout = std::io::stdout();
    let mut conversation = None;
    while let Some(event) = stream.next().await {
        match event.with_context(|| "Chat stream failed")? {
            ChatEvent::ConversationId(id) => conversation = Some(id),
            ChatEvent::Content(text) => {
                write!(stdout, "{}", text)?;
                stdout.flush()?;
            }
        }
    }
    writeln!(stdout)?;

    if let Some(id) = conversation {
        eprintln!("(conversation {})", id);
    }
    Ok(())
}

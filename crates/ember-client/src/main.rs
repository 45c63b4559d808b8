//! Interactive ember endpoint.
//!
//! Commands:
//! - `/invite <name#1234>`  start a handshake
//! - `/accept <name#1234>`  accept a pending invitation
//! - `/msg <name#1234> <text>`  send an encrypted message
//! - `/read <name#1234>`  decrypt and print one contact's history
//! - `/contacts`  list contacts with their handshake state
//! - `/wipe`  destroy the session immediately
//! - `/quit`  exit without wiping

use std::io::Write as _;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use ember_client::endpoint::{self, Command, Event};
use ember_client::session::now_ms;
use ember_client::storage::{FileStore, MemoryStore};
use ember_client::{Author, HandshakeState, Identity, ReadBody, Session, Transport};

#[derive(Parser)]
#[command(name = "ember", about = "Ephemeral end-to-end encrypted chat endpoint")]
struct Args {
    /// Relay address to connect to
    #[arg(long, default_value = "127.0.0.1:9190")]
    relay: String,

    /// Username for a fresh session (3-20 chars, a-z and 0-9).
    /// Ignored when a stored session resumes.
    #[arg(long)]
    name: Option<String>,

    /// Keep everything in memory; nothing touches disk
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ember=warn,ember_client=warn".into()),
        )
        .init();

    let args = Args::parse();
    let session = open_session(&args).await?;

    println!("you are {}", session.identity());
    let remaining = session.expiry_ms().saturating_sub(now_ms()) / 1000;
    println!("session expires in {}m{}s; everything is destroyed then", remaining / 60, remaining % 60);

    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let transport = Transport::spawn(args.relay.clone(), session.identity().clone(), inbound_tx);
    let mut handle = endpoint::spawn(session, transport, inbound_rx);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    loop {
        tokio::select! {
            maybe_event = handle.events.recv() => {
                let Some(event) = maybe_event else {
                    println!("session ended");
                    break;
                };
                let session_over = matches!(event, Event::Wiped);
                print_event(event);
                if session_over {
                    break;
                }
                prompt()?;
            }
            maybe_line = lines.next_line() => {
                let Ok(Some(line)) = maybe_line else { break };
                let line = line.trim();
                if line.is_empty() {
                    prompt()?;
                    continue;
                }
                if line == "/help" {
                    print_help();
                    prompt()?;
                    continue;
                }
                match parse_command(line) {
                    Ok(None) => break, // /quit
                    Ok(Some(command)) => {
                        if handle.commands.send(command).await.is_err() {
                            println!("session ended");
                            break;
                        }
                    }
                    Err(e) => {
                        println!("{}", e);
                        prompt()?;
                    }
                }
            }
        }
    }

    Ok(())
}

async fn open_session(args: &Args) -> Result<Session> {
    if args.ephemeral {
        let name = args
            .name
            .as_deref()
            .ok_or_else(|| anyhow!("--ephemeral requires --name"))?;
        return Ok(Session::create(name, Box::new(MemoryStore::new())).await?);
    }

    let store = FileStore::open_default().context("failed to open session store")?;
    if let Some(mut session) = Session::resume(Box::new(store))? {
        if !session.expired(now_ms()) {
            return Ok(session);
        }
        // Stored session outlived its hour while we were offline.
        session.wipe();
    }

    let name = args
        .name
        .as_deref()
        .ok_or_else(|| anyhow!("no stored session; pass --name to start one"))?;
    let store = FileStore::open_default().context("failed to open session store")?;
    Ok(Session::create(name, Box::new(store)).await?)
}

/// `Ok(None)` means quit.
fn parse_command(line: &str) -> Result<Option<Command>> {
    let mut parts = line.splitn(3, ' ');
    let command = parts.next().unwrap_or("");
    match command {
        "/invite" => Ok(Some(Command::Invite(parse_identity(parts.next())?))),
        "/accept" => Ok(Some(Command::Accept(parse_identity(parts.next())?))),
        "/msg" => {
            let to = parse_identity(parts.next())?;
            let text = parts
                .next()
                .ok_or_else(|| anyhow!("usage: /msg <name#1234> <text>"))?;
            Ok(Some(Command::Send {
                to,
                text: text.to_string(),
            }))
        }
        "/read" => Ok(Some(Command::Read(parse_identity(parts.next())?))),
        "/contacts" => Ok(Some(Command::Contacts)),
        "/wipe" => Ok(Some(Command::Wipe)),
        "/quit" | "/exit" => Ok(None),
        other => Err(anyhow!("unknown command {}; try /help", other)),
    }
}

fn parse_identity(arg: Option<&str>) -> Result<Identity> {
    let raw = arg.ok_or_else(|| anyhow!("expected a contact like alice#0042"))?;
    raw.parse()
        .map_err(|e| anyhow!("bad identity {:?}: {}", raw, e))
}

fn print_event(event: Event) {
    match event {
        Event::Invitation(from) => {
            println!("* {} wants to chat; /accept {} to answer", from, from)
        }
        Event::Established(peer) => println!("* secure channel with {} established", peer),
        Event::MessageReceived { from } => {
            println!("* new message from {}; /read {} to decrypt", from, from)
        }
        Event::Sent { to } => println!("* sent to {}", to),
        Event::History { contact, entries } => {
            if entries.is_empty() {
                println!("no messages with {}", contact);
            }
            for entry in entries {
                let who = match entry.author {
                    Author::Own => "me",
                    Author::Peer => contact.as_str(),
                };
                match entry.body {
                    ReadBody::Plaintext(text) => println!("  [{}] {}", who, text),
                    ReadBody::Undecryptable => println!("  [{}] <undecryptable>", who),
                }
            }
        }
        Event::ContactList(list) => {
            if list.is_empty() {
                println!("no contacts; /invite <name#1234> to start");
            }
            for (identity, state) in list {
                let state = match state {
                    HandshakeState::None => "none",
                    HandshakeState::RequestSent => "invited",
                    HandshakeState::RequestReceived => "pending accept",
                    HandshakeState::Established => "established",
                };
                println!("  {}  ({})", identity, state);
            }
        }
        Event::Wiped => println!("* session wiped; identity, keys, and messages are gone"),
        Event::Error(message) => println!("! {}", message),
    }
}

fn print_help() {
    println!("  /invite <name#1234>       start a handshake");
    println!("  /accept <name#1234>       accept a pending invitation");
    println!("  /msg <name#1234> <text>   send an encrypted message");
    println!("  /read <name#1234>         decrypt and print history");
    println!("  /contacts                 list contacts");
    println!("  /wipe                     destroy the session now");
    println!("  /quit                     exit without wiping");
}

fn prompt() -> Result<()> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}

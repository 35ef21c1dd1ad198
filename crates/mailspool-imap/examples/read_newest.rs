//! Example: download the newest INBOX message as cheaply as possible.
//!
//! Fetches the message's BODYSTRUCTURE, plans a fetch that pulls only
//! the parts a plain-text rendering needs, and welds the result back
//! into one RFC 822 message.
//!
//! ## Prerequisites
//!
//! An IMAP account reachable over implicit TLS (port 993). Most
//! providers require an app password for IMAP rather than the account
//! password.
//!
//! ## Running
//!
//! ```bash
//! RUST_LOG=mailspool_imap=debug cargo run --package mailspool-imap --example read_newest
//! ```

use std::io::{self, Write};

use mailspool_imap::parser::FetchDataBody;
use mailspool_imap::rebuild::{TextMode, assemble, collect_parts, plan_fetch};
use mailspool_imap::{CollectingObserver, Config, ImapClient, Range};

fn prompt(label: &str) -> io::Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("mailspool - read the newest INBOX message");
    println!("==========================================\n");

    let host = prompt("IMAP server")?;
    let email = prompt("Email address")?;
    let password = prompt("App password")?;

    println!("\nConnecting to {host}:993...");
    let config = Config::new(&host);
    let observer = CollectingObserver::with_credentials(&email, &password);
    let mut client = ImapClient::connect(&config, Box::new(observer)).await?;
    println!("✓ Connected and authenticated");

    let mailbox = client.select("INBOX").await?;
    println!("✓ INBOX selected: {} messages", mailbox.exists);
    if mailbox.exists == 0 {
        client.disconnect().await;
        return Ok(());
    }

    // Structure first, then only the sections the plan asks for.
    let newest = Range::single(mailbox.exists, false);
    let fetched = client.fetch(&newest, "(UID BODYSTRUCTURE)").await?;
    let structure = fetched
        .first()
        .and_then(|response| response.body_structure())
        .ok_or("server returned no BODYSTRUCTURE")?;

    let parts = collect_parts(structure);
    let plan = plan_fetch(&parts, TextMode::Plain, true, false);
    println!(
        "Fetching {} of {} sections: {}",
        plan.expected,
        parts.len(),
        plan.items
    );

    let responses = client.fetch(&newest, &plan.items).await?;
    let bodies: Vec<&FetchDataBody> = responses
        .iter()
        .flat_map(|response| response.bodies())
        .collect();
    let message = assemble(&parts, &bodies, true)?;
    println!("✓ Reassembled {} bytes\n", message.len());

    print!("{}", String::from_utf8_lossy(&message));

    client.disconnect().await;
    Ok(())
}

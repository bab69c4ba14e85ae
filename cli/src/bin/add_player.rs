//! Registers a new player with the record service.

use clap::Parser;
use qubic_cli::{DEFAULT_HOST, capitalize_words, post_json};
use qubic_protocol::AddPlayerRequest;

#[derive(Parser, Debug)]
#[command(name = "add_player", about = "Add a player to the record store")]
struct Args {
    /// Player name; multiple words are capitalized and joined
    #[arg(required = true)]
    name: Vec<String>,

    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let name = capitalize_words(&args.name);
    let request = AddPlayerRequest { name: name.clone() };
    post_json(&format!("{}/api/add_player", args.host), &request).await?;
    println!("Successfully added player {name}");
    Ok(())
}

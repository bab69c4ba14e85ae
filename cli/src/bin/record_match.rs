//! Records the result of a finished match.

use clap::Parser;
use qubic_cli::{DEFAULT_HOST, capitalize_words, post_json};
use qubic_protocol::MatchResultRequest;

#[derive(Parser, Debug)]
#[command(name = "record_match", about = "Record a match result")]
struct Args {
    /// Name of the winning player
    #[arg(long, num_args = 1.., required = true)]
    winner: Vec<String>,

    /// Name of the losing player
    #[arg(long, num_args = 1.., required = true)]
    loser: Vec<String>,

    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let winner = capitalize_words(&args.winner);
    let loser = capitalize_words(&args.loser);
    let request = MatchResultRequest {
        winner: winner.clone(),
        loser: loser.clone(),
    };
    post_json(&format!("{}/api/match", args.host), &request).await?;
    println!("Successfully recorded {winner} beating {loser}");
    Ok(())
}

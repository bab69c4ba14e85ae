//! Removes the most recently recorded match.

use clap::Parser;
use qubic_cli::{DEFAULT_HOST, check_response};

#[derive(Parser, Debug)]
#[command(name = "undo_match", about = "Undo the last recorded match")]
struct Args {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let response = reqwest::Client::new()
        .post(format!("{}/api/undo", args.host))
        .send()
        .await?;
    check_response(response).await?;
    println!("Successful undo");
    Ok(())
}

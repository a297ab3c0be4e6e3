use clap::{Parser, Subcommand};
use reqwest::multipart::Form;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "mockctl")]
#[command(about = "Management CLI for the VCS mock proxy", long_about = None)]
struct Cli {
    /// Base URL of the management API.
    #[arg(short, long, env = "MOCKCTL_URL", default_value = "http://localhost:80")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List substitution variables in chain order
    List,
    /// Add or replace a substitution variable
    Set { key: String, value: String },
}

const SUBSTITUTION_VARIABLES_PATH: &str = "/substitution-variables";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let endpoint = format!("{}{}", cli.url.trim_end_matches('/'), SUBSTITUTION_VARIABLES_PATH);

    match cli.command {
        Commands::List => {
            let res = client.get(&endpoint).send().await?;
            print_response(res).await?;
        }
        Commands::Set { key, value } => {
            let form = Form::new().text("key", key.clone()).text("value", value);
            let res = client.post(&endpoint).multipart(form).send().await?;
            if res.status().is_success() {
                println!("set {key}");
            } else {
                print_response(res).await?;
            }
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: management API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text.trim_end());
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

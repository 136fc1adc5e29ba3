use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "api-cli")]
#[command(about = "Client for the resilient users API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Bearer key for mutating routes.
    #[arg(short, long, env = "RESILIENT_API_KEY")]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the server is up
    Health,
    /// Fetch a user by id
    GetUser { id: String },
    /// Create a user
    CreateUser { name: String },
    /// Rename a user
    UpdateUser { id: String, name: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let api = format!("{}/api/v1", cli.url.trim_end_matches('/'));

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);
    }

    let res = match cli.command {
        Commands::Health => {
            client
                .get(format!("{}/healthcheck", cli.url.trim_end_matches('/')))
                .send()
                .await?
        }
        Commands::GetUser { id } => client.get(format!("{api}/user/{id}")).send().await?,
        Commands::CreateUser { name } => {
            client
                .post(format!("{api}/user"))
                .headers(headers)
                .json(&json!({ "name": name }))
                .send()
                .await?
        }
        Commands::UpdateUser { id, name } => {
            client
                .put(format!("{api}/user/{id}"))
                .headers(headers)
                .json(&json!({ "name": name }))
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let request_id = res
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_owned();
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: API returned status {status} (request {request_id})");
    } else {
        println!("{status}");
    }

    if text.is_empty() {
        return Ok(());
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{text}"),
    }
    Ok(())
}

use clap::{Parser, Subcommand};
use serde_json::Value;

const INTROSPECT: &str = "/api/v1/introspect";

#[derive(Parser)]
#[command(name = "capsium-cli")]
#[command(about = "Query the introspection API of a running Capsium router", long_about = None)]
struct Cli {
    #[arg(short, long, env = "CAPSIUM_ROUTER_URL", default_value = "http://localhost:8080")]
    url: String,

    /// Host header to send, for routers serving several domains.
    #[arg(long)]
    host: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List installed packages
    Metadata,
    /// List every mount and route pattern
    Routes,
    /// Show content hashes per package
    Hashes,
    /// Check content against the recorded hashes
    Validity,
}

impl Commands {
    fn endpoint(&self) -> &'static str {
        match self {
            Commands::Metadata => "metadata",
            Commands::Routes => "routes",
            Commands::Hashes => "content-hashes",
            Commands::Validity => "content-validity",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let url = format!("{}{}/{}", cli.url.trim_end_matches('/'), INTROSPECT, cli.command.endpoint());
    let mut request = client.get(url);
    if let Some(host) = &cli.host {
        request = request.header(reqwest::header::HOST, host);
    }

    let res = request.send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Introspection API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
